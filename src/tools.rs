//! Tools the voice agent can call
//!
//! Tools are stateless singletons; everything a call needs arrives through
//! `ToolContext`. Results are plain JSON objects sent back to the provider.

mod advance;
mod session_info;
mod time_remaining;
mod time_warning;

pub use advance::AdvanceToNextSessionTool;
pub use session_info::GetSessionInfoTool;
pub use time_remaining::CheckTimeRemainingTool;
pub use time_warning::AnnounceTimeWarningTool;

use crate::realtime::ToolDefinition;
use crate::state_machine::ConferenceStateMachine;
use serde_json::{json, Value};
use std::sync::Arc;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub result: Value,
}

impl ToolOutput {
    pub fn success(result: Value) -> Self {
        Self {
            success: true,
            result,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: json!({ "error": message.into() }),
        }
    }
}

/// Context for one tool invocation
pub struct ToolContext<'a> {
    /// The run's state machine; tools may drive it
    pub machine: &'a mut ConferenceStateMachine,
}

impl<'a> ToolContext<'a> {
    pub fn new(machine: &'a mut ConferenceStateMachine) -> Self {
        Self { machine }
    }
}

/// Trait for tools that can be executed by the agent
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &'static str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    fn run(&self, input: Value, ctx: &mut ToolContext<'_>) -> ToolOutput;
}

/// Collection of tools offered to the voice agent
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ToolRegistry {
    /// The moderator tool set
    pub fn standard() -> Self {
        Self {
            tools: vec![
                Arc::new(AdvanceToNextSessionTool),
                Arc::new(CheckTimeRemainingTool),
                Arc::new(GetSessionInfoTool),
                Arc::new(AnnounceTimeWarningTool),
            ],
        }
    }

    /// Get all tool definitions for the provider session setup
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool by name; `None` if no such tool exists
    pub fn execute(&self, name: &str, input: Value, ctx: &mut ToolContext<'_>) -> Option<ToolOutput> {
        let tool = self.tools.iter().find(|t| t.name() == name)?;
        tracing::info!(tool = %name, input = %input, "Tool call");
        Some(tool.run(input, ctx))
    }

    /// Execute, mapping unknown names to an `{error}` result
    pub fn call(&self, name: &str, input: Value, ctx: &mut ToolContext<'_>) -> ToolOutput {
        self.execute(name, input, ctx).unwrap_or_else(|| {
            tracing::warn!(tool = %name, "Unknown tool requested");
            ToolOutput::error(format!("unknown tool: {name}"))
        })
    }
}
