//! Common types for realtime voice sessions

use serde::Serialize;
use serde_json::Value;

/// Tool offered to the voice agent, described by a JSON schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Everything a provider needs to open a session
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub instructions: String,
    /// Requested voice; adapters map unknown names to their default
    pub voice: String,
    pub tools: Vec<ToolDefinition>,
}

/// Returned by a successful `connect`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    pub provider: String,
    pub model: String,
    pub session_id: Option<String>,
    /// Ephemeral browser credential, when the provider issues one
    pub client_secret: Option<String>,
}

/// Events pushed by a provider into the run queue
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    SetupComplete,
    /// Base64 audio chunk from the agent
    Audio { data: String, mime_type: String },
    /// Transcribed audience speech
    InputTranscript { text: String },
    /// Transcript of what the agent said
    OutputTranscript { text: String },
    TurnComplete,
    /// The agent was cut off by audience speech
    Interrupted,
    ToolCall {
        call_id: String,
        name: String,
        arguments: Value,
    },
    Disconnected { reason: String },
    Error { message: String },
}

impl ProviderEvent {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetupComplete => "setup_complete",
            Self::Audio { .. } => "audio",
            Self::InputTranscript { .. } => "input_transcript",
            Self::OutputTranscript { .. } => "output_transcript",
            Self::TurnComplete => "turn_complete",
            Self::Interrupted => "interrupted",
            Self::ToolCall { .. } => "tool_call",
            Self::Disconnected { .. } => "disconnected",
            Self::Error { .. } => "error",
        }
    }
}
