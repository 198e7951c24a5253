//! `advance_to_next_session` - the agent signals it is done with the current phase

use super::{Tool, ToolContext, ToolOutput};
use crate::agenda::{session_info, Which};
use crate::state_machine::AdvanceReason;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct AdvanceToNextSessionTool;

#[derive(Debug, Deserialize)]
struct AdvanceInput {
    #[serde(default)]
    reason: Option<String>,
}

fn parse_reason(raw: Option<&str>) -> AdvanceReason {
    let Some(raw) = raw else {
        return AdvanceReason::default();
    };
    serde_json::from_value(Value::String(raw.to_string())).unwrap_or_else(|_| {
        tracing::warn!(reason = %raw, "Unrecognized advance reason, treating as speaker_finished");
        AdvanceReason::default()
    })
}

impl Tool for AdvanceToNextSessionTool {
    fn name(&self) -> &'static str {
        "advance_to_next_session"
    }

    fn description(&self) -> String {
        "Move on to the next session. Call when the current speaker is done, the time has run out, or the break is over.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["reason"],
            "properties": {
                "reason": {
                    "type": "string",
                    "enum": ["speaker_finished", "time_expired", "break_over", "operator_skip"],
                    "description": "Why the moderator is moving on"
                }
            }
        })
    }

    fn run(&self, input: Value, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let input: AdvanceInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };
        let reason = parse_reason(input.reason.as_deref());

        if let Err(e) = ctx.machine.advance_session(reason) {
            return ToolOutput::error(e.to_string());
        }

        let new_session = match session_info(ctx.machine.context(), Which::Current) {
            Ok(info) => serde_json::to_value(info).unwrap_or(Value::Null),
            Err(e) => json!({ "error": e.to_string() }),
        };
        ToolOutput::success(json!({
            "status": "ok",
            "message": "Moved on to the next session",
            "new_session": new_session,
        }))
    }
}
