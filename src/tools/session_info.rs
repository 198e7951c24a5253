use super::{Tool, ToolContext, ToolOutput};
use crate::agenda::{session_info, Which};
use serde_json::{json, Value};

pub struct GetSessionInfoTool;

impl Tool for GetSessionInfoTool {
    fn name(&self) -> &'static str {
        "get_session_info"
    }

    fn description(&self) -> String {
        "Get the details of the current or the next session and its speaker.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["which"],
            "properties": {
                "which": {
                    "type": "string",
                    "enum": ["current", "next"],
                    "description": "Which session to describe"
                }
            }
        })
    }

    fn run(&self, input: Value, ctx: &mut ToolContext<'_>) -> ToolOutput {
        // Anything other than "next" means the current session
        let which = match input.get("which").and_then(Value::as_str) {
            Some("next") => Which::Next,
            _ => Which::Current,
        };
        match session_info(ctx.machine.context(), which) {
            Ok(info) => ToolOutput::success(serde_json::to_value(info).unwrap_or(Value::Null)),
            Err(e) => ToolOutput::error(e.to_string()),
        }
    }
}
