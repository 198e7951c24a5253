use super::{Tool, ToolContext, ToolOutput};
use crate::agenda::time_remaining;
use serde_json::{json, Value};

pub struct CheckTimeRemainingTool;

impl Tool for CheckTimeRemainingTool {
    fn name(&self) -> &'static str {
        "check_time_remaining"
    }

    fn description(&self) -> String {
        "Check how much time is left in the current session.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn run(&self, _input: Value, ctx: &mut ToolContext<'_>) -> ToolOutput {
        match time_remaining(ctx.machine.context()) {
            Ok(report) => ToolOutput::success(serde_json::to_value(report).unwrap_or(Value::Null)),
            Err(e) => ToolOutput::error(e.to_string()),
        }
    }
}
