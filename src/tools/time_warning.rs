//! `announce_time_warning` - acknowledges a spoken time warning

use super::{Tool, ToolContext, ToolOutput};
use serde_json::{json, Value};

const DEFAULT_MINUTES: u64 = 5;

pub struct AnnounceTimeWarningTool;

impl Tool for AnnounceTimeWarningTool {
    fn name(&self) -> &'static str {
        "announce_time_warning"
    }

    fn description(&self) -> String {
        "Give the speaker a time warning. Call when little time remains.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["minutes_remaining"],
            "properties": {
                "minutes_remaining": {
                    "type": "number",
                    "description": "Minutes left in the session"
                }
            }
        })
    }

    fn run(&self, input: Value, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let minutes = input
            .get("minutes_remaining")
            .filter(|v| v.is_number())
            .cloned()
            .unwrap_or_else(|| json!(DEFAULT_MINUTES));
        let speaker_name = ctx
            .machine
            .context()
            .current_session()
            .and_then(|s| s.speaker_name())
            .unwrap_or_default()
            .to_string();

        ToolOutput::success(json!({
            "status": "ok",
            "speaker_name": speaker_name,
            "minutes_remaining": minutes,
            "message": format!("{minutes} minutes left for {speaker_name}"),
        }))
    }
}
