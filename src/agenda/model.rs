//! Agenda data types

use super::AgendaError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Kind of agenda session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Opening,
    Keynote,
    Talk,
    Panel,
    Break,
    Qa,
    Closing,
}

impl SessionType {
    pub const ALL: [SessionType; 7] = [
        SessionType::Opening,
        SessionType::Keynote,
        SessionType::Talk,
        SessionType::Panel,
        SessionType::Break,
        SessionType::Qa,
        SessionType::Closing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::Opening => "opening",
            SessionType::Keynote => "keynote",
            SessionType::Talk => "talk",
            SessionType::Panel => "panel",
            SessionType::Break => "break",
            SessionType::Qa => "qa",
            SessionType::Closing => "closing",
        }
    }

    /// Sessions that put someone other than the moderator on stage
    pub fn is_speaker_session(self) -> bool {
        matches!(
            self,
            SessionType::Keynote | SessionType::Talk | SessionType::Panel | SessionType::Qa
        )
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Person on stage for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerInfo {
    pub name: String,
    pub title: String,
    pub organization: String,
    #[serde(alias = "talkTitle")]
    pub talk_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// How the moderator should pronounce the name, passed into instructions
    #[serde(
        default,
        alias = "pronunciationHint",
        skip_serializing_if = "Option::is_none"
    )]
    pub pronunciation_hint: Option<String>,
}

/// One agenda entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub title: String,
    #[serde(alias = "durationMinutes")]
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<SpeakerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panelists: Option<Vec<SpeakerInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Session {
    pub fn duration_seconds(&self) -> f64 {
        f64::from(self.duration_minutes) * 60.0
    }

    pub fn speaker_name(&self) -> Option<&str> {
        self.speaker.as_ref().map(|s| s.name.as_str())
    }

    pub fn panelists(&self) -> &[SpeakerInfo] {
        self.panelists.as_deref().unwrap_or_default()
    }
}

fn default_language() -> String {
    "tr".to_string()
}

fn default_voice() -> String {
    "coral".to_string()
}

/// A validated conference agenda
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agenda {
    pub id: String,
    pub title: String,
    pub date: String,
    pub venue: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_voice", alias = "moderatorVoice")]
    pub moderator_voice: String,
    pub sessions: Vec<Session>,
}

const REQUIRED_AGENDA_FIELDS: &[&str] = &["id", "title", "date", "venue", "sessions"];
const REQUIRED_SESSION_FIELDS: &[&str] = &["id", "type", "title", "duration_minutes"];
const REQUIRED_SPEAKER_FIELDS: &[&str] = &["name", "title", "organization", "talk_title"];

impl Agenda {
    /// Validate and build an agenda from raw JSON.
    ///
    /// Every failure names the offending field path, e.g.
    /// `sessions[1].duration_minutes`.
    pub fn from_value(value: Value) -> Result<Self, AgendaError> {
        let Value::Object(mut root) = value else {
            return Err(AgendaError::invalid("agenda", "expected a JSON object"));
        };

        for field in REQUIRED_AGENDA_FIELDS {
            if !root.contains_key(*field) {
                return Err(AgendaError::invalid(*field, "missing required field"));
            }
        }

        let raw_sessions = match root.remove("sessions") {
            Some(Value::Array(items)) => items,
            _ => return Err(AgendaError::invalid("sessions", "expected an array")),
        };
        if raw_sessions.is_empty() {
            return Err(AgendaError::invalid(
                "sessions",
                "must contain at least one session",
            ));
        }

        let mut sessions = Vec::with_capacity(raw_sessions.len());
        let mut seen_ids = HashSet::new();
        for (index, raw) in raw_sessions.into_iter().enumerate() {
            let session = parse_session(index, raw)?;
            if !seen_ids.insert(session.id.clone()) {
                return Err(AgendaError::invalid(
                    format!("sessions[{index}].id"),
                    format!("duplicate session id '{}'", session.id),
                ));
            }
            sessions.push(session);
        }

        root.insert("sessions".to_string(), Value::Array(Vec::new()));
        let mut agenda: Agenda = serde_json::from_value(Value::Object(root))
            .map_err(|e| AgendaError::invalid("agenda", e.to_string()))?;
        agenda.sessions = sessions;
        Ok(agenda)
    }

    /// Parse an agenda from JSON text
    pub fn from_json(text: &str) -> Result<Self, AgendaError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn total_duration_minutes(&self) -> u32 {
        self.sessions.iter().map(|s| s.duration_minutes).sum()
    }

    pub fn session(&self, index: usize) -> Option<&Session> {
        self.sessions.get(index)
    }
}

fn parse_session(index: usize, raw: Value) -> Result<Session, AgendaError> {
    let path = format!("sessions[{index}]");
    let Value::Object(fields) = &raw else {
        return Err(AgendaError::invalid(path, "expected an object"));
    };

    for field in REQUIRED_SESSION_FIELDS {
        let present = fields.contains_key(*field)
            || (*field == "duration_minutes" && fields.contains_key("durationMinutes"));
        if !present {
            return Err(AgendaError::invalid(
                format!("{path}.{field}"),
                "missing required field",
            ));
        }
    }

    let duration = fields
        .get("duration_minutes")
        .or_else(|| fields.get("durationMinutes"));
    match duration.and_then(Value::as_i64) {
        Some(minutes) if minutes > 0 && u32::try_from(minutes).is_ok() => {}
        _ => {
            return Err(AgendaError::invalid(
                format!("{path}.duration_minutes"),
                "must be a positive integer",
            ))
        }
    }

    if let Some(speaker) = fields.get("speaker").filter(|v| !v.is_null()) {
        check_speaker(&format!("{path}.speaker"), speaker)?;
    }
    if let Some(Value::Array(panelists)) = fields.get("panelists") {
        for (i, panelist) in panelists.iter().enumerate() {
            check_speaker(&format!("{path}.panelists[{i}]"), panelist)?;
        }
    }

    serde_json::from_value(raw).map_err(|e| AgendaError::invalid(path, e.to_string()))
}

fn check_speaker(path: &str, value: &Value) -> Result<(), AgendaError> {
    let Value::Object(fields) = value else {
        return Err(AgendaError::invalid(path, "expected an object"));
    };
    for field in REQUIRED_SPEAKER_FIELDS {
        let present = fields.contains_key(*field)
            || (*field == "talk_title" && fields.contains_key("talkTitle"));
        if !present {
            return Err(AgendaError::invalid(
                format!("{path}.{field}"),
                "missing required field",
            ));
        }
    }
    Ok(())
}
