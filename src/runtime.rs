//! Runtime for one conference run
//!
//! Each WebSocket connection owns one run: state machine, session timer,
//! agenda store and voice provider connection. Client commands, provider
//! events and timer signals are consumed by a single task, which is the only
//! writer of the phase and context.

mod executor;

#[cfg(test)]
pub mod testing;

pub use executor::{ConferenceRuntime, RunSettings};
#[cfg(test)]
use executor::RunHandle;

use crate::agenda::{round_to, whole_seconds, AgendaSummary};
use crate::realtime::VoiceProvider;
use crate::state_machine::{ConferenceContext, ConferencePhase};
use crate::timer::TimerTick;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Runtime wired to whichever provider the configuration selects
pub type ProductionRuntime = ConferenceRuntime<Arc<dyn VoiceProvider>>;

/// What the moderator voice is doing, for the operator UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeratorStatus {
    Speaking,
    Listening,
    Idle,
}

/// Phase and session snapshot carried by `STATE_UPDATE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub state: ConferencePhase,
    pub session_index: usize,
    pub session_title: Option<String>,
    pub speaker_name: Option<String>,
    pub is_paused: bool,
}

impl StateSnapshot {
    pub fn of(phase: ConferencePhase, ctx: &ConferenceContext) -> Self {
        let session = ctx.current_session();
        Self {
            state: phase,
            session_index: ctx.current_session_index,
            session_title: session.map(|s| s.title.clone()),
            speaker_name: session.and_then(|s| s.speaker_name()).map(String::from),
            is_paused: ctx.is_paused,
        }
    }
}

/// `TIMER_TICK` payload: whole seconds, progress to three decimals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickPayload {
    pub elapsed_seconds: u64,
    pub remaining_seconds: u64,
    pub total_seconds: u64,
    pub session_index: usize,
    pub progress_ratio: f64,
}

impl From<&TimerTick> for TickPayload {
    fn from(tick: &TimerTick) -> Self {
        Self {
            elapsed_seconds: whole_seconds(tick.elapsed_seconds),
            remaining_seconds: whole_seconds(tick.remaining_seconds),
            total_seconds: whole_seconds(tick.total_seconds),
            session_index: tick.session_index,
            progress_ratio: round_to(tick.progress_ratio, 3),
        }
    }
}

/// Messages sent to the operator UI as `{"type": ..., "payload": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    AiConnected {
        provider: String,
        model: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_secret: Option<String>,
    },
    AgendaLoaded(AgendaSummary),
    StateUpdate(StateSnapshot),
    TimerTick(TickPayload),
    ModeratorStatus {
        status: ModeratorStatus,
    },
    Transcript {
        text: String,
    },
    AudioData {
        data: String,
        mime_type: String,
    },
    Error {
        message: String,
    },
    ConferenceEnded {},
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Operator commands, plus microphone audio from binary frames
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// Agenda document, either under `payload.agenda` or as the payload itself
    LoadAgenda(Value),
    ConnectAi,
    StartConference,
    Pause,
    Resume,
    NextSession,
    ToggleInteract,
    SpeakerFinished,
    OverrideMessage { message: String },
    Audio(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Invalid JSON")]
    InvalidJson,
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl ClientCommand {
    /// Parse a text frame from the operator UI
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let Envelope { kind, payload } =
            serde_json::from_str(text).map_err(|_| CommandError::InvalidJson)?;

        let command = match kind.as_str() {
            "LOAD_AGENDA" => {
                let agenda = match payload {
                    Value::Object(mut map) if map.contains_key("agenda") => {
                        map.remove("agenda").unwrap_or(Value::Null)
                    }
                    other => other,
                };
                Self::LoadAgenda(agenda)
            }
            "CONNECT_AI" | "REQUEST_TOKEN" => Self::ConnectAi,
            "START_CONFERENCE" => Self::StartConference,
            "PAUSE" => Self::Pause,
            "RESUME" => Self::Resume,
            "NEXT_SESSION" => Self::NextSession,
            "TOGGLE_INTERACT" => Self::ToggleInteract,
            "SPEAKER_FINISHED" => Self::SpeakerFinished,
            "OVERRIDE_MESSAGE" => Self::OverrideMessage {
                message: payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            _ => return Err(CommandError::UnknownType(kind)),
        };
        Ok(command)
    }

    /// Name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LoadAgenda(_) => "LOAD_AGENDA",
            Self::ConnectAi => "CONNECT_AI",
            Self::StartConference => "START_CONFERENCE",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
            Self::NextSession => "NEXT_SESSION",
            Self::ToggleInteract => "TOGGLE_INTERACT",
            Self::SpeakerFinished => "SPEAKER_FINISHED",
            Self::OverrideMessage { .. } => "OVERRIDE_MESSAGE",
            Self::Audio(_) => "AUDIO",
        }
    }
}
