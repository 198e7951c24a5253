//! Conference agenda: data model, validation and read-only queries
//!
//! The agenda is loaded once per run and shared immutably through
//! `Arc<Agenda>`. Queries project the current run context into the
//! JSON-friendly shapes the voice agent reads through its tools.

mod model;
mod query;
mod store;

pub use model::{Agenda, Session, SessionType, SpeakerInfo};
pub use query::{session_info, time_remaining, Which};
pub(crate) use query::{round_to, whole_seconds};
pub use store::{AgendaStore, AgendaSummary};

#[cfg(test)]
pub(crate) use model::fixtures;

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading an agenda
#[derive(Debug, Error)]
pub enum AgendaError {
    #[error("invalid agenda field `{field}`: {message}")]
    Invalid { field: String, message: String },
    #[error("agenda is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read agenda file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AgendaError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Field path of a validation failure, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}
