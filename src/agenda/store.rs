//! Holder of the currently loaded agenda

use super::{Agenda, AgendaError};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Agenda overview sent to the operator UI after a load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgendaSummary {
    pub title: String,
    pub total_sessions: usize,
    pub total_duration: u32,
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub session_type: String,
    pub title: String,
    pub duration_minutes: u32,
    pub speaker_name: Option<String>,
}

impl AgendaSummary {
    pub fn of(agenda: &Agenda) -> Self {
        Self {
            title: agenda.title.clone(),
            total_sessions: agenda.sessions.len(),
            total_duration: agenda.total_duration_minutes(),
            sessions: agenda
                .sessions
                .iter()
                .map(|s| SessionSummary {
                    id: s.id.clone(),
                    session_type: s.session_type.as_str().to_string(),
                    title: s.title.clone(),
                    duration_minutes: s.duration_minutes,
                    speaker_name: s.speaker_name().map(str::to_string),
                })
                .collect(),
        }
    }
}

/// Owns the agenda for one run. A failed load leaves the previous agenda in place.
#[derive(Debug, Default)]
pub struct AgendaStore {
    agenda: Option<Arc<Agenda>>,
}

impl AgendaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, data: Value) -> Result<Arc<Agenda>, AgendaError> {
        Ok(self.install(Agenda::from_value(data)?))
    }

    pub fn load_from_file(&mut self, path: &Path) -> Result<Arc<Agenda>, AgendaError> {
        let text = std::fs::read_to_string(path).map_err(|source| AgendaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.install(Agenda::from_json(&text)?))
    }

    fn install(&mut self, agenda: Agenda) -> Arc<Agenda> {
        let agenda = Arc::new(agenda);
        tracing::info!(
            agenda_id = %agenda.id,
            title = %agenda.title,
            sessions = agenda.sessions.len(),
            total_minutes = agenda.total_duration_minutes(),
            "Agenda loaded"
        );
        self.agenda = Some(Arc::clone(&agenda));
        agenda
    }

    #[cfg(test)]
    pub fn agenda(&self) -> Option<&Arc<Agenda>> {
        self.agenda.as_ref()
    }
}
