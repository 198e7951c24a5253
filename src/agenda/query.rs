//! Read-only projections of the run context for the voice agent

use super::{Session, SpeakerInfo};
use crate::state_machine::ConferenceContext;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which session a lookup refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Which {
    #[default]
    Current,
    Next,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("no such session")]
    NoSuchSession,
    #[error("no active session")]
    NoActiveSession,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeakerDetails {
    pub name: String,
    pub title: String,
    pub organization: String,
    pub talk_title: String,
    pub bio: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelistDetails {
    pub name: String,
    pub title: String,
    pub organization: String,
}

/// Session details as reported by `get_session_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub session_index: usize,
    pub session_id: String,
    #[serde(rename = "type")]
    pub session_type: String,
    pub title: String,
    pub duration_minutes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<SpeakerDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panelists: Option<Vec<PanelistDetails>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SessionInfo {
    fn new(index: usize, session: &Session) -> Self {
        Self {
            session_index: index,
            session_id: session.id.clone(),
            session_type: session.session_type.as_str().to_string(),
            title: session.title.clone(),
            duration_minutes: session.duration_minutes,
            speaker: session.speaker.as_ref().map(SpeakerDetails::from),
            panelists: session
                .panelists
                .as_ref()
                .filter(|p| !p.is_empty())
                .map(|p| p.iter().map(PanelistDetails::from).collect()),
            notes: session.notes.clone().filter(|n| !n.is_empty()),
            description: session.description.clone().filter(|d| !d.is_empty()),
        }
    }
}

impl From<&SpeakerInfo> for SpeakerDetails {
    fn from(s: &SpeakerInfo) -> Self {
        Self {
            name: s.name.clone(),
            title: s.title.clone(),
            organization: s.organization.clone(),
            talk_title: s.talk_title.clone(),
            bio: s.bio.clone().unwrap_or_default(),
        }
    }
}

impl From<&SpeakerInfo> for PanelistDetails {
    fn from(s: &SpeakerInfo) -> Self {
        Self {
            name: s.name.clone(),
            title: s.title.clone(),
            organization: s.organization.clone(),
        }
    }
}

/// Timing snapshot as reported by `check_time_remaining`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRemaining {
    pub session_title: String,
    pub total_seconds: u64,
    pub elapsed_seconds: u64,
    pub remaining_seconds: u64,
    pub remaining_minutes: f64,
    pub progress_percent: f64,
}

pub fn session_info(ctx: &ConferenceContext, which: Which) -> Result<SessionInfo, QueryError> {
    let (index, session) = match which {
        Which::Current => (ctx.current_session_index, ctx.current_session()),
        Which::Next => (ctx.current_session_index + 1, ctx.next_session()),
    };
    session
        .map(|s| SessionInfo::new(index, s))
        .ok_or(QueryError::NoSuchSession)
}

pub fn time_remaining(ctx: &ConferenceContext) -> Result<TimeRemaining, QueryError> {
    let session = ctx.current_session().ok_or(QueryError::NoActiveSession)?;
    let remaining = ctx.remaining_seconds();
    Ok(TimeRemaining {
        session_title: session.title.clone(),
        total_seconds: u64::from(session.duration_minutes) * 60,
        elapsed_seconds: whole_seconds(ctx.elapsed_seconds),
        remaining_seconds: whole_seconds(remaining),
        remaining_minutes: round_to(remaining / 60.0, 1),
        progress_percent: round_to(ctx.progress_ratio() * 100.0, 1),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn whole_seconds(seconds: f64) -> u64 {
    seconds.max(0.0).round() as u64
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
