//! Conference phases and the mutable per-run context

use crate::agenda::{Agenda, Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// Phase of a conference run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConferencePhase {
    #[default]
    Idle,
    Opening,
    IntroducingSpeaker,
    SpeakerActive,
    Interacting,
    TimeWarning,
    ThankingSpeaker,
    Transitioning,
    BreakAnnouncement,
    BreakActive,
    BreakEnding,
    Closing,
    Ended,
}

impl ConferencePhase {
    pub const ALL: [ConferencePhase; 13] = [
        ConferencePhase::Idle,
        ConferencePhase::Opening,
        ConferencePhase::IntroducingSpeaker,
        ConferencePhase::SpeakerActive,
        ConferencePhase::Interacting,
        ConferencePhase::TimeWarning,
        ConferencePhase::ThankingSpeaker,
        ConferencePhase::Transitioning,
        ConferencePhase::BreakAnnouncement,
        ConferencePhase::BreakActive,
        ConferencePhase::BreakEnding,
        ConferencePhase::Closing,
        ConferencePhase::Ended,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConferencePhase::Idle => "idle",
            ConferencePhase::Opening => "opening",
            ConferencePhase::IntroducingSpeaker => "introducing_speaker",
            ConferencePhase::SpeakerActive => "speaker_active",
            ConferencePhase::Interacting => "interacting",
            ConferencePhase::TimeWarning => "time_warning",
            ConferencePhase::ThankingSpeaker => "thanking_speaker",
            ConferencePhase::Transitioning => "transitioning",
            ConferencePhase::BreakAnnouncement => "break_announcement",
            ConferencePhase::BreakActive => "break_active",
            ConferencePhase::BreakEnding => "break_ending",
            ConferencePhase::Closing => "closing",
            ConferencePhase::Ended => "ended",
        }
    }

    /// The moderator is expected to talk in this phase
    pub fn is_speaking(self) -> bool {
        !self.is_silent()
    }

    pub fn is_silent(self) -> bool {
        matches!(
            self,
            ConferencePhase::Idle
                | ConferencePhase::SpeakerActive
                | ConferencePhase::BreakActive
                | ConferencePhase::Ended
        )
    }

    /// The session clock runs in this phase
    pub fn is_timed(self) -> bool {
        matches!(
            self,
            ConferencePhase::SpeakerActive
                | ConferencePhase::Interacting
                | ConferencePhase::TimeWarning
                | ConferencePhase::BreakActive
        )
    }

    /// Entering this phase stops the session clock
    pub fn stops_timer(self) -> bool {
        matches!(
            self,
            ConferencePhase::ThankingSpeaker
                | ConferencePhase::Transitioning
                | ConferencePhase::Ended
        )
    }

    /// Someone other than the moderator holds the stage
    pub fn is_speaker_phase(self) -> bool {
        matches!(
            self,
            ConferencePhase::SpeakerActive
                | ConferencePhase::Interacting
                | ConferencePhase::TimeWarning
        )
    }
}

impl fmt::Display for ConferencePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state of one conference run.
///
/// Only the run task writes to it; the timer reports elapsed time back
/// through the run queue.
#[derive(Debug, Clone, Default)]
pub struct ConferenceContext {
    pub agenda: Option<Arc<Agenda>>,
    pub current_session_index: usize,
    pub session_started_at: Option<Instant>,
    pub elapsed_seconds: f64,
    pub time_warning_issued: bool,
    pub is_paused: bool,
    pub conference_started_at: Option<DateTime<Utc>>,
}

impl ConferenceContext {
    #[cfg(test)]
    pub fn new(agenda: Arc<Agenda>) -> Self {
        Self {
            agenda: Some(agenda),
            ..Self::default()
        }
    }

    /// Swap in a freshly loaded agenda and rewind to the first session
    pub fn set_agenda(&mut self, agenda: Arc<Agenda>) {
        *self = Self {
            agenda: Some(agenda),
            is_paused: self.is_paused,
            ..Self::default()
        };
    }

    pub fn has_agenda(&self) -> bool {
        self.agenda.is_some()
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.agenda.as_ref()?.session(self.current_session_index)
    }

    pub fn next_session(&self) -> Option<&Session> {
        self.agenda.as_ref()?.session(self.current_session_index + 1)
    }

    pub fn has_next_session(&self) -> bool {
        self.next_session().is_some()
    }

    pub fn remaining_seconds(&self) -> f64 {
        match self.current_session() {
            Some(session) => (session.duration_seconds() - self.elapsed_seconds).max(0.0),
            None => 0.0,
        }
    }

    pub fn progress_ratio(&self) -> f64 {
        match self.current_session() {
            Some(session) if session.duration_seconds() > 0.0 => {
                (self.elapsed_seconds / session.duration_seconds()).min(1.0)
            }
            Some(_) => 1.0,
            None => 0.0,
        }
    }

    /// Move to the following session and reset its per-session bookkeeping
    pub fn begin_next_session(&mut self) {
        self.current_session_index += 1;
        self.elapsed_seconds = 0.0;
        self.time_warning_issued = false;
        self.session_started_at = None;
    }
}
