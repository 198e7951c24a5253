//! Stateful wrapper around the transition table
//!
//! Owns the current phase and context, applies the router whenever the run
//! enters `transitioning`, and fans every phase change out to the registered
//! observers in registration order.

use super::transition::{route, transition, TransitionError};
use super::{AdvanceReason, ConferenceContext, ConferencePhase, Trigger};
use crate::agenda::Agenda;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a phase or tick observer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ObserverError(pub String);

impl ObserverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receives every phase change, including intermediate `transitioning`
pub trait PhaseObserver: Send + Sync {
    fn on_phase_change(
        &self,
        phase: ConferencePhase,
        ctx: &ConferenceContext,
    ) -> Result<(), ObserverError>;
}

/// Phases entered by one operation, in order. Empty means no-op.
pub type Entered = Vec<ConferencePhase>;

pub struct ConferenceStateMachine {
    phase: ConferencePhase,
    context: ConferenceContext,
    observers: Vec<(String, Arc<dyn PhaseObserver>)>,
}

impl Default for ConferenceStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConferenceStateMachine {
    pub fn new() -> Self {
        Self {
            phase: ConferencePhase::Idle,
            context: ConferenceContext::default(),
            observers: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn with_agenda(agenda: Arc<Agenda>) -> Self {
        Self {
            context: ConferenceContext::new(agenda),
            ..Self::new()
        }
    }

    pub fn phase(&self) -> ConferencePhase {
        self.phase
    }

    pub fn context(&self) -> &ConferenceContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ConferenceContext {
        &mut self.context
    }

    /// Register an observer; delivery follows registration order
    pub fn subscribe(&mut self, name: impl Into<String>, observer: Arc<dyn PhaseObserver>) {
        self.observers.push((name.into(), observer));
    }

    /// Replace the agenda of a run that has not started yet
    pub fn load_agenda(&mut self, agenda: Arc<Agenda>) {
        self.context.set_agenda(agenda);
    }

    /// idle → opening
    pub fn start(&mut self) -> Result<Entered, TransitionError> {
        if self.phase == ConferencePhase::Idle {
            if !self.context.has_agenda() {
                return Err(TransitionError::NoAgenda);
            }
            self.context.conference_started_at = Some(Utc::now());
        }
        let mut entered = Vec::new();
        self.fire(Trigger::StartConference, &mut entered)?;
        Ok(entered)
    }

    /// The voice agent finished speaking
    pub fn response_done(&mut self) -> Result<Entered, TransitionError> {
        let mut entered = Vec::new();
        match self.phase {
            ConferencePhase::Opening => self.fire(Trigger::OpeningComplete, &mut entered)?,
            ConferencePhase::IntroducingSpeaker => {
                self.fire(Trigger::IntroductionComplete, &mut entered)?;
            }
            ConferencePhase::TimeWarning => self.fire(Trigger::WarningDelivered, &mut entered)?,
            ConferencePhase::ThankingSpeaker => self.fire(Trigger::ThankComplete, &mut entered)?,
            ConferencePhase::BreakAnnouncement => {
                self.fire(Trigger::BreakAnnounced, &mut entered)?;
            }
            ConferencePhase::BreakEnding => {
                self.leave_break();
                self.fire(Trigger::BreakOver, &mut entered)?;
            }
            ConferencePhase::Closing => self.fire(Trigger::ClosingComplete, &mut entered)?,
            phase => {
                tracing::debug!(phase = %phase, "response_done ignored");
            }
        }
        Ok(entered)
    }

    /// The voice agent asked to move on
    pub fn advance_session(&mut self, reason: AdvanceReason) -> Result<Entered, TransitionError> {
        tracing::info!(phase = %self.phase, reason = %reason, "Advance requested");
        let mut entered = Vec::new();
        match self.phase {
            phase if phase.is_speaker_phase() => {
                self.fire(Trigger::SpeakerFinished, &mut entered)?;
            }
            ConferencePhase::Opening => self.fire(Trigger::OpeningComplete, &mut entered)?,
            phase => {
                tracing::debug!(phase = %phase, "advance_session ignored");
            }
        }
        Ok(entered)
    }

    /// Operator skip. Rejected phases are logged and leave the phase unchanged.
    pub fn operator_next(&mut self) -> Result<Entered, TransitionError> {
        let mut entered = Vec::new();
        if let Err(e) = self.fire(Trigger::OperatorNext, &mut entered) {
            tracing::warn!(phase = %self.phase, error = %e, "Operator next rejected");
            return Err(e);
        }
        Ok(entered)
    }

    /// Timer crossed the warning threshold
    pub fn time_warning(&mut self) -> Result<Entered, TransitionError> {
        let mut entered = Vec::new();
        if matches!(
            self.phase,
            ConferencePhase::SpeakerActive | ConferencePhase::Interacting
        ) {
            self.context.time_warning_issued = true;
            self.fire(Trigger::TimeWarning, &mut entered)?;
        } else {
            tracing::debug!(phase = %self.phase, "time_warning ignored");
        }
        Ok(entered)
    }

    /// Timer reached the end of the session
    pub fn time_expired(&mut self) -> Result<Entered, TransitionError> {
        let mut entered = Vec::new();
        match self.phase {
            phase if phase.is_speaker_phase() => {
                self.fire(Trigger::SpeakerFinished, &mut entered)?;
            }
            ConferencePhase::BreakActive => self.fire(Trigger::BreakEndingSoon, &mut entered)?,
            phase => {
                tracing::debug!(phase = %phase, "time_expired ignored");
            }
        }
        Ok(entered)
    }

    /// Operator switched interactive mode on or off
    pub fn toggle_interact(&mut self) -> Result<Entered, TransitionError> {
        let mut entered = Vec::new();
        match self.phase {
            ConferencePhase::SpeakerActive => self.fire(Trigger::EnterInteraction, &mut entered)?,
            ConferencePhase::Interacting => self.fire(Trigger::ExitInteraction, &mut entered)?,
            phase => {
                tracing::debug!(phase = %phase, "toggle_interact ignored");
            }
        }
        Ok(entered)
    }

    /// Step past the finished break. A trailing break stays the current
    /// session so the index never runs off the agenda.
    fn leave_break(&mut self) {
        if self.context.has_next_session() {
            self.context.begin_next_session();
        } else {
            self.context.elapsed_seconds = 0.0;
            self.context.time_warning_issued = false;
        }
    }

    fn fire(&mut self, trigger: Trigger, entered: &mut Entered) -> Result<(), TransitionError> {
        let next = transition(self.phase, trigger, &self.context)?;
        self.enter(next, trigger, entered);
        if next == ConferencePhase::Transitioning {
            self.route(entered)?;
        }
        Ok(())
    }

    fn route(&mut self, entered: &mut Entered) -> Result<(), TransitionError> {
        let decision = route(&self.context);
        if decision.advance {
            self.context.begin_next_session();
        }
        let next = transition(self.phase, decision.trigger, &self.context)?;
        self.enter(next, decision.trigger, entered);
        Ok(())
    }

    fn enter(&mut self, next: ConferencePhase, trigger: Trigger, entered: &mut Entered) {
        let previous = std::mem::replace(&mut self.phase, next);
        tracing::info!(
            from = %previous,
            to = %next,
            trigger = %trigger,
            session_index = self.context.current_session_index,
            "Phase transition"
        );
        entered.push(next);
        self.notify(next);
    }

    fn notify(&self, phase: ConferencePhase) {
        for (name, observer) in &self.observers {
            if let Err(e) = observer.on_phase_change(phase, &self.context) {
                tracing::error!(observer = %name, phase = %phase, error = %e, "Phase observer failed");
            }
        }
    }
}
