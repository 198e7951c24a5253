//! Static transition table and the agenda router
//!
//! `transition` is pure: given a phase, a trigger and the context it
//! returns the destination phase or an error, without touching anything.

use super::{ConferenceContext, ConferencePhase, Trigger};
use crate::agenda::SessionType;
use thiserror::Error;

/// Guard evaluated against the context before a row fires
pub type Guard = fn(&ConferenceContext) -> bool;

/// One row of the transition table
#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub from: ConferencePhase,
    pub trigger: Trigger,
    pub to: ConferencePhase,
    pub guard: Option<Guard>,
}

const fn rule(from: ConferencePhase, trigger: Trigger, to: ConferencePhase) -> TransitionRule {
    TransitionRule {
        from,
        trigger,
        to,
        guard: None,
    }
}

const fn guarded(
    from: ConferencePhase,
    trigger: Trigger,
    to: ConferencePhase,
    guard: Guard,
) -> TransitionRule {
    TransitionRule {
        from,
        trigger,
        to,
        guard: Some(guard),
    }
}

fn agenda_loaded(ctx: &ConferenceContext) -> bool {
    ctx.has_agenda()
}

use ConferencePhase as P;
use Trigger as T;

pub static TRANSITIONS: &[TransitionRule] = &[
    guarded(P::Idle, T::StartConference, P::Opening, agenda_loaded),
    rule(P::Opening, T::OpeningComplete, P::Transitioning),
    rule(P::Transitioning, T::IntroduceSpeaker, P::IntroducingSpeaker),
    rule(P::IntroducingSpeaker, T::IntroductionComplete, P::SpeakerActive),
    rule(P::SpeakerActive, T::EnterInteraction, P::Interacting),
    rule(P::Interacting, T::ExitInteraction, P::SpeakerActive),
    rule(P::SpeakerActive, T::TimeWarning, P::TimeWarning),
    rule(P::Interacting, T::TimeWarning, P::TimeWarning),
    rule(P::TimeWarning, T::WarningDelivered, P::SpeakerActive),
    rule(P::SpeakerActive, T::SpeakerFinished, P::ThankingSpeaker),
    rule(P::Interacting, T::SpeakerFinished, P::ThankingSpeaker),
    rule(P::TimeWarning, T::SpeakerFinished, P::ThankingSpeaker),
    rule(P::ThankingSpeaker, T::ThankComplete, P::Transitioning),
    rule(P::Transitioning, T::AnnounceBreak, P::BreakAnnouncement),
    rule(P::BreakAnnouncement, T::BreakAnnounced, P::BreakActive),
    rule(P::BreakActive, T::BreakEndingSoon, P::BreakEnding),
    rule(P::BreakEnding, T::BreakOver, P::Transitioning),
    rule(P::BreakActive, T::BreakOver, P::Transitioning),
    rule(P::Transitioning, T::StartClosing, P::Closing),
    rule(P::Closing, T::ClosingComplete, P::Ended),
    rule(P::SpeakerActive, T::OperatorNext, P::ThankingSpeaker),
    rule(P::Interacting, T::OperatorNext, P::ThankingSpeaker),
    rule(P::TimeWarning, T::OperatorNext, P::ThankingSpeaker),
    rule(P::BreakActive, T::OperatorNext, P::Transitioning),
    rule(P::Opening, T::OperatorNext, P::Transitioning),
];

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition: {trigger} is not allowed from {phase}")]
    InvalidTransition {
        phase: ConferencePhase,
        trigger: Trigger,
    },
    #[error("Transition {trigger} from {phase} rejected by guard")]
    GuardRejected {
        phase: ConferencePhase,
        trigger: Trigger,
    },
    #[error("No agenda loaded")]
    NoAgenda,
}

/// Look up the destination for `trigger` fired in `phase`
pub fn transition(
    phase: ConferencePhase,
    trigger: Trigger,
    ctx: &ConferenceContext,
) -> Result<ConferencePhase, TransitionError> {
    let rule = TRANSITIONS
        .iter()
        .find(|r| r.from == phase && r.trigger == trigger)
        .ok_or(TransitionError::InvalidTransition { phase, trigger })?;

    match rule.guard {
        Some(guard) if !guard(ctx) => Err(TransitionError::GuardRejected { phase, trigger }),
        _ => Ok(rule.to),
    }
}

/// Whether any row accepts `trigger` in `phase`, ignoring guards
#[cfg(test)]
pub fn accepts(phase: ConferencePhase, trigger: Trigger) -> bool {
    TRANSITIONS
        .iter()
        .any(|r| r.from == phase && r.trigger == trigger)
}

/// Decision taken on entering `transitioning`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Move the context to the next session before firing
    pub advance: bool,
    pub trigger: Trigger,
}

/// Pick the follow-up trigger from the session after the current one
pub fn route(ctx: &ConferenceContext) -> Route {
    let Some(next) = ctx.next_session() else {
        return Route {
            advance: false,
            trigger: Trigger::StartClosing,
        };
    };
    let trigger = match next.session_type {
        SessionType::Break => Trigger::AnnounceBreak,
        SessionType::Closing => Trigger::StartClosing,
        SessionType::Keynote
        | SessionType::Talk
        | SessionType::Panel
        | SessionType::Qa
        | SessionType::Opening => Trigger::IntroduceSpeaker,
    };
    Route {
        advance: true,
        trigger,
    }
}
