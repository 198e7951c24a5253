//! Effects produced by phase changes

use super::{ConferenceContext, ConferencePhase};
use crate::runtime::{ModeratorStatus, ServerMessage, StateSnapshot};
use crate::system_prompt::{build_instructions, speech_prompt};

/// Side effects the run executes after entering a phase
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Replace the voice agent's standing instructions
    UpdateInstructions { instructions: String },

    /// Make sure the session clock is running for this session
    StartTimer { session_index: usize },

    StopTimer,

    /// Notify the operator UI
    NotifyClient(ServerMessage),

    /// Ask the voice agent to speak now
    TriggerSpeech { prompt: String },
}

impl Effect {
    pub fn notify_state(phase: ConferencePhase, ctx: &ConferenceContext) -> Self {
        Effect::NotifyClient(ServerMessage::StateUpdate(StateSnapshot::of(phase, ctx)))
    }

    pub fn moderator_status(status: ModeratorStatus) -> Self {
        Effect::NotifyClient(ServerMessage::ModeratorStatus { status })
    }
}

/// Ordered effects for entering `phase`: instructions, clock, state
/// update, then speak-or-idle.
pub fn phase_effects(phase: ConferencePhase, ctx: &ConferenceContext) -> Vec<Effect> {
    let mut effects = vec![Effect::UpdateInstructions {
        instructions: build_instructions(phase, ctx),
    }];

    if phase.is_timed() {
        effects.push(Effect::StartTimer {
            session_index: ctx.current_session_index,
        });
    } else if phase.stops_timer() {
        effects.push(Effect::StopTimer);
    }

    effects.push(Effect::notify_state(phase, ctx));

    if phase.is_speaking() {
        effects.push(Effect::moderator_status(ModeratorStatus::Speaking));
        effects.push(Effect::TriggerSpeech {
            prompt: speech_prompt(phase),
        });
    } else {
        effects.push(Effect::moderator_status(ModeratorStatus::Idle));
    }

    if phase == ConferencePhase::Ended {
        effects.push(Effect::NotifyClient(ServerMessage::ConferenceEnded {}));
    }

    effects
}
