//! Conference state machine
//!
//! Pure transition table plus a thin stateful machine that owns the phase,
//! routes through `transitioning` and notifies phase observers.

mod effect;
pub mod event;
mod machine;
pub mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{phase_effects, Effect};
pub use event::{AdvanceReason, Trigger};
pub use machine::{ConferenceStateMachine, ObserverError, PhaseObserver};
pub use state::{ConferenceContext, ConferencePhase};
pub use transition::TransitionError;
