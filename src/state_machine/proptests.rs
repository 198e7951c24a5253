//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across generated agendas and
//! arbitrary sequences of operations.

use super::machine::{ConferenceStateMachine, Entered};
use super::transition::{accepts, route, transition, TransitionError};
use super::*;
use crate::agenda::{Agenda, Session, SessionType, SpeakerInfo};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_phase() -> impl Strategy<Value = ConferencePhase> {
    proptest::sample::select(ConferencePhase::ALL.to_vec())
}

fn arb_trigger() -> impl Strategy<Value = Trigger> {
    proptest::sample::select(Trigger::ALL.to_vec())
}

fn arb_session_type() -> impl Strategy<Value = SessionType> {
    proptest::sample::select(SessionType::ALL.to_vec())
}

fn arb_reason() -> impl Strategy<Value = AdvanceReason> {
    prop_oneof![
        Just(AdvanceReason::SpeakerFinished),
        Just(AdvanceReason::TimeExpired),
        Just(AdvanceReason::BreakOver),
        Just(AdvanceReason::OperatorSkip),
    ]
}

fn session(index: usize, session_type: SessionType, minutes: u32) -> Session {
    let speaker = session_type.is_speaker_session().then(|| SpeakerInfo {
        name: format!("Speaker {index}"),
        title: "Engineer".to_string(),
        organization: "Acme".to_string(),
        talk_title: format!("Talk {index}"),
        bio: None,
        pronunciation_hint: None,
    });
    Session {
        id: format!("s{index}"),
        session_type,
        title: format!("Session {index}"),
        duration_minutes: minutes,
        description: None,
        speaker,
        panelists: None,
        notes: None,
    }
}

fn arb_agenda() -> impl Strategy<Value = Arc<Agenda>> {
    prop::collection::vec((arb_session_type(), 1u32..90), 1..8).prop_map(|specs| {
        Arc::new(Agenda {
            id: "generated".to_string(),
            title: "Generated".to_string(),
            date: "2025-01-01".to_string(),
            venue: "Hall".to_string(),
            language: "en".to_string(),
            moderator_voice: "Orus".to_string(),
            sessions: specs
                .into_iter()
                .enumerate()
                .map(|(i, (t, m))| session(i, t, m))
                .collect(),
        })
    })
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Start,
    ResponseDone,
    Advance(AdvanceReason),
    OperatorNext,
    TimeWarning,
    TimeExpired,
    ToggleInteract,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Start),
        3 => Just(Op::ResponseDone),
        1 => arb_reason().prop_map(Op::Advance),
        1 => Just(Op::OperatorNext),
        1 => Just(Op::TimeWarning),
        1 => Just(Op::TimeExpired),
        1 => Just(Op::ToggleInteract),
    ]
}

fn apply(sm: &mut ConferenceStateMachine, op: Op) -> Result<Entered, TransitionError> {
    match op {
        Op::Start => sm.start(),
        Op::ResponseDone => sm.response_done(),
        Op::Advance(reason) => sm.advance_session(reason),
        Op::OperatorNext => sm.operator_next(),
        Op::TimeWarning => sm.time_warning(),
        Op::TimeExpired => sm.time_expired(),
        Op::ToggleInteract => sm.toggle_interact(),
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_rejected_triggers_never_yield_a_phase(
        phase in arb_phase(),
        trigger in arb_trigger(),
        agenda in arb_agenda(),
    ) {
        let ctx = ConferenceContext::new(agenda);
        let result = transition(phase, trigger, &ctx);
        prop_assert_eq!(result.is_ok(), accepts(phase, trigger));
    }

    #[test]
    fn prop_failed_operations_leave_phase_unchanged(
        agenda in arb_agenda(),
        ops in prop::collection::vec(arb_op(), 0..40),
    ) {
        let mut sm = ConferenceStateMachine::with_agenda(agenda);
        for op in ops {
            let before = sm.phase();
            let index_before = sm.context().current_session_index;
            match apply(&mut sm, op) {
                Err(_) => {
                    prop_assert_eq!(sm.phase(), before);
                    prop_assert_eq!(sm.context().current_session_index, index_before);
                }
                Ok(entered) if entered.is_empty() => prop_assert_eq!(sm.phase(), before),
                Ok(entered) => prop_assert_eq!(entered.last().copied(), Some(sm.phase())),
            }
        }
    }

    #[test]
    fn prop_context_invariants_hold(
        agenda in arb_agenda(),
        ops in prop::collection::vec(arb_op(), 0..60),
        elapsed in 0.0f64..10_000.0,
    ) {
        let len = agenda.sessions.len();
        let mut sm = ConferenceStateMachine::with_agenda(agenda);
        for op in ops {
            let _ = apply(&mut sm, op);
            sm.context_mut().elapsed_seconds = elapsed;
            let ctx = sm.context();
            prop_assert!(ctx.current_session_index < len);
            prop_assert!(ctx.remaining_seconds() >= 0.0);
            prop_assert!((0.0..=1.0).contains(&ctx.progress_ratio()));
            prop_assert_ne!(sm.phase(), ConferencePhase::Transitioning);
        }
    }

    #[test]
    fn prop_ended_is_terminal(
        agenda in arb_agenda(),
        ops in prop::collection::vec(arb_op(), 0..80),
    ) {
        let mut sm = ConferenceStateMachine::with_agenda(agenda);
        let mut ended = false;
        for op in ops {
            let _ = apply(&mut sm, op);
            if ended {
                prop_assert_eq!(sm.phase(), ConferencePhase::Ended);
            }
            ended = sm.phase() == ConferencePhase::Ended;
        }
    }

    #[test]
    fn prop_advance_from_speaker_phases_thanks_the_speaker(
        agenda in arb_agenda(),
        phase in prop_oneof![
            Just(ConferencePhase::SpeakerActive),
            Just(ConferencePhase::Interacting),
            Just(ConferencePhase::TimeWarning),
        ],
        reason in arb_reason(),
    ) {
        let ctx = ConferenceContext::new(agenda);
        prop_assert_eq!(
            transition(phase, Trigger::SpeakerFinished, &ctx),
            Ok(ConferencePhase::ThankingSpeaker)
        );

        // Drive a real machine into the phase through its public operations
        let mut sm = ConferenceStateMachine::with_agenda(Arc::clone(ctx.agenda.as_ref().unwrap()));
        sm.start().unwrap();
        for _ in 0..40 {
            if sm.phase().is_speaker_phase() || sm.phase() == ConferencePhase::Ended {
                break;
            }
            let _ = sm.response_done();
            if sm.phase().is_speaker_phase() {
                break;
            }
            let _ = sm.time_expired();
        }
        if sm.phase().is_speaker_phase() {
            sm.advance_session(reason).unwrap();
            prop_assert_eq!(sm.phase(), ConferencePhase::ThankingSpeaker);
        }
    }

    #[test]
    fn prop_router_advances_exactly_one_session(
        agenda in arb_agenda(),
        index in 0usize..8,
    ) {
        let len = agenda.sessions.len();
        let mut ctx = ConferenceContext::new(agenda);
        ctx.current_session_index = index.min(len - 1);
        ctx.elapsed_seconds = 12.0;
        ctx.time_warning_issued = true;

        let before = ctx.current_session_index;
        let decision = route(&ctx);
        prop_assert_eq!(decision.advance, ctx.has_next_session());
        if decision.advance {
            ctx.begin_next_session();
            prop_assert_eq!(ctx.current_session_index, before + 1);
            prop_assert!(ctx.elapsed_seconds.abs() < f64::EPSILON);
            prop_assert!(!ctx.time_warning_issued);
        } else {
            prop_assert_eq!(decision.trigger, Trigger::StartClosing);
        }
    }

    #[test]
    fn prop_phase_effects_always_rebuild_instructions(
        agenda in arb_agenda(),
        phase in arb_phase(),
    ) {
        let ctx = ConferenceContext::new(agenda);
        let effects = phase_effects(phase, &ctx);
        let is_instruction_update = matches!(
            effects.first(),
            Some(Effect::UpdateInstructions { instructions }) if !instructions.is_empty()
        );
        prop_assert!(is_instruction_update);
        let speaks = effects.iter().any(|e| matches!(e, Effect::TriggerSpeech { .. }));
        prop_assert_eq!(speaks, phase.is_speaking());
    }
}
