//! Triggers that drive phase transitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Labels of the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    StartConference,
    OpeningComplete,
    IntroduceSpeaker,
    IntroductionComplete,
    EnterInteraction,
    ExitInteraction,
    TimeWarning,
    WarningDelivered,
    SpeakerFinished,
    ThankComplete,
    AnnounceBreak,
    BreakAnnounced,
    BreakEndingSoon,
    BreakOver,
    StartClosing,
    ClosingComplete,
    OperatorNext,
}

impl Trigger {
    pub const ALL: [Trigger; 17] = [
        Trigger::StartConference,
        Trigger::OpeningComplete,
        Trigger::IntroduceSpeaker,
        Trigger::IntroductionComplete,
        Trigger::EnterInteraction,
        Trigger::ExitInteraction,
        Trigger::TimeWarning,
        Trigger::WarningDelivered,
        Trigger::SpeakerFinished,
        Trigger::ThankComplete,
        Trigger::AnnounceBreak,
        Trigger::BreakAnnounced,
        Trigger::BreakEndingSoon,
        Trigger::BreakOver,
        Trigger::StartClosing,
        Trigger::ClosingComplete,
        Trigger::OperatorNext,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::StartConference => "start_conference",
            Trigger::OpeningComplete => "opening_complete",
            Trigger::IntroduceSpeaker => "introduce_speaker",
            Trigger::IntroductionComplete => "introduction_complete",
            Trigger::EnterInteraction => "enter_interaction",
            Trigger::ExitInteraction => "exit_interaction",
            Trigger::TimeWarning => "time_warning",
            Trigger::WarningDelivered => "warning_delivered",
            Trigger::SpeakerFinished => "speaker_finished",
            Trigger::ThankComplete => "thank_complete",
            Trigger::AnnounceBreak => "announce_break",
            Trigger::BreakAnnounced => "break_announced",
            Trigger::BreakEndingSoon => "break_ending_soon",
            Trigger::BreakOver => "break_over",
            Trigger::StartClosing => "start_closing",
            Trigger::ClosingComplete => "closing_complete",
            Trigger::OperatorNext => "operator_next",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the agent asked to move on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceReason {
    #[default]
    SpeakerFinished,
    TimeExpired,
    BreakOver,
    OperatorSkip,
}

impl AdvanceReason {
    pub fn as_str(self) -> &'static str {
        match self {
            AdvanceReason::SpeakerFinished => "speaker_finished",
            AdvanceReason::TimeExpired => "time_expired",
            AdvanceReason::BreakOver => "break_over",
            AdvanceReason::OperatorSkip => "operator_skip",
        }
    }
}

impl fmt::Display for AdvanceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
