//! Moderator instruction construction
//!
//! Combines a base persona prompt carrying the conference facts with a
//! phase-specific task template. Templates use `{placeholder}` slots that are
//! filled from the current and next session; unknown slots are left as-is.

use crate::agenda::{Session, SessionType};
use crate::state_machine::{ConferenceContext, ConferencePhase};
use std::collections::HashMap;

const NO_AGENDA: &str = "No conference agenda has been loaded yet.";

const BASE_PROMPT: &str = r#"You are "mAistro", a professional conference moderator.
Your tone is warm, professional and energetic. Speak in the conference language ({language}).

IDENTITY:
- Your name is mAistro, an AI-assisted conference moderator.
- You behave like an experienced, friendly, professional moderator.
- You are respectful to speakers, friendly with the audience and careful about timing.

GROUND RULES:
- Keep it short. Do not ramble.
- Introduce speakers correctly with their names and titles.
- Make transitions natural and fluent.
- Give time warnings politely but clearly.
- In Q&A sessions, organize and route questions.
- In panels, give every panelist a fair share of the floor.
- Light humour is welcome, never overdone.

CONFERENCE: {conference_title}
DATE: {date}
VENUE: {venue}
TOTAL SESSIONS: {total_sessions}
TOTAL DURATION: {total_duration} minutes

TOOLS:
- check_time_remaining: check the time left in the current session.
- get_session_info: fetch details of the current or next session.
- advance_to_next_session: move on to the next session.
- announce_time_warning: give the speaker a time warning."#;

const OPENING: &str = r#"CURRENT TASK: OPENING REMARKS

You are giving the opening speech of the conference. Your tasks:
1. Welcome the audience warmly: "Dear guests, welcome to {conference_title}!"
2. Briefly state the purpose of the event.
3. Summarize the day's programme (how many sessions, how many speakers).
4. Lead into the first session with excitement.
{notes}

Give the opening speech. When you are done, call advance_to_next_session with reason "speaker_finished"."#;

const INTRODUCING_SPEAKER: &str = r#"CURRENT TASK: SPEAKER INTRODUCTION

You are introducing the speaker you are about to invite on stage.

SPEAKER:
- Name: {speaker_name}{pronunciation}
- Title: {speaker_title}
- Organization: {speaker_organization}
- Talk: {talk_title}
- Bio: {speaker_bio}

INSTRUCTIONS:
1. Introduce the speaker briefly and memorably.
2. Mention their expertise and experience.
3. Announce the talk topic.
4. Invite them on stage: "Please welcome, {speaker_name}!"
5. Encourage the audience to applaud.

Give the introduction. When you are done, call advance_to_next_session with reason "speaker_finished"."#;

const SPEAKER_ACTIVE: &str = r#"CURRENT TASK: LISTENING MODE

{speaker_name} is on stage presenting "{talk_title}".
Allotted time: {duration_minutes} minutes.

INSTRUCTIONS:
- STAY SILENT. Do NOT interrupt the presentation.
- Only answer briefly if you are addressed directly.
- Track the time with check_time_remaining.
- When 80% of the time is used, call announce_time_warning.
- If the speaker says something like "thank you" or "that's all from me", call advance_to_next_session.

IMPORTANT: Never cut in while the speaker is talking."#;

const INTERACTING: &str = r#"CURRENT TASK: INTERACTIVE MODE

You are in an active dialogue with the speaker or the audience.
Current session: {session_title}
{speaker_info}

INSTRUCTIONS:
- Listen to questions and repeat or summarize them when needed.
- Route them to the speaker or the panelists.
- Give a short answer yourself when appropriate.
- Keep the discussion on track.
- Keep tracking the time with check_time_remaining.
- Wrap up gracefully when needed and move on."#;

const TIME_WARNING: &str = r#"CURRENT TASK: TIME WARNING

Time is running short for {speaker_name}. About {minutes_remaining} minutes remain.

INSTRUCTIONS:
- Warn politely but clearly: "{speaker_name}, we have about {minutes_remaining} minutes left."
- Thank the speaker for their understanding.
- Keep it to a single sentence.

Give the warning. You will return to listening mode automatically."#;

const THANKING_SPEAKER: &str = r#"CURRENT TASK: THANK THE SPEAKER

{speaker_name} has finished.

INSTRUCTIONS:
1. Thank the speaker sincerely: "Thank you very much, {speaker_name}."
2. Note that the talk was valuable.
3. Invite the audience to applaud: "Let's give them a big round of applause!"
4. When you are done, call advance_to_next_session with reason "speaker_finished".

Keep it short and warm."#;

const TRANSITIONING: &str = r"CURRENT TASK: TRANSITION

You are moving on to the next session.
Next session: {next_session_title} ({next_session_type})
{next_speaker_info}

Say one short transition sentence and announce the next session.";

const BREAK_ANNOUNCEMENT: &str = r#"CURRENT TASK: BREAK ANNOUNCEMENT

It is time for a break!

BREAK:
- Name: {break_title}
- Duration: {duration_minutes} minutes

INSTRUCTIONS:
1. Announce the break to the audience.
2. State its length: "We are taking a {duration_minutes} minute break."
3. Briefly mention what comes after the break.
4. Wish everyone a good break.
5. When you are done, call advance_to_next_session with reason "break_over"."#;

const BREAK_ACTIVE: &str = r"CURRENT TASK: BREAK (SILENT)

The break is in progress: {break_title}.
Total duration: {duration_minutes} minutes.

INSTRUCTIONS:
- STAY SILENT during the break.
- Only alert the audience when the break is about to end.
- Track the time with check_time_remaining.";

const BREAK_ENDING: &str = r#"CURRENT TASK: BREAK ENDING

The break is about to end. Alert the audience.

INSTRUCTIONS:
1. "Dear guests, our break is coming to an end. Please take your seats."
2. Remind them what the next session is.
3. When you are done, call advance_to_next_session with reason "break_over"."#;

const CLOSING: &str = r#"CURRENT TASK: CLOSING REMARKS

It is time to close the conference.
{notes}

INSTRUCTIONS:
1. Give a short summary of the day and the key points shared.
2. Thank every speaker by name.
3. Thank the organizers and sponsors.
4. Thank the audience: "Thank you all for being here."
5. Mention upcoming events if there are any.
6. Finish with a memorable closing line: "See you at the next event!"
7. When you are done, call advance_to_next_session with reason "speaker_finished".

Make it a warm, engaging close."#;

const ENDED: &str = "The conference is over. You do not need to speak anymore.";

const IDLE: &str = "The conference has not started yet. Wait for the operator's signal.";

const PANEL_ADDENDUM: &str = r"

PANEL SESSION:
This is a panel session. Panelists:
{panelist_list}

Panel moderation rules:
- Give the floor to panelists in turn.
- Steer the discussion and keep it on topic.
- Make sure every panelist gets equal time.
- Leave room for questions from the hall.
";

const QA_ADDENDUM: &str = r"

Q&A SESSION:
This is a question and answer session.
- Listen to questions from the hall.
- Summarize or clarify a question when needed.
- Route it to the relevant speaker or panelist.
- Politely move past off-topic questions.
- Watch the clock and share the time fairly.
";

fn phase_template(phase: ConferencePhase) -> &'static str {
    match phase {
        ConferencePhase::Idle => IDLE,
        ConferencePhase::Opening => OPENING,
        ConferencePhase::IntroducingSpeaker => INTRODUCING_SPEAKER,
        ConferencePhase::SpeakerActive => SPEAKER_ACTIVE,
        ConferencePhase::Interacting => INTERACTING,
        ConferencePhase::TimeWarning => TIME_WARNING,
        ConferencePhase::ThankingSpeaker => THANKING_SPEAKER,
        ConferencePhase::Transitioning => TRANSITIONING,
        ConferencePhase::BreakAnnouncement => BREAK_ANNOUNCEMENT,
        ConferencePhase::BreakActive => BREAK_ACTIVE,
        ConferencePhase::BreakEnding => BREAK_ENDING,
        ConferencePhase::Closing => CLOSING,
        ConferencePhase::Ended => ENDED,
    }
}

/// Build the full instruction text for `phase`
pub fn build_instructions(phase: ConferencePhase, ctx: &ConferenceContext) -> String {
    let Some(agenda) = ctx.agenda.as_deref() else {
        return NO_AGENDA.to_string();
    };

    let total_sessions = agenda.sessions.len().to_string();
    let total_duration = agenda.total_duration_minutes().to_string();
    let base: HashMap<&str, String> = HashMap::from([
        ("conference_title", agenda.title.clone()),
        ("date", agenda.date.clone()),
        ("venue", agenda.venue.clone()),
        ("language", agenda.language.clone()),
        ("total_sessions", total_sessions),
        ("total_duration", total_duration),
    ]);

    let mut prompt = fill(BASE_PROMPT, &base);
    prompt.push_str("\n\n");
    prompt.push_str(&fill(phase_template(phase), &replacements(ctx)));

    if let Some(session) = ctx.current_session() {
        let panelists = session.panelists();
        if session.session_type == SessionType::Panel && !panelists.is_empty() {
            let list = panelists
                .iter()
                .map(|p| format!("- {} ({}, {})", p.name, p.title, p.organization))
                .collect::<Vec<_>>()
                .join("\n");
            prompt.push_str(&PANEL_ADDENDUM.replace("{panelist_list}", &list));
        }
        if session.session_type == SessionType::Qa {
            prompt.push_str(QA_ADDENDUM);
        }
    }

    prompt
}

/// Short nudge sent with `trigger_speech` when a speaking phase begins
pub fn speech_prompt(phase: ConferencePhase) -> String {
    format!("You are now in the {phase} phase. Please deliver the remarks that fit it.")
}

fn replacements(ctx: &ConferenceContext) -> HashMap<&'static str, String> {
    let mut r = HashMap::new();
    r.insert(
        "conference_title",
        ctx.agenda.as_ref().map(|a| a.title.clone()).unwrap_or_default(),
    );

    if let Some(session) = ctx.current_session() {
        r.insert("session_title", session.title.clone());
        r.insert("duration_minutes", session.duration_minutes.to_string());
        r.insert("break_title", session.title.clone());
        r.insert(
            "notes",
            session
                .notes
                .as_deref()
                .filter(|n| !n.is_empty())
                .map(|n| format!("\nSPECIAL NOTES: {n}"))
                .unwrap_or_default(),
        );
        insert_speaker(&mut r, session);
    }

    let minutes = (ctx.remaining_seconds() / 60.0).round().max(1.0);
    r.insert("minutes_remaining", format!("{minutes}"));

    match ctx.next_session() {
        Some(next) => {
            r.insert("next_session_title", next.title.clone());
            r.insert("next_session_type", next.session_type.as_str().to_string());
            r.insert("next_speaker_info", next_speaker_info(next));
        }
        None => {
            r.insert("next_session_title", "Closing".to_string());
            r.insert("next_session_type", "closing".to_string());
            r.insert("next_speaker_info", String::new());
        }
    }

    r
}

fn insert_speaker(r: &mut HashMap<&'static str, String>, session: &Session) {
    if let Some(speaker) = &session.speaker {
        r.insert("speaker_name", speaker.name.clone());
        r.insert("speaker_title", speaker.title.clone());
        r.insert("speaker_organization", speaker.organization.clone());
        r.insert("talk_title", speaker.talk_title.clone());
        r.insert(
            "speaker_bio",
            speaker
                .bio
                .clone()
                .unwrap_or_else(|| "No information available.".to_string()),
        );
        r.insert(
            "pronunciation",
            speaker
                .pronunciation_hint
                .as_deref()
                .map(|hint| format!(" (pronounced: {hint})"))
                .unwrap_or_default(),
        );
        r.insert(
            "speaker_info",
            format!(
                "Speaker: {} - {}, {}",
                speaker.name, speaker.title, speaker.organization
            ),
        );
    } else {
        for key in [
            "speaker_name",
            "speaker_title",
            "speaker_organization",
            "speaker_bio",
            "pronunciation",
            "speaker_info",
        ] {
            r.insert(key, String::new());
        }
        r.insert("talk_title", session.title.clone());
    }
}

fn next_speaker_info(next: &Session) -> String {
    if let Some(speaker) = &next.speaker {
        format!(
            "Next speaker: {} - {}, {}\nTopic: {}",
            speaker.name, speaker.title, speaker.organization, speaker.talk_title
        )
    } else if !next.panelists().is_empty() {
        let names = next
            .panelists()
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("Panelists: {names}")
    } else {
        String::new()
    }
}

/// Replace known `{key}` slots; anything else stays verbatim
fn fill(template: &str, values: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some((before, after)) = rest.split_once('{') {
        out.push_str(before);
        match after.split_once('}') {
            Some((key, tail)) if values.contains_key(key) => {
                out.push_str(&values[key]);
                rest = tail;
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
