//! Mock implementations for testing
//!
//! These mocks enable integration testing of a conference run without
//! network I/O.

use super::{ClientCommand, ConferenceRuntime, RunHandle, RunSettings, ServerMessage};
use crate::realtime::{ConnectInfo, ProviderError, ProviderEvent, SessionSetup, VoiceProvider};
use crate::state_machine::ConferencePhase;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// Mock voice provider
// ============================================================================

/// One recorded call into the provider
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    Connect {
        instructions: String,
        voice: String,
        tools: Vec<String>,
    },
    Disconnect,
    UpdateInstructions(String),
    TriggerSpeech(String),
    ToolResult {
        call_id: String,
        name: String,
        result: Value,
    },
    CancelResponse,
    Audio(usize),
}

/// Provider that records every call and lets tests inject events
#[derive(Default)]
pub struct MockVoiceProvider {
    connected: AtomicBool,
    connect_error: Mutex<Option<ProviderError>>,
    calls: Mutex<Vec<ProviderCall>>,
    events: Mutex<Option<mpsc::Sender<ProviderEvent>>>,
}

impl MockVoiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `connect` fails with an auth error
    pub fn failing() -> Self {
        Self::failing_with(ProviderError::auth("invalid API key"))
    }

    pub fn failing_with(error: ProviderError) -> Self {
        let mock = Self::default();
        *mock.connect_error.lock().unwrap() = Some(error);
        mock
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn speech_prompts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ProviderCall::TriggerSpeech(prompt) => Some(prompt),
                _ => None,
            })
            .collect()
    }

    /// Push an event into the run as if the provider had sent it
    pub async fn emit(&self, event: ProviderEvent) {
        let sender = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("provider not connected");
        sender.send(event).await.expect("run queue closed");
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl VoiceProvider for MockVoiceProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-voice"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(
        &self,
        setup: SessionSetup,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<ConnectInfo, ProviderError> {
        self.record(ProviderCall::Connect {
            instructions: setup.instructions,
            voice: setup.voice,
            tools: setup.tools.into_iter().map(|t| t.name).collect(),
        });
        if let Some(error) = self.connect_error.lock().unwrap().clone() {
            return Err(error);
        }
        *self.events.lock().unwrap() = Some(events);
        self.connected.store(true, Ordering::SeqCst);
        Ok(ConnectInfo {
            provider: "mock".to_string(),
            model: "mock-voice".to_string(),
            session_id: Some("sess-1".to_string()),
            client_secret: None,
        })
    }

    async fn disconnect(&self) {
        self.record(ProviderCall::Disconnect);
        self.connected.store(false, Ordering::SeqCst);
        self.events.lock().unwrap().take();
    }

    async fn update_instructions(&self, instructions: &str) -> Result<(), ProviderError> {
        self.record(ProviderCall::UpdateInstructions(instructions.to_string()));
        Ok(())
    }

    async fn trigger_speech(&self, prompt: &str) -> Result<(), ProviderError> {
        self.record(ProviderCall::TriggerSpeech(prompt.to_string()));
        Ok(())
    }

    async fn send_tool_result(
        &self,
        call_id: &str,
        name: &str,
        result: &Value,
    ) -> Result<(), ProviderError> {
        self.record(ProviderCall::ToolResult {
            call_id: call_id.to_string(),
            name: name.to_string(),
            result: result.clone(),
        });
        Ok(())
    }

    async fn cancel_response(&self) -> Result<(), ProviderError> {
        self.record(ProviderCall::CancelResponse);
        Ok(())
    }

    async fn send_audio(&self, pcm: &[u8]) -> Result<(), ProviderError> {
        self.record(ProviderCall::Audio(pcm.len()));
        Ok(())
    }
}

// ============================================================================
// Test run harness
// ============================================================================

/// Builder for a conference run wired to a mock provider
pub struct TestRun {
    provider: Arc<MockVoiceProvider>,
    settings: RunSettings,
}

impl TestRun {
    pub fn new() -> Self {
        Self {
            provider: Arc::new(MockVoiceProvider::new()),
            settings: RunSettings::default(),
        }
    }

    pub fn provider(mut self, provider: MockVoiceProvider) -> Self {
        self.provider = Arc::new(provider);
        self
    }

    pub fn settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn spawn(self) -> RunningTest {
        let (runtime, handle) = ConferenceRuntime::new(Arc::clone(&self.provider), self.settings);
        let messages = handle.subscribe();
        let task = tokio::spawn(runtime.run());
        RunningTest {
            provider: self.provider,
            handle,
            messages,
            task,
        }
    }
}

pub struct RunningTest {
    pub provider: Arc<MockVoiceProvider>,
    pub handle: RunHandle,
    messages: broadcast::Receiver<ServerMessage>,
    task: tokio::task::JoinHandle<()>,
}

impl RunningTest {
    pub async fn send(&self, command: ClientCommand) {
        self.handle.commands.send(command).await.unwrap();
    }

    /// Next message matching `pred`, skipping everything else
    pub async fn expect(&mut self, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        let wait = async {
            loop {
                match self.messages.recv().await {
                    Ok(message) if pred(&message) => return message,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => panic!("run closed"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(3600), wait)
            .await
            .expect("timed out waiting for message")
    }

    pub async fn wait_for_state(&mut self, state: ConferencePhase) -> ServerMessage {
        self.expect(|m| matches!(m, ServerMessage::StateUpdate(s) if s.state == state))
            .await
    }

    pub async fn expect_error(&mut self) -> String {
        match self.expect(|m| matches!(m, ServerMessage::Error { .. })).await {
            ServerMessage::Error { message } => message,
            _ => unreachable!(),
        }
    }

    /// Load the agenda, connect, and start; returns once opening is entered
    pub async fn start(&mut self, agenda: Value) {
        self.send(ClientCommand::LoadAgenda(agenda)).await;
        self.expect(|m| matches!(m, ServerMessage::AgendaLoaded(_))).await;
        self.send(ClientCommand::ConnectAi).await;
        self.expect(|m| matches!(m, ServerMessage::AiConnected { .. })).await;
        self.send(ClientCommand::StartConference).await;
        self.wait_for_state(ConferencePhase::Opening).await;
    }

    /// Close the command queue and wait for the run to wind down
    pub async fn shutdown(self) -> Arc<MockVoiceProvider> {
        drop(self.handle);
        self.task.await.unwrap();
        self.provider
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agenda::fixtures::sample_agenda_json;
    use crate::runtime::ModeratorStatus;
    use crate::state_machine::ConferencePhase as P;
    use serde_json::json;
    use std::io::Write;
    use tokio::time::Instant;

    /// Opening, one talk, a break and closing, one minute each
    fn short_agenda() -> Value {
        json!({
            "id": "short",
            "title": "Short Day",
            "date": "2025-01-01",
            "venue": "Hall",
            "moderator_voice": "Kore",
            "sessions": [
                {"id": "a", "type": "opening", "title": "Hi", "duration_minutes": 1},
                {"id": "b", "type": "talk", "title": "Rust", "duration_minutes": 1,
                 "speaker": {"name": "Ferris", "title": "Crab", "organization": "Rust",
                             "talk_title": "Ownership"}},
                {"id": "c", "type": "break", "title": "Tea", "duration_minutes": 1},
                {"id": "d", "type": "closing", "title": "Bye", "duration_minutes": 1}
            ]
        })
    }

    fn buffered(seconds: u64) -> RunSettings {
        RunSettings {
            break_ending_buffer_seconds: seconds,
            ..RunSettings::default()
        }
    }

    #[tokio::test]
    async fn test_mock_provider_records_calls() {
        let mock = MockVoiceProvider::new();
        let (tx, mut rx) = mpsc::channel(4);
        let setup = SessionSetup {
            instructions: "be brief".to_string(),
            voice: "Orus".to_string(),
            tools: vec![],
        };
        mock.connect(setup, tx).await.unwrap();
        assert!(mock.is_connected());

        mock.trigger_speech("hello").await.unwrap();
        mock.emit(ProviderEvent::TurnComplete).await;
        assert_eq!(rx.recv().await, Some(ProviderEvent::TurnComplete));
        assert_eq!(mock.speech_prompts(), vec!["hello"]);

        mock.disconnect().await;
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn test_start_requires_agenda_then_connection() {
        let mut run = TestRun::new().spawn();

        run.send(ClientCommand::StartConference).await;
        assert_eq!(run.expect_error().await, "Load an agenda first");

        run.send(ClientCommand::ConnectAi).await;
        assert_eq!(run.expect_error().await, "Load an agenda first");

        run.send(ClientCommand::LoadAgenda(sample_agenda_json())).await;
        run.expect(|m| matches!(m, ServerMessage::AgendaLoaded(_))).await;

        run.send(ClientCommand::StartConference).await;
        assert!(run.expect_error().await.contains("CONNECT_AI"));

        run.send(ClientCommand::ConnectAi).await;
        let connected = run.expect(|m| matches!(m, ServerMessage::AiConnected { .. })).await;
        assert_eq!(
            connected,
            ServerMessage::AiConnected {
                provider: "mock".to_string(),
                model: "mock-voice".to_string(),
                session_id: Some("sess-1".to_string()),
                client_secret: None,
            }
        );

        match &run.provider.calls()[0] {
            ProviderCall::Connect { voice, tools, .. } => {
                assert_eq!(voice, "coral");
                assert_eq!(
                    tools,
                    &[
                        "advance_to_next_session",
                        "check_time_remaining",
                        "get_session_info",
                        "announce_time_warning"
                    ]
                );
            }
            other => panic!("expected connect, got {other:?}"),
        }

        run.send(ClientCommand::StartConference).await;
        run.wait_for_state(P::Opening).await;

        let provider = run.shutdown().await;
        assert_eq!(provider.speech_prompts().len(), 1);
        assert_eq!(provider.calls().last(), Some(&ProviderCall::Disconnect));
    }

    #[tokio::test]
    async fn test_connect_failure_reported() {
        let mut run = TestRun::new().provider(MockVoiceProvider::failing()).spawn();
        run.send(ClientCommand::LoadAgenda(sample_agenda_json())).await;
        run.send(ClientCommand::ConnectAi).await;
        let error = run.expect_error().await;
        assert!(error.starts_with("AI connection failed"), "{error}");
        assert!(!error.contains("retry"), "{error}");
    }

    #[tokio::test]
    async fn test_transient_connect_failure_suggests_retry() {
        let mut run = TestRun::new()
            .provider(MockVoiceProvider::failing_with(ProviderError::timeout(
                "no setupComplete",
            )))
            .spawn();
        run.send(ClientCommand::LoadAgenda(sample_agenda_json())).await;
        run.send(ClientCommand::ConnectAi).await;
        let error = run.expect_error().await;
        assert_eq!(
            error,
            "AI connection failed: no setupComplete (send CONNECT_AI to retry)"
        );
    }

    #[tokio::test]
    async fn test_invalid_agenda_reports_field() {
        let mut run = TestRun::new().spawn();
        run.send(ClientCommand::LoadAgenda(json!({"id": "x"}))).await;
        let error = run.expect_error().await;
        assert!(error.starts_with("Agenda load failed"), "{error}");
        assert!(error.contains("title"), "{error}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_speaker_flow_driven_by_turns_and_tools() {
        let mut run = TestRun::new().spawn();
        run.start(sample_agenda_json()).await;

        // opening → transitioning → introducing_speaker speaks once
        run.provider.emit(ProviderEvent::TurnComplete).await;
        let intro = run.wait_for_state(P::IntroducingSpeaker).await;
        match intro {
            ServerMessage::StateUpdate(s) => {
                assert_eq!(s.session_index, 1);
                assert_eq!(s.speaker_name.as_deref(), Some("Ada Lovelace"));
            }
            _ => unreachable!(),
        }

        run.provider.emit(ProviderEvent::TurnComplete).await;
        run.wait_for_state(P::SpeakerActive).await;
        run.expect(|m| matches!(m, ServerMessage::TimerTick(t) if t.session_index == 1))
            .await;

        // Silent phase: a stray turn end does not move on
        run.provider.emit(ProviderEvent::TurnComplete).await;
        run.provider
            .emit(ProviderEvent::ToolCall {
                call_id: "call-1".to_string(),
                name: "advance_to_next_session".to_string(),
                arguments: json!({"reason": "speaker_finished"}),
            })
            .await;
        run.wait_for_state(P::ThankingSpeaker).await;

        let provider = run.shutdown().await;
        // opening and introduction; the thanks is the reply to the tool result
        assert_eq!(provider.speech_prompts().len(), 2);
        let result = provider
            .calls()
            .into_iter()
            .find_map(|c| match c {
                ProviderCall::ToolResult { call_id, result, .. } if call_id == "call-1" => {
                    Some(result)
                }
                _ => None,
            })
            .expect("tool result sent");
        assert_eq!(result["status"], "ok");
    }

    #[tokio::test]
    async fn test_tool_result_sent_before_phase_effects() {
        let mut run = TestRun::new().spawn();
        run.start(sample_agenda_json()).await;
        run.provider.emit(ProviderEvent::TurnComplete).await;
        run.wait_for_state(P::IntroducingSpeaker).await;
        run.provider.emit(ProviderEvent::TurnComplete).await;
        run.wait_for_state(P::SpeakerActive).await;

        run.provider
            .emit(ProviderEvent::ToolCall {
                call_id: "call-7".to_string(),
                name: "advance_to_next_session".to_string(),
                arguments: json!({"reason": "speaker_finished"}),
            })
            .await;
        run.wait_for_state(P::ThankingSpeaker).await;

        let calls = run.shutdown().await.calls();
        let result_at = calls
            .iter()
            .position(|c| matches!(c, ProviderCall::ToolResult { call_id, .. } if call_id == "call-7"))
            .expect("tool result sent");
        let after: Vec<_> = calls[result_at + 1..].iter().collect();
        assert!(
            !after.iter().any(|c| matches!(c, ProviderCall::TriggerSpeech(_))),
            "{calls:?}"
        );
        assert!(
            after.iter().any(|c| matches!(c, ProviderCall::UpdateInstructions(_))),
            "{calls:?}"
        );
        assert!(matches!(calls.last(), Some(ProviderCall::Disconnect)), "{calls:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_warns_then_expires_speaker() {
        let mut run = TestRun::new().spawn();
        run.start(short_agenda()).await;
        run.provider.emit(ProviderEvent::TurnComplete).await;
        run.wait_for_state(P::IntroducingSpeaker).await;
        run.provider.emit(ProviderEvent::TurnComplete).await;
        run.wait_for_state(P::SpeakerActive).await;

        let started = Instant::now();
        run.wait_for_state(P::TimeWarning).await;
        let warned_after = started.elapsed().as_secs();
        assert!((47..=49).contains(&warned_after), "{warned_after}");

        run.provider.emit(ProviderEvent::TurnComplete).await;
        run.wait_for_state(P::SpeakerActive).await;

        run.wait_for_state(P::ThankingSpeaker).await;
        let expired_after = started.elapsed().as_secs();
        assert!((59..=61).contains(&expired_after), "{expired_after}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_ends_early_by_buffer() {
        let mut run = TestRun::new().settings(buffered(20)).spawn();
        run.start(short_agenda()).await;
        run.send(ClientCommand::NextSession).await;
        run.wait_for_state(P::IntroducingSpeaker).await;
        run.provider.emit(ProviderEvent::TurnComplete).await;
        run.wait_for_state(P::SpeakerActive).await;
        run.send(ClientCommand::SpeakerFinished).await;
        run.wait_for_state(P::ThankingSpeaker).await;
        run.provider.emit(ProviderEvent::TurnComplete).await;
        run.wait_for_state(P::BreakAnnouncement).await;
        run.provider.emit(ProviderEvent::TurnComplete).await;
        run.wait_for_state(P::BreakActive).await;

        let started = Instant::now();
        run.wait_for_state(P::BreakEnding).await;
        let after = started.elapsed().as_secs();
        assert!((39..=41).contains(&after), "{after}");

        run.provider.emit(ProviderEvent::TurnComplete).await;
        let closing = run.wait_for_state(P::Closing).await;
        match closing {
            ServerMessage::StateUpdate(s) => assert_eq!(s.session_index, 3),
            _ => unreachable!(),
        }
        run.provider.emit(ProviderEvent::TurnComplete).await;
        run.expect(|m| matches!(m, ServerMessage::ConferenceEnded {})).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_session_clock() {
        let mut run = TestRun::new().spawn();
        run.start(short_agenda()).await;
        run.send(ClientCommand::NextSession).await;
        run.wait_for_state(P::IntroducingSpeaker).await;
        run.provider.emit(ProviderEvent::TurnComplete).await;
        run.wait_for_state(P::SpeakerActive).await;
        run.expect(|m| matches!(m, ServerMessage::TimerTick(_))).await;

        run.send(ClientCommand::Pause).await;
        let paused = run
            .expect(|m| matches!(m, ServerMessage::StateUpdate(s) if s.is_paused))
            .await;
        match paused {
            ServerMessage::StateUpdate(s) => assert_eq!(s.state, P::SpeakerActive),
            _ => unreachable!(),
        }

        tokio::time::sleep(Duration::from_secs(300)).await;
        run.send(ClientCommand::Resume).await;
        run.expect(|m| matches!(m, ServerMessage::StateUpdate(s) if !s.is_paused))
            .await;
        let tick = run.expect(|m| matches!(m, ServerMessage::TimerTick(_))).await;
        match tick {
            ServerMessage::TimerTick(t) => assert!(t.elapsed_seconds < 10, "{}", t.elapsed_seconds),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_operator_commands_rejected_out_of_phase() {
        let mut run = TestRun::new().spawn();
        run.send(ClientCommand::LoadAgenda(sample_agenda_json())).await;

        run.send(ClientCommand::SpeakerFinished).await;
        assert!(run.expect_error().await.contains("idle"));

        run.send(ClientCommand::NextSession).await;
        assert!(run.expect_error().await.contains("operator_next"));

        run.send(ClientCommand::ConnectAi).await;
        run.send(ClientCommand::StartConference).await;
        run.wait_for_state(P::Opening).await;

        run.send(ClientCommand::LoadAgenda(sample_agenda_json())).await;
        assert!(run.expect_error().await.contains("running"));
    }

    #[tokio::test]
    async fn test_override_cancels_then_speaks() {
        let mut run = TestRun::new().spawn();
        run.start(sample_agenda_json()).await;

        run.send(ClientCommand::OverrideMessage {
            message: "Please silence your phones".to_string(),
        })
        .await;
        run.send(ClientCommand::Pause).await;
        run.expect(|m| matches!(m, ServerMessage::StateUpdate(s) if s.is_paused))
            .await;

        let calls = run.provider.calls();
        let n = calls.len();
        assert_eq!(calls[n - 2], ProviderCall::CancelResponse);
        assert_eq!(
            calls[n - 1],
            ProviderCall::TriggerSpeech("Please silence your phones".to_string())
        );
    }

    #[tokio::test]
    async fn test_provider_events_forwarded() {
        let mut run = TestRun::new().spawn();
        run.start(sample_agenda_json()).await;

        run.provider
            .emit(ProviderEvent::InputTranscript {
                text: "Where is the coffee?".to_string(),
            })
            .await;
        assert_eq!(
            run.expect(|m| matches!(m, ServerMessage::Transcript { .. })).await,
            ServerMessage::Transcript {
                text: "[Hall] Where is the coffee?".to_string()
            }
        );

        run.provider.emit(ProviderEvent::Interrupted).await;
        run.expect(|m| {
            matches!(m, ServerMessage::ModeratorStatus { status } if *status == ModeratorStatus::Listening)
        })
        .await;

        run.provider
            .emit(ProviderEvent::Disconnected {
                reason: "socket closed".to_string(),
            })
            .await;
        assert_eq!(run.expect_error().await, "AI connection lost: socket closed");
    }

    #[tokio::test]
    async fn test_microphone_audio_forwarded_when_connected() {
        let run = TestRun::new().spawn();
        run.send(ClientCommand::Audio(vec![0; 320])).await;
        run.send(ClientCommand::LoadAgenda(sample_agenda_json())).await;
        run.send(ClientCommand::ConnectAi).await;
        run.send(ClientCommand::Audio(vec![0; 640])).await;

        let provider = run.shutdown().await;
        let audio: Vec<_> = provider
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ProviderCall::Audio(_)))
            .collect();
        assert_eq!(audio, vec![ProviderCall::Audio(640)]);
    }

    #[tokio::test]
    async fn test_agenda_file_preloaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", sample_agenda_json()).unwrap();

        let settings = RunSettings {
            agenda_file: Some(file.path().to_path_buf()),
            ..RunSettings::default()
        };
        let mut run = TestRun::new().settings(settings).spawn();
        let loaded = run.expect(|m| matches!(m, ServerMessage::AgendaLoaded(_))).await;
        match loaded {
            ServerMessage::AgendaLoaded(summary) => assert_eq!(summary.title, "Dev Summit 2025"),
            _ => unreachable!(),
        }
    }
}
