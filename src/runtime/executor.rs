//! Conference run executor
//!
//! Maps inbound signals to state machine operations and phase changes to
//! outbound effects. Everything that mutates the run happens on the task
//! running `ConferenceRuntime::run`.

use super::{ClientCommand, ModeratorStatus, ServerMessage, StateSnapshot, TickPayload};
use crate::agenda::{AgendaStore, AgendaSummary};
use crate::config::Config;
use crate::realtime::{ProviderEvent, SessionSetup, VoiceProvider};
use crate::state_machine::{
    phase_effects, AdvanceReason, ConferenceContext, ConferencePhase, ConferenceStateMachine,
    Effect, ObserverError, PhaseObserver, TransitionError,
};
use crate::system_prompt::build_instructions;
use crate::timer::{
    SessionTimer, TickObserver, TimerBinding, TimerSignal, TimerTick, DEFAULT_WARNING_THRESHOLD,
    TICK_INTERVAL,
};
use crate::tools::{ToolContext, ToolRegistry};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

const COMMAND_BUFFER: usize = 64;
const PROVIDER_BUFFER: usize = 256;
const TIMER_BUFFER: usize = 32;
const BROADCAST_BUFFER: usize = 256;

/// Prefix for transcripts of audience speech
const HALL_PREFIX: &str = "[Hall]";

/// Per-run knobs taken from the server configuration
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub time_warning_threshold: f64,
    pub break_ending_buffer_seconds: u64,
    pub tick_interval: Duration,
    /// Agenda loaded into every new run
    pub agenda_file: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            time_warning_threshold: DEFAULT_WARNING_THRESHOLD,
            break_ending_buffer_seconds: crate::config::DEFAULT_BREAK_ENDING_BUFFER_SECONDS,
            tick_interval: TICK_INTERVAL,
            agenda_file: None,
        }
    }
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            time_warning_threshold: config.time_warning_threshold,
            break_ending_buffer_seconds: config.break_ending_buffer_seconds,
            tick_interval: TICK_INTERVAL,
            agenda_file: config.agenda_file.clone(),
        }
    }
}

/// Handle the connection side keeps to talk to its run
#[derive(Clone)]
pub struct RunHandle {
    pub commands: mpsc::Sender<ClientCommand>,
    outbound: broadcast::Sender<ServerMessage>,
}

impl RunHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.outbound.subscribe()
    }

    /// Send straight to the client, bypassing the run
    pub fn notify(&self, message: ServerMessage) {
        let _ = self.outbound.send(message);
    }
}

/// Collects the effects of every phase entered during one operation
#[derive(Default)]
struct EffectCollector {
    pending: Mutex<Vec<Effect>>,
}

impl EffectCollector {
    fn drain(&self) -> Vec<Effect> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl PhaseObserver for EffectCollector {
    fn on_phase_change(
        &self,
        phase: ConferencePhase,
        ctx: &ConferenceContext,
    ) -> Result<(), ObserverError> {
        self.pending
            .lock()
            .map_err(|_| ObserverError::new("effect queue poisoned"))?
            .extend(phase_effects(phase, ctx));
        Ok(())
    }
}

/// Publishes every timer tick as `TIMER_TICK`
struct TickBroadcaster {
    outbound: broadcast::Sender<ServerMessage>,
}

impl TickObserver for TickBroadcaster {
    fn on_tick(&self, tick: &TimerTick) -> Result<(), ObserverError> {
        // No subscribers just means the client is gone
        let _ = self
            .outbound
            .send(ServerMessage::TimerTick(TickPayload::from(tick)));
        Ok(())
    }
}

/// One conference run, generic over the voice provider
pub struct ConferenceRuntime<P>
where
    P: VoiceProvider + 'static,
{
    settings: RunSettings,
    machine: ConferenceStateMachine,
    store: AgendaStore,
    timer: SessionTimer,
    tools: ToolRegistry,
    provider: P,
    effects: Arc<EffectCollector>,
    commands: mpsc::Receiver<ClientCommand>,
    provider_tx: mpsc::Sender<ProviderEvent>,
    provider_rx: mpsc::Receiver<ProviderEvent>,
    timer_rx: mpsc::Receiver<TimerSignal>,
    outbound: broadcast::Sender<ServerMessage>,
}

impl<P> ConferenceRuntime<P>
where
    P: VoiceProvider + 'static,
{
    pub fn new(provider: P, settings: RunSettings) -> (Self, RunHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (provider_tx, provider_rx) = mpsc::channel(PROVIDER_BUFFER);
        let (timer_tx, timer_rx) = mpsc::channel(TIMER_BUFFER);
        let (outbound, _) = broadcast::channel(BROADCAST_BUFFER);

        let effects = Arc::new(EffectCollector::default());
        let mut machine = ConferenceStateMachine::new();
        machine.subscribe("effects", Arc::clone(&effects) as Arc<dyn PhaseObserver>);

        let mut timer = SessionTimer::new(timer_tx)
            .with_interval(settings.tick_interval)
            .with_warning_threshold(settings.time_warning_threshold);
        timer.subscribe(
            "client",
            Arc::new(TickBroadcaster {
                outbound: outbound.clone(),
            }),
        );

        let handle = RunHandle {
            commands: command_tx,
            outbound: outbound.clone(),
        };
        let runtime = Self {
            settings,
            machine,
            store: AgendaStore::new(),
            timer,
            tools: ToolRegistry::standard(),
            provider,
            effects,
            commands,
            provider_tx,
            provider_rx,
            timer_rx,
            outbound,
        };
        (runtime, handle)
    }

    pub async fn run(mut self) {
        tracing::info!(provider = self.provider.name(), "Starting conference run");

        if let Some(path) = self.settings.agenda_file.clone() {
            match self.store.load_from_file(&path) {
                Ok(agenda) => {
                    self.machine.load_agenda(Arc::clone(&agenda));
                    self.notify(ServerMessage::AgendaLoaded(AgendaSummary::of(&agenda)));
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Preloading agenda failed");
                    self.notify(ServerMessage::error(format!("Agenda load failed: {e}")));
                }
            }
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    let kind = command.kind();
                    if let Err(message) = self.handle_command(command).await {
                        tracing::warn!(command = kind, error = %message, "Command rejected");
                        self.notify(ServerMessage::error(message));
                    }
                }
                Some(event) = self.provider_rx.recv() => self.handle_provider_event(event).await,
                Some(signal) = self.timer_rx.recv() => self.handle_timer_signal(signal).await,
            }
        }

        self.timer.stop();
        self.provider.disconnect().await;
        tracing::info!(phase = %self.machine.phase(), "Conference run stopped");
    }

    fn notify(&self, message: ServerMessage) {
        let _ = self.outbound.send(message);
    }

    fn notify_state(&self) {
        self.notify(ServerMessage::StateUpdate(StateSnapshot::of(
            self.machine.phase(),
            self.machine.context(),
        )));
    }

    async fn handle_command(&mut self, command: ClientCommand) -> Result<(), String> {
        match command {
            ClientCommand::LoadAgenda(data) => {
                if self.machine.phase() != ConferencePhase::Idle {
                    return Err("Cannot load an agenda while the conference is running".into());
                }
                let agenda = self
                    .store
                    .load(data)
                    .map_err(|e| format!("Agenda load failed: {e}"))?;
                self.machine.load_agenda(Arc::clone(&agenda));
                self.notify(ServerMessage::AgendaLoaded(AgendaSummary::of(&agenda)));
            }
            ClientCommand::ConnectAi => self.connect_provider().await?,
            ClientCommand::StartConference => {
                if !self.machine.context().has_agenda() {
                    return Err("Load an agenda first".into());
                }
                if !self.provider.is_connected() {
                    return Err("Connect the AI first (CONNECT_AI)".into());
                }
                let result = self.machine.start();
                self.after_operation(result).await?;
            }
            ClientCommand::Pause => {
                self.machine.context_mut().is_paused = true;
                self.timer.pause();
                self.notify_state();
            }
            ClientCommand::Resume => {
                self.machine.context_mut().is_paused = false;
                self.timer.resume();
                self.notify_state();
            }
            ClientCommand::NextSession => {
                let result = self.machine.operator_next();
                self.after_operation(result).await?;
            }
            ClientCommand::ToggleInteract => {
                let result = self.machine.toggle_interact();
                self.after_operation(result).await?;
            }
            ClientCommand::SpeakerFinished => {
                let phase = self.machine.phase();
                if !phase.is_speaker_phase() {
                    return Err(format!("speaker_finished is not valid in phase {phase}"));
                }
                tracing::info!(phase = %phase, "Operator marked speaker finished");
                let result = self.machine.advance_session(AdvanceReason::SpeakerFinished);
                self.after_operation(result).await?;
            }
            ClientCommand::OverrideMessage { message } => {
                if message.trim().is_empty() {
                    return Ok(());
                }
                if !self.provider.is_connected() {
                    return Err("AI is not connected".into());
                }
                if let Err(e) = self.provider.cancel_response().await {
                    tracing::warn!(error = %e, "Cancelling current response failed");
                }
                self.provider
                    .trigger_speech(&message)
                    .await
                    .map_err(|e| format!("Override failed: {e}"))?;
            }
            ClientCommand::Audio(pcm) => {
                if self.provider.is_connected() {
                    if let Err(e) = self.provider.send_audio(&pcm).await {
                        tracing::debug!(error = %e, "Dropping microphone audio");
                    }
                }
            }
        }
        Ok(())
    }

    async fn connect_provider(&mut self) -> Result<(), String> {
        let Some(agenda) = self.machine.context().agenda.clone() else {
            return Err("Load an agenda first".into());
        };
        let setup = SessionSetup {
            instructions: build_instructions(self.machine.phase(), self.machine.context()),
            voice: agenda.moderator_voice.clone(),
            tools: self.tools.definitions(),
        };
        let info = self
            .provider
            .connect(setup, self.provider_tx.clone())
            .await
            .map_err(|e| {
                let retryable = e.kind.is_retryable();
                tracing::warn!(error = %e, kind = ?e.kind, retryable, "Voice provider connect failed");
                if retryable {
                    format!("AI connection failed: {e} (send CONNECT_AI to retry)")
                } else {
                    format!("AI connection failed: {e}")
                }
            })?;
        tracing::info!(provider = %info.provider, model = %info.model, "Voice provider connected");
        self.notify(ServerMessage::AiConnected {
            provider: info.provider,
            model: info.model,
            session_id: info.session_id,
            client_secret: info.client_secret,
        });
        Ok(())
    }

    /// Run the effects of an operation, then report its rejection, if any
    async fn after_operation<T>(
        &mut self,
        result: Result<T, TransitionError>,
    ) -> Result<(), String> {
        self.apply_effects().await;
        result.map(|_| ()).map_err(|e| e.to_string())
    }

    async fn handle_provider_event(&mut self, event: ProviderEvent) {
        tracing::debug!(event = event.kind(), "Provider event");
        match event {
            ProviderEvent::SetupComplete => {}
            ProviderEvent::Audio { data, mime_type } => {
                self.notify(ServerMessage::AudioData { data, mime_type });
            }
            ProviderEvent::InputTranscript { text } => {
                tracing::info!(text = %text, "Audience speech");
                self.notify(ServerMessage::Transcript {
                    text: format!("{HALL_PREFIX} {text}"),
                });
            }
            ProviderEvent::OutputTranscript { text } => {
                self.notify(ServerMessage::Transcript { text });
            }
            ProviderEvent::TurnComplete => {
                let phase = self.machine.phase();
                tracing::info!(phase = %phase, "Turn complete");
                self.notify(ServerMessage::ModeratorStatus {
                    status: ModeratorStatus::Idle,
                });
                // A reply in a silent phase does not mean the phase is over
                if phase.is_silent() {
                    return;
                }
                let result = self.machine.response_done();
                if let Err(e) = self.after_operation(result).await {
                    tracing::warn!(error = %e, "response_done failed");
                }
            }
            ProviderEvent::Interrupted => {
                self.notify(ServerMessage::ModeratorStatus {
                    status: ModeratorStatus::Listening,
                });
            }
            ProviderEvent::ToolCall {
                call_id,
                name,
                arguments,
            } => self.handle_tool_call(&call_id, &name, arguments).await,
            ProviderEvent::Disconnected { reason } => {
                self.notify(ServerMessage::error(format!("AI connection lost: {reason}")));
            }
            ProviderEvent::Error { message } => {
                tracing::error!(error = %message, "Voice provider error");
                self.notify(ServerMessage::error(format!("AI error: {message}")));
            }
        }
    }

    async fn handle_tool_call(&mut self, call_id: &str, name: &str, arguments: serde_json::Value) {
        let output = {
            let mut ctx = ToolContext::new(&mut self.machine);
            self.tools.call(name, arguments, &mut ctx)
        };
        tracing::info!(tool = %name, call_id = %call_id, success = output.success, "Tool finished");

        // The provider answers the tool result with a spoken turn of its own
        if let Err(e) = self
            .provider
            .send_tool_result(call_id, name, &output.result)
            .await
        {
            tracing::warn!(tool = %name, error = %e, "Sending tool result failed");
            self.notify(ServerMessage::error(format!("AI error: {e}")));
        }
        self.apply_effects_without_speech().await;
    }

    async fn handle_timer_signal(&mut self, signal: TimerSignal) {
        let current = self.machine.context().current_session_index;
        let session_index = match &signal {
            TimerSignal::Tick(tick) => tick.session_index,
            TimerSignal::Warning { session_index } | TimerSignal::Expired { session_index } => {
                *session_index
            }
        };
        // Signals from a loop that was already stopped or rebound
        if session_index != current || self.timer.active_session() != Some(session_index) {
            tracing::debug!(session_index, current, "Dropping stale timer signal");
            return;
        }

        let result = match signal {
            TimerSignal::Tick(tick) => {
                self.machine.context_mut().elapsed_seconds = tick.elapsed_seconds;
                if !self.break_ending_due(&tick) {
                    return;
                }
                tracing::info!(remaining = tick.remaining_seconds, "Break ending soon");
                self.machine.time_expired()
            }
            TimerSignal::Warning { .. } => self.machine.time_warning(),
            TimerSignal::Expired { .. } => self.machine.time_expired(),
        };
        if let Err(e) = self.after_operation(result).await {
            tracing::warn!(error = %e, "Timer signal rejected");
        }
    }

    /// Long breaks announce their end `break_ending_buffer_seconds` early
    fn break_ending_due(&self, tick: &TimerTick) -> bool {
        #[allow(clippy::cast_precision_loss)]
        let buffer = self.settings.break_ending_buffer_seconds as f64;
        self.machine.phase() == ConferencePhase::BreakActive
            && tick.total_seconds > buffer
            && tick.remaining_seconds <= buffer
    }

    async fn apply_effects_without_speech(&mut self) {
        for effect in self.effects.drain() {
            match effect {
                Effect::TriggerSpeech { .. } => {
                    tracing::debug!("Speech left to the tool result response");
                }
                effect => self.execute_effect(effect).await,
            }
        }
    }

    async fn apply_effects(&mut self) {
        let effects = self.effects.drain();
        // Only the last phase entered in one operation gets to speak
        let last_speech = effects
            .iter()
            .rposition(|e| matches!(e, Effect::TriggerSpeech { .. }));

        for (i, effect) in effects.into_iter().enumerate() {
            match effect {
                Effect::TriggerSpeech { .. } if Some(i) != last_speech => {}
                effect => self.execute_effect(effect).await,
            }
        }
    }

    async fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::UpdateInstructions { instructions } => {
                if self.provider.is_connected() {
                    if let Err(e) = self.provider.update_instructions(&instructions).await {
                        tracing::warn!(error = %e, "Updating instructions failed");
                        self.notify(ServerMessage::error(format!("AI error: {e}")));
                    }
                }
            }
            Effect::StartTimer { session_index } => {
                let ctx = self.machine.context();
                if session_index != ctx.current_session_index {
                    return;
                }
                if let Some(binding) = TimerBinding::for_current(ctx) {
                    let paused = ctx.is_paused;
                    if self.timer.ensure_running(binding) && paused {
                        self.timer.pause();
                    }
                }
            }
            Effect::StopTimer => self.timer.stop(),
            Effect::NotifyClient(message) => self.notify(message),
            Effect::TriggerSpeech { prompt } => {
                if self.provider.is_connected() {
                    if let Err(e) = self.provider.trigger_speech(&prompt).await {
                        tracing::warn!(error = %e, "Triggering speech failed");
                        self.notify(ServerMessage::error(format!("AI error: {e}")));
                    }
                }
            }
        }
    }
}
