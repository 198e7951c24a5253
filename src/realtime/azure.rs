//! Azure OpenAI Realtime adapter
//!
//! Creates an ephemeral session over REST (the browser gets its client
//! secret), then drives the conversation over a server-side WebSocket
//! sideband. Sessions expire after 60 minutes, so a renewal task recreates
//! the session and swaps the sideband before that.

use super::socket::{await_ready, Socket};
use super::{
    ConnectInfo, ProviderError, ProviderEvent, SessionSetup, ToolDefinition, VoiceProvider,
};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_API_VERSION: &str = "2025-04-01-preview";
pub const DEFAULT_VOICE: &str = "coral";
pub const DEFAULT_RENEWAL_SECONDS: u64 = 55 * 60;

pub const VOICES: [&str; 8] = [
    "alloy", "ash", "ballad", "coral", "echo", "sage", "shimmer", "verse",
];

const SETUP_TIMEOUT: Duration = Duration::from_secs(15);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const OUTPUT_MIME_TYPE: &str = "audio/pcm;rate=24000";

#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub api_key: String,
    /// e.g. `https://myresource.openai.azure.com`
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub session_renewal_seconds: u64,
}

impl AzureConfig {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            deployment: deployment.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            session_renewal_seconds: DEFAULT_RENEWAL_SECONDS,
        }
    }

    fn base(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    /// REST endpoint for ephemeral sessions
    pub fn session_url(&self) -> String {
        format!(
            "{}/openai/realtime/sessions?api-version={}",
            self.base(),
            self.api_version
        )
    }

    /// WebSocket sideband endpoint
    pub fn ws_url(&self) -> String {
        let base = self.base();
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!(
            "{base}/openai/realtime?api-version={}&deployment={}",
            self.api_version, self.deployment
        )
    }

    fn validate(&self) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::auth("AZURE_OPENAI_API_KEY is not set"));
        }
        if self.endpoint.is_empty() || self.deployment.is_empty() {
            return Err(ProviderError::protocol(
                "AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_DEPLOYMENT must be set",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    client_secret: Option<ClientSecret>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

/// Outcome of one REST session creation
#[derive(Debug, Clone, PartialEq, Eq)]
struct EphemeralSession {
    id: Option<String>,
    client_secret: Option<String>,
}

struct Live {
    socket: Arc<Socket>,
    renewal: CancellationToken,
    setup: SessionSetup,
    events: mpsc::Sender<ProviderEvent>,
}

struct Inner {
    config: AzureConfig,
    http: reqwest::Client,
    live: Mutex<Option<Live>>,
}

pub struct AzureRealtimeProvider {
    inner: Arc<Inner>,
}

impl AzureRealtimeProvider {
    pub fn new(config: AzureConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                http,
                live: Mutex::new(None),
            }),
        })
    }

    fn current(&self) -> Result<Arc<Socket>, ProviderError> {
        self.inner.socket()
    }

    async fn send(&self, message: &Value) -> Result<(), ProviderError> {
        self.current()?.send_json(message).await
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Live>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn socket(&self) -> Result<Arc<Socket>, ProviderError> {
        self.lock()
            .as_ref()
            .map(|live| Arc::clone(&live.socket))
            .filter(|s| s.is_open())
            .ok_or_else(ProviderError::not_connected)
    }

    async fn create_session(&self, setup: &SessionSetup) -> Result<EphemeralSession, ProviderError> {
        tracing::info!(
            deployment = %self.config.deployment,
            voice = %setup.voice,
            "Creating Azure Realtime session"
        );
        let response = self
            .http
            .post(self.config.session_url())
            .header("api-key", &self.config.api_key)
            .json(&session_config(&self.config.deployment, setup))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Session creation failed");
            return Err(ProviderError::from_status(status, &body));
        }

        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::protocol(format!("bad session response: {e}")))?;
        tracing::info!(session_id = ?body.id, "Azure Realtime session created");
        Ok(EphemeralSession {
            id: body.id,
            client_secret: body.client_secret.map(|s| s.value),
        })
    }

    async fn open_sideband(
        &self,
        setup: &SessionSetup,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<Arc<Socket>, ProviderError> {
        let mut request = self.config.ws_url().into_client_request()?;
        let key = HeaderValue::from_str(&self.config.api_key)
            .map_err(|_| ProviderError::auth("API key is not a valid header value"))?;
        request.headers_mut().insert("api-key", key);

        let (socket, ready) = Socket::open(request, "azure", decode, events).await?;
        let socket = Arc::new(socket);
        if let Err(e) = await_ready(ready, SETUP_TIMEOUT).await {
            socket.close();
            return Err(e);
        }
        socket
            .send_json(&json!({
                "type": "session.update",
                "session": session_config(&self.config.deployment, setup),
            }))
            .await?;
        Ok(socket)
    }

    async fn open(
        &self,
        setup: &SessionSetup,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<(Arc<Socket>, EphemeralSession), ProviderError> {
        let session = self.create_session(setup).await?;
        let socket = self.open_sideband(setup, events).await?;
        Ok((socket, session))
    }

    /// Current setup and event sink, if a session is live
    fn snapshot(&self) -> Option<(SessionSetup, mpsc::Sender<ProviderEvent>)> {
        self.lock()
            .as_ref()
            .map(|live| (live.setup.clone(), live.events.clone()))
    }

    fn swap_socket(&self, socket: Arc<Socket>) {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(live) => {
                live.socket.close();
                live.socket = socket;
            }
            None => socket.close(),
        }
    }
}

async fn renewal_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    let period = Duration::from_secs(inner.config.session_renewal_seconds.max(1));
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(period) => {}
        }
        let Some((setup, events)) = inner.snapshot() else {
            return;
        };
        tracing::info!("Azure session nearing its time limit, renewing");
        match inner.open(&setup, events).await {
            Ok((socket, session)) => {
                if cancel.is_cancelled() {
                    socket.close();
                    return;
                }
                inner.swap_socket(socket);
                tracing::info!(session_id = ?session.id, "Azure session renewed");
            }
            Err(e) => tracing::error!(error = %e, "Azure session renewal failed"),
        }
    }
}

#[async_trait]
impl VoiceProvider for AzureRealtimeProvider {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn model(&self) -> &str {
        &self.inner.config.deployment
    }

    fn is_connected(&self) -> bool {
        self.current().is_ok()
    }

    async fn connect(
        &self,
        mut setup: SessionSetup,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<ConnectInfo, ProviderError> {
        self.disconnect().await;
        self.inner.config.validate()?;

        if !VOICES.contains(&setup.voice.as_str()) {
            tracing::warn!(voice = %setup.voice, fallback = DEFAULT_VOICE, "Voice not supported by Azure, falling back");
            setup.voice = DEFAULT_VOICE.to_string();
        }

        let (socket, session) = self.inner.open(&setup, events.clone()).await?;

        let renewal = CancellationToken::new();
        tokio::spawn(renewal_loop(Arc::clone(&self.inner), renewal.clone()));
        *self.inner.lock() = Some(Live {
            socket,
            renewal,
            setup,
            events,
        });

        Ok(ConnectInfo {
            provider: self.name().to_string(),
            model: self.inner.config.deployment.clone(),
            session_id: session.id,
            client_secret: session.client_secret,
        })
    }

    async fn disconnect(&self) {
        let live = self.inner.lock().take();
        if let Some(live) = live {
            live.renewal.cancel();
            live.socket.close();
            tracing::info!("Azure Realtime session closed");
        }
    }

    async fn update_instructions(&self, instructions: &str) -> Result<(), ProviderError> {
        if let Some(live) = self.inner.lock().as_mut() {
            live.setup.instructions = instructions.to_string();
        }
        self.send(&json!({
            "type": "session.update",
            "session": { "instructions": instructions },
        }))
        .await
    }

    async fn trigger_speech(&self, prompt: &str) -> Result<(), ProviderError> {
        self.send(&json!({
            "type": "conversation.item.create",
            "item": {
                "type": "message",
                "role": "user",
                "content": [{ "type": "input_text", "text": prompt }],
            },
        }))
        .await?;
        self.send(&json!({ "type": "response.create" })).await
    }

    async fn send_tool_result(
        &self,
        call_id: &str,
        _name: &str,
        result: &Value,
    ) -> Result<(), ProviderError> {
        self.send(&json!({
            "type": "conversation.item.create",
            "item": {
                "type": "function_call_output",
                "call_id": call_id,
                "output": result.to_string(),
            },
        }))
        .await?;
        self.send(&json!({ "type": "response.create" })).await
    }

    async fn cancel_response(&self) -> Result<(), ProviderError> {
        self.send(&json!({ "type": "response.cancel" })).await
    }

    async fn send_audio(&self, pcm: &[u8]) -> Result<(), ProviderError> {
        let audio = base64::engine::general_purpose::STANDARD.encode(pcm);
        self.send(&json!({ "type": "input_audio_buffer.append", "audio": audio }))
            .await
    }
}

fn session_config(deployment: &str, setup: &SessionSetup) -> Value {
    let mut config = json!({
        "model": deployment,
        "modalities": ["audio", "text"],
        "voice": setup.voice,
        "instructions": setup.instructions,
        "input_audio_noise_reduction": { "type": "far_field" },
        "input_audio_transcription": { "model": "whisper-1" },
        "turn_detection": {
            "type": "semantic_vad",
            "eagerness": "low",
            "create_response": true,
            "interrupt_response": true,
        },
    });
    if !setup.tools.is_empty() {
        config["tools"] = Value::Array(setup.tools.iter().map(function_tool).collect());
        config["tool_choice"] = json!("auto");
    }
    config
}

fn function_tool(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.input_schema,
    })
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// A response that only asked for function calls is not a finished turn
fn is_spoken_turn(response: &Value) -> bool {
    if response.get("status").and_then(Value::as_str) == Some("cancelled") {
        return false;
    }
    let outputs = response
        .get("output")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    outputs.is_empty()
        || outputs
            .iter()
            .any(|item| item.get("type").and_then(Value::as_str) != Some("function_call"))
}

fn decode(frame: &Value) -> Vec<ProviderEvent> {
    let kind = frame.get("type").and_then(Value::as_str).unwrap_or_default();
    let event = match kind {
        "session.created" => ProviderEvent::SetupComplete,
        "response.audio.delta" => ProviderEvent::Audio {
            data: str_field(frame, "delta"),
            mime_type: OUTPUT_MIME_TYPE.to_string(),
        },
        "response.audio_transcript.done" => ProviderEvent::OutputTranscript {
            text: str_field(frame, "transcript"),
        },
        "conversation.item.input_audio_transcription.completed" => {
            ProviderEvent::InputTranscript {
                text: str_field(frame, "transcript"),
            }
        }
        "response.done" => {
            let response = frame.get("response").cloned().unwrap_or(Value::Null);
            if !is_spoken_turn(&response) {
                return Vec::new();
            }
            ProviderEvent::TurnComplete
        }
        "response.function_call_arguments.done" => {
            let raw = frame.get("arguments").and_then(Value::as_str).unwrap_or("{}");
            let arguments = serde_json::from_str(raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, arguments = %raw, "Unparseable function arguments");
                json!({})
            });
            ProviderEvent::ToolCall {
                call_id: str_field(frame, "call_id"),
                name: str_field(frame, "name"),
                arguments,
            }
        }
        "input_audio_buffer.speech_started" => ProviderEvent::Interrupted,
        "error" => ProviderEvent::Error {
            message: frame
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error")
                .to_string(),
        },
        _ => return Vec::new(),
    };
    vec![event]
}
