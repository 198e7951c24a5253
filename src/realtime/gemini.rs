//! Gemini Live adapter
//!
//! A single bidirectional WebSocket (`BidiGenerateContent`) carries audio,
//! instructions and function calls. The first frame must be the setup
//! message; the session is usable once `setupComplete` arrives.

use super::socket::{await_ready, Socket};
use super::{
    ConnectInfo, ProviderError, ProviderEvent, SessionSetup, ToolDefinition, VoiceProvider,
};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_WS_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";
pub const DEFAULT_VOICE: &str = "Orus";

/// Prebuilt voices the native-audio models accept
pub const VOICES: [&str; 8] = [
    "Orus", "Puck", "Charon", "Kore", "Fenrir", "Aoede", "Leda", "Zephyr",
];

const SETUP_TIMEOUT: Duration = Duration::from_secs(15);
const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";
const OUTPUT_MIME_TYPE: &str = "audio/pcm;rate=24000";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    /// Fallback when the agenda asks for a voice Gemini does not have
    pub voice: String,
    pub ws_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
        }
    }

    /// Endpoint with the API key as an encoded `key` query parameter
    fn url(&self) -> Result<String, ProviderError> {
        let mut url = reqwest::Url::parse(&self.ws_url)
            .map_err(|e| ProviderError::protocol(format!("invalid Gemini URL: {e}")))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url.into())
    }
}

pub struct GeminiLiveProvider {
    config: GeminiConfig,
    socket: Mutex<Option<Arc<Socket>>>,
}

impl GeminiLiveProvider {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            socket: Mutex::new(None),
        }
    }

    fn current(&self) -> Result<Arc<Socket>, ProviderError> {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|s| s.is_open())
            .cloned()
            .ok_or_else(ProviderError::not_connected)
    }

    async fn send(&self, message: &Value) -> Result<(), ProviderError> {
        self.current()?.send_json(message).await
    }

    fn resolve_voice(&self, requested: &str) -> String {
        if VOICES.contains(&requested) {
            return requested.to_string();
        }
        let fallback = if VOICES.contains(&self.config.voice.as_str()) {
            self.config.voice.as_str()
        } else {
            DEFAULT_VOICE
        };
        tracing::warn!(voice = %requested, fallback, "Voice not supported by Gemini, falling back");
        fallback.to_string()
    }
}

#[async_trait]
impl VoiceProvider for GeminiLiveProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_connected(&self) -> bool {
        self.current().is_ok()
    }

    async fn connect(
        &self,
        setup: SessionSetup,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<ConnectInfo, ProviderError> {
        self.disconnect().await;

        if self.config.api_key.is_empty() {
            return Err(ProviderError::auth("GEMINI_API_KEY is not set"));
        }

        let voice = self.resolve_voice(&setup.voice);
        tracing::info!(model = %self.config.model, voice = %voice, "Connecting to Gemini Live");

        let (socket, ready) = Socket::open(self.config.url()?, "gemini", decode, events).await?;
        let socket = Arc::new(socket);
        socket
            .send_json(&setup_message(&self.config.model, &voice, &setup))
            .await?;

        if let Err(e) = await_ready(ready, SETUP_TIMEOUT).await {
            tracing::error!(error = %e, "Gemini setup failed");
            socket.close();
            return Err(e);
        }

        *self.socket.lock().unwrap_or_else(PoisonError::into_inner) = Some(socket);
        tracing::info!("Gemini Live session established");

        Ok(ConnectInfo {
            provider: self.name().to_string(),
            model: self.config.model.clone(),
            session_id: None,
            client_secret: None,
        })
    }

    async fn disconnect(&self) {
        let socket = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(socket) = socket {
            socket.close();
            tracing::info!("Gemini Live session closed");
        }
    }

    async fn update_instructions(&self, instructions: &str) -> Result<(), ProviderError> {
        // No session.update in the Live API: instructions ride along as context
        self.send(&client_text(&format!("[SYSTEM UPDATE] {instructions}"), false))
            .await
    }

    async fn trigger_speech(&self, prompt: &str) -> Result<(), ProviderError> {
        self.send(&client_text(prompt, true)).await
    }

    async fn send_tool_result(
        &self,
        call_id: &str,
        name: &str,
        result: &Value,
    ) -> Result<(), ProviderError> {
        self.send(&json!({
            "toolResponse": {
                "functionResponses": [{
                    "id": call_id,
                    "name": name,
                    "response": result,
                }]
            }
        }))
        .await
    }

    async fn cancel_response(&self) -> Result<(), ProviderError> {
        // A new client turn interrupts the current one
        tracing::debug!("Gemini has no explicit cancel; next turn interrupts");
        self.current().map(|_| ())
    }

    async fn send_audio(&self, pcm: &[u8]) -> Result<(), ProviderError> {
        let data = base64::engine::general_purpose::STANDARD.encode(pcm);
        self.send(&json!({
            "realtimeInput": {
                "audio": { "data": data, "mimeType": INPUT_MIME_TYPE }
            }
        }))
        .await
    }
}

fn client_text(text: &str, turn_complete: bool) -> Value {
    json!({
        "clientContent": {
            "turns": [{ "role": "user", "parts": [{ "text": text }] }],
            "turnComplete": turn_complete,
        }
    })
}

fn setup_message(model: &str, voice: &str, setup: &SessionSetup) -> Value {
    let mut body = json!({
        "model": format!("models/{model}"),
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
            }
        },
        "systemInstruction": { "parts": [{ "text": setup.instructions }] },
        "realtimeInputConfig": {
            "automaticActivityDetection": {
                "disabled": false,
                "startOfSpeechSensitivity": "START_SENSITIVITY_HIGH",
                "endOfSpeechSensitivity": "END_SENSITIVITY_HIGH",
                "silenceDurationMs": 800
            },
            "activityHandling": "START_OF_ACTIVITY_INTERRUPTS"
        },
        "inputAudioTranscription": {},
        "outputAudioTranscription": {}
    });
    if !setup.tools.is_empty() {
        body["tools"] = json!([{ "functionDeclarations": function_declarations(&setup.tools) }]);
    }
    json!({ "setup": body })
}

fn function_declarations(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": upper_types(&t.input_schema),
            })
        })
        .collect()
}

/// Gemini's schema dialect spells types in upper case (`OBJECT`, `STRING`)
fn upper_types(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let out: Map<String, Value> = map
                .iter()
                .map(|(k, v)| {
                    let v = match (k.as_str(), v) {
                        ("type", Value::String(t)) => Value::String(t.to_uppercase()),
                        // Property names are user keys, not schema keywords
                        ("properties", Value::Object(props)) => Value::Object(
                            props
                                .iter()
                                .map(|(name, s)| (name.clone(), upper_types(s)))
                                .collect(),
                        ),
                        ("enum" | "required", _) => v.clone(),
                        _ => upper_types(v),
                    };
                    (k.clone(), v)
                })
                .collect();
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(upper_types).collect()),
        other => other.clone(),
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn decode(frame: &Value) -> Vec<ProviderEvent> {
    let mut events = Vec::new();

    if frame.get("setupComplete").is_some() {
        events.push(ProviderEvent::SetupComplete);
    }

    if let Some(content) = frame.get("serverContent") {
        let parts = content
            .pointer("/modelTurn/parts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            let Some(inline) = part.get("inlineData") else {
                continue;
            };
            let mime_type = inline
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or(OUTPUT_MIME_TYPE);
            if mime_type.contains("audio") {
                events.push(ProviderEvent::Audio {
                    data: str_field(inline, "data"),
                    mime_type: mime_type.to_string(),
                });
            }
        }

        if let Some(text) = content
            .pointer("/inputTranscription/text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            events.push(ProviderEvent::InputTranscript {
                text: text.to_string(),
            });
        }
        if let Some(text) = content
            .pointer("/outputTranscription/text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            events.push(ProviderEvent::OutputTranscript {
                text: text.to_string(),
            });
        }
        if content.get("turnComplete").and_then(Value::as_bool) == Some(true) {
            events.push(ProviderEvent::TurnComplete);
        }
        if content.get("interrupted").and_then(Value::as_bool) == Some(true) {
            events.push(ProviderEvent::Interrupted);
        }
    }

    if let Some(calls) = frame
        .pointer("/toolCall/functionCalls")
        .and_then(Value::as_array)
    {
        for call in calls {
            events.push(ProviderEvent::ToolCall {
                call_id: str_field(call, "id"),
                name: str_field(call, "name"),
                arguments: call.get("args").cloned().unwrap_or_else(|| json!({})),
            });
        }
    }

    if frame.get("toolCallCancellation").is_some() {
        tracing::debug!(frame = %frame, "Gemini cancelled a tool call");
    }
    if let Some(go_away) = frame.get("goAway") {
        tracing::warn!(go_away = %go_away, "Gemini is about to close the session");
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    fn setup() -> SessionSetup {
        SessionSetup {
            instructions: "Be a moderator.".to_string(),
            voice: "Kore".to_string(),
            tools: ToolRegistry::standard().definitions(),
        }
    }

    #[test]
    fn test_setup_message_shape() {
        let msg = setup_message("gemini-test", "Kore", &setup());
        assert_eq!(msg["setup"]["model"], "models/gemini-test");
        assert_eq!(
            msg["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Kore"
        );
        assert_eq!(msg["setup"]["systemInstruction"]["parts"][0]["text"], "Be a moderator.");
        let decls = msg["setup"]["tools"][0]["functionDeclarations"]
            .as_array()
            .unwrap();
        assert_eq!(decls.len(), 4);
        assert_eq!(decls[0]["parameters"]["type"], "OBJECT");
        assert_eq!(decls[0]["parameters"]["properties"]["reason"]["type"], "STRING");
        // Enum values stay as written
        assert_eq!(
            decls[0]["parameters"]["properties"]["reason"]["enum"][0],
            "speaker_finished"
        );
    }

    #[test]
    fn test_upper_types_keeps_property_named_type() {
        let schema = json!({
            "type": "object",
            "properties": { "type": { "type": "string" } }
        });
        let out = upper_types(&schema);
        assert_eq!(out["properties"]["type"]["type"], "STRING");
        assert!(out["properties"].get("TYPE").is_none());
    }

    #[test]
    fn test_no_tools_omits_tools_key() {
        let mut s = setup();
        s.tools.clear();
        assert!(setup_message("m", "Orus", &s)["setup"].get("tools").is_none());
    }

    #[test]
    fn test_voice_resolution() {
        let provider = GeminiLiveProvider::new(GeminiConfig::new("k"));
        assert_eq!(provider.resolve_voice("Puck"), "Puck");
        assert_eq!(provider.resolve_voice("coral"), "Orus");

        let mut config = GeminiConfig::new("k");
        config.voice = "Leda".to_string();
        assert_eq!(GeminiLiveProvider::new(config).resolve_voice("coral"), "Leda");
    }

    #[test]
    fn test_decode_server_content() {
        let events = decode(&json!({
            "serverContent": {
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } },
                    { "text": "thinking" }
                ]},
                "inputTranscription": { "text": "hello" },
                "outputTranscription": { "text": "" },
                "turnComplete": true
            }
        }));
        assert_eq!(
            events,
            vec![
                ProviderEvent::Audio {
                    data: "AAAA".to_string(),
                    mime_type: "audio/pcm;rate=24000".to_string()
                },
                ProviderEvent::InputTranscript {
                    text: "hello".to_string()
                },
                ProviderEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_decode_tool_calls_and_setup() {
        assert_eq!(decode(&json!({"setupComplete": {}})), vec![ProviderEvent::SetupComplete]);

        let events = decode(&json!({
            "toolCall": { "functionCalls": [
                { "id": "c1", "name": "check_time_remaining" },
                { "id": "c2", "name": "get_session_info", "args": { "which": "next" } }
            ]}
        }));
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            ProviderEvent::ToolCall {
                call_id: "c2".to_string(),
                name: "get_session_info".to_string(),
                arguments: json!({"which": "next"}),
            }
        );
        assert!(matches!(&events[0], ProviderEvent::ToolCall { arguments, .. } if *arguments == json!({})));
    }

    #[test]
    fn test_decode_interrupted_and_unknown() {
        assert_eq!(
            decode(&json!({"serverContent": {"interrupted": true}})),
            vec![ProviderEvent::Interrupted]
        );
        assert!(decode(&json!({"usageMetadata": {}})).is_empty());
    }

    #[tokio::test]
    async fn test_operations_fail_when_not_connected() {
        let provider = GeminiLiveProvider::new(GeminiConfig::new("k"));
        assert!(!provider.is_connected());
        let err = provider.trigger_speech("hi").await.unwrap_err();
        assert_eq!(err.kind, crate::realtime::ProviderErrorKind::NotConnected);
    }

    #[test]
    fn test_url_encodes_key() {
        let mut config = GeminiConfig::new("a+b/c d");
        config.ws_url = "ws://127.0.0.1:9000".to_string();
        assert_eq!(config.url().unwrap(), "ws://127.0.0.1:9000/?key=a%2Bb%2Fc+d");

        let url = GeminiConfig::new("k").url().unwrap();
        assert!(url.starts_with(DEFAULT_WS_URL), "{url}");
        assert!(url.ends_with("?key=k"), "{url}");

        config.ws_url = "not a url".to_string();
        assert_eq!(
            config.url().unwrap_err().kind,
            crate::realtime::ProviderErrorKind::Protocol
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_auth_error() {
        let provider = GeminiLiveProvider::new(GeminiConfig::new(""));
        let (tx, _rx) = mpsc::channel(8);
        let err = provider.connect(setup(), tx).await.unwrap_err();
        assert_eq!(err.kind, crate::realtime::ProviderErrorKind::Auth);
    }

    /// Fake Live endpoint: acknowledges setup, then reports one finished turn
    async fn fake_server() -> (String, tokio::task::JoinHandle<Vec<Value>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut received = Vec::new();

            let Some(Ok(Message::Text(first))) = ws.next().await else {
                return received;
            };
            received.push(serde_json::from_str(&first).unwrap());
            ws.send(Message::Binary(br#"{"setupComplete":{}}"#.to_vec()))
                .await
                .unwrap();

            let Some(Ok(Message::Text(second))) = ws.next().await else {
                return received;
            };
            received.push(serde_json::from_str(&second).unwrap());
            ws.send(Message::Text(
                r#"{"serverContent":{"turnComplete":true}}"#.to_string(),
            ))
            .await
            .unwrap();

            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
            received
        });
        (format!("ws://{addr}/"), handle)
    }

    #[tokio::test]
    async fn test_session_against_fake_endpoint() {
        let (url, server) = fake_server().await;
        let mut config = GeminiConfig::new("test-key");
        config.ws_url = url;
        let provider = GeminiLiveProvider::new(config);
        let (tx, mut rx) = mpsc::channel(16);

        let info = provider.connect(setup(), tx).await.unwrap();
        assert_eq!(info.provider, "gemini");
        assert!(provider.is_connected());
        assert_eq!(rx.recv().await, Some(ProviderEvent::SetupComplete));

        provider.trigger_speech("Open the conference").await.unwrap();
        assert_eq!(rx.recv().await, Some(ProviderEvent::TurnComplete));

        provider.disconnect().await;
        assert!(!provider.is_connected());

        let received = server.await.unwrap();
        assert!(received[0].get("setup").is_some());
        assert_eq!(
            received[1]["clientContent"]["turns"][0]["parts"][0]["text"],
            "Open the conference"
        );
        assert_eq!(received[1]["clientContent"]["turnComplete"], true);
    }
}
