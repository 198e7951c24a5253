//! Realtime voice provider abstraction
//!
//! The conference run talks to the voice agent only through `VoiceProvider`.
//! Adapters own their sockets and push typed `ProviderEvent`s into the run
//! queue handed to `connect`.

pub mod azure;
mod error;
pub mod gemini;
mod socket;
mod types;

pub use azure::{AzureConfig, AzureRealtimeProvider};
pub use error::ProviderError;
#[cfg(test)]
pub use error::ProviderErrorKind;
pub use gemini::{GeminiConfig, GeminiLiveProvider};
pub use types::*;

use crate::config::{Config, ProviderKind};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Common interface for realtime voice agents
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// Provider name as reported to clients
    fn name(&self) -> &'static str;

    fn model(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Open a session; events flow into `events` until disconnect
    async fn connect(
        &self,
        setup: SessionSetup,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<ConnectInfo, ProviderError>;

    /// Close the session. Safe to call when not connected.
    async fn disconnect(&self);

    /// Replace the agent's instructions for the current phase
    async fn update_instructions(&self, instructions: &str) -> Result<(), ProviderError>;

    /// Ask the agent to speak now
    async fn trigger_speech(&self, prompt: &str) -> Result<(), ProviderError>;

    async fn send_tool_result(
        &self,
        call_id: &str,
        name: &str,
        result: &Value,
    ) -> Result<(), ProviderError>;

    /// Abort the response in progress
    async fn cancel_response(&self) -> Result<(), ProviderError>;

    /// Forward microphone PCM (16-bit mono)
    async fn send_audio(&self, pcm: &[u8]) -> Result<(), ProviderError>;
}

#[async_trait]
impl<T: VoiceProvider + ?Sized> VoiceProvider for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn connect(
        &self,
        setup: SessionSetup,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<ConnectInfo, ProviderError> {
        (**self).connect(setup, events).await
    }

    async fn disconnect(&self) {
        (**self).disconnect().await;
    }

    async fn update_instructions(&self, instructions: &str) -> Result<(), ProviderError> {
        (**self).update_instructions(instructions).await
    }

    async fn trigger_speech(&self, prompt: &str) -> Result<(), ProviderError> {
        (**self).trigger_speech(prompt).await
    }

    async fn send_tool_result(
        &self,
        call_id: &str,
        name: &str,
        result: &Value,
    ) -> Result<(), ProviderError> {
        (**self).send_tool_result(call_id, name, result).await
    }

    async fn cancel_response(&self) -> Result<(), ProviderError> {
        (**self).cancel_response().await
    }

    async fn send_audio(&self, pcm: &[u8]) -> Result<(), ProviderError> {
        (**self).send_audio(pcm).await
    }
}

/// Build the configured provider for one conference run
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn VoiceProvider>, ProviderError> {
    let provider: Arc<dyn VoiceProvider> = match config.provider {
        ProviderKind::Gemini => Arc::new(GeminiLiveProvider::new(config.gemini.clone())),
        ProviderKind::Azure => Arc::new(AzureRealtimeProvider::new(config.azure.clone())?),
    };
    Ok(provider)
}
