//! Provider WebSocket plumbing shared by the adapters
//!
//! One writer task drains an outbound queue into the sink; one reader task
//! decodes JSON frames into `ProviderEvent`s and pushes them to the run.

use super::{ProviderError, ProviderEvent};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// Turns one provider frame into zero or more events
pub(crate) type Decoder = fn(&Value) -> Vec<ProviderEvent>;

const OUTBOUND_BUFFER: usize = 256;

type Source = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

pub(crate) struct Socket {
    outbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

impl Socket {
    /// Connect and spawn the reader and writer tasks.
    ///
    /// The returned receiver fires on the first `SetupComplete` the decoder
    /// produces.
    pub async fn open<R>(
        request: R,
        provider: &'static str,
        decode: Decoder,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<(Self, oneshot::Receiver<()>), ProviderError>
    where
        R: IntoClientRequest + Unpin,
    {
        let (stream, _response) = connect_async(request).await?;
        let (mut sink, source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
        let cancel = CancellationToken::new();

        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = writer_cancel.cancelled() => break,
                    msg = outbound_rx.recv() => {
                        let Some(msg) = msg else { break };
                        if let Err(e) = sink.send(msg).await {
                            tracing::warn!(provider, error = %e, "Provider socket write failed");
                            break;
                        }
                    }
                }
            }
            let _ = sink.close().await;
        });

        let (ready_tx, ready_rx) = oneshot::channel();
        let reader = tokio::spawn(read_loop(
            source,
            provider,
            decode,
            events,
            ready_tx,
            cancel.clone(),
        ));

        Ok((
            Self {
                outbound,
                cancel,
                reader,
            },
            ready_rx,
        ))
    }

    pub async fn send_json(&self, value: &Value) -> Result<(), ProviderError> {
        if !self.is_open() {
            return Err(ProviderError::not_connected());
        }
        self.outbound
            .send(Message::Text(value.to_string()))
            .await
            .map_err(|_| ProviderError::not_connected())
    }

    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.reader.is_finished()
    }

    /// Stop both tasks; the writer sends a close frame on its way out
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Wait for the provider's setup acknowledgement
pub(crate) async fn await_ready(
    ready: oneshot::Receiver<()>,
    timeout: Duration,
) -> Result<(), ProviderError> {
    match tokio::time::timeout(timeout, ready).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(ProviderError::connection(
            "socket closed before setup completed",
        )),
        Err(_) => Err(ProviderError::timeout(format!(
            "no setup acknowledgement within {}s",
            timeout.as_secs()
        ))),
    }
}

async fn read_loop(
    mut source: Source,
    provider: &'static str,
    decode: Decoder,
    events: mpsc::Sender<ProviderEvent>,
    ready: oneshot::Sender<()>,
    cancel: CancellationToken,
) {
    let mut ready = Some(ready);

    let reason = loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            frame = source.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            // Gemini delivers its JSON in binary frames
            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Message::Close(frame))) => {
                break frame.map_or_else(|| "closed".to_string(), |f| f.reason.to_string());
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break e.to_string(),
            None => break "stream ended".to_string(),
        };

        let value: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(provider, error = %e, "Non-JSON frame from provider");
                continue;
            }
        };

        for event in decode(&value) {
            if event == ProviderEvent::SetupComplete {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(());
                }
            }
            if events.send(event).await.is_err() {
                tracing::debug!(provider, "Run queue closed, stopping provider reader");
                return;
            }
        }
    };

    cancel.cancel();
    tracing::warn!(provider, reason = %reason, "Provider socket closed");
    let _ = events.send(ProviderEvent::Disconnected { reason }).await;
}
