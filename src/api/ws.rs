//! WebSocket bridge between the operator UI and one conference run

use super::AppState;
use crate::realtime::provider_from_config;
use crate::runtime::{
    ClientCommand, CommandError, ProductionRuntime, RunSettings, ServerMessage,
};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

/// Serve one browser connection until it closes
pub(super) async fn handle_socket(socket: WebSocket, state: AppState) {
    let run_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();

    let provider = match provider_from_config(&state.config) {
        Ok(provider) => provider,
        Err(e) => {
            tracing::error!(%run_id, error = %e, "Voice provider unavailable");
            if let Ok(text) = serde_json::to_string(&ServerMessage::error(e.to_string())) {
                let _ = sink.send(Message::Text(text)).await;
            }
            return;
        }
    };

    let (runtime, handle) =
        ProductionRuntime::new(provider, RunSettings::from_config(&state.config));
    let mut outbound = handle.subscribe();
    let run = tokio::spawn(runtime.run());
    tracing::info!(%run_id, "Operator connected");

    let forward = tokio::spawn(async move {
        loop {
            match outbound.recv().await {
                Ok(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(%run_id, error = %e, "Failed to encode message");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%run_id, skipped, "Operator socket lagging, messages dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%run_id, error = %e, "Operator socket error");
                break;
            }
        };
        let command = match frame {
            Message::Text(text) => match ClientCommand::parse(&text) {
                Ok(command) => command,
                Err(CommandError::InvalidJson) => {
                    handle.notify(ServerMessage::error(CommandError::InvalidJson.to_string()));
                    continue;
                }
                Err(e @ CommandError::UnknownType(_)) => {
                    tracing::warn!(%run_id, error = %e, "Ignoring client message");
                    continue;
                }
            },
            Message::Binary(pcm) => ClientCommand::Audio(pcm),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        if handle.commands.send(command).await.is_err() {
            break;
        }
    }

    // Closing the command queue ends the run
    drop(handle);
    if let Err(e) = run.await {
        tracing::error!(%run_id, error = %e, "Conference run panicked");
    }
    forward.abort();
    tracing::info!(%run_id, "Operator disconnected");
}
