//! mAistro - AI conference moderator
//!
//! A Rust backend that drives a live conference through its agenda with a
//! state machine, while a realtime voice agent speaks for the moderator.

mod agenda;
mod api;
mod config;
mod realtime;
mod runtime;
mod state_machine;
mod system_prompt;
mod timer;
mod tools;

use api::{create_router, AppState};
use axum::http::HeaderValue;
use config::Config;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maistro=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // TLS for the provider sockets
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let config = Config::from_env();
    match config.provider {
        config::ProviderKind::Gemini if config.gemini.api_key.is_empty() => {
            tracing::warn!("GEMINI_API_KEY is not set; CONNECT_AI will fail");
        }
        config::ProviderKind::Azure if config.azure.api_key.is_empty() => {
            tracing::warn!("AZURE_OPENAI_API_KEY is not set; CONNECT_AI will fail");
        }
        provider => {
            tracing::info!(%provider, model = %config.provider_model(), "Voice provider configured");
        }
    }
    if let Some(path) = &config.agenda_file {
        tracing::info!(path = %path.display(), "Agenda preloaded into every run");
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    let addr = config.bind_addr();
    let state = AppState::new(config);
    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("mAistro server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
