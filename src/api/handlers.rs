//! HTTP request handlers

use super::types::{ErrorResponse, HealthResponse, ServiceInfo};
use super::ws::handle_socket;
use super::AppState;
use crate::agenda::{Agenda, AgendaSummary};
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/api/health", get(health))
        // One conference run per socket
        .route("/ws", get(ws_upgrade))
        .route("/api/agenda/validate", post(validate_agenda))
        .with_state(state)
}

async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "mAistro Moderator Agent",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        provider: state.config.provider.to_string(),
        model: state.config.provider_model().to_string(),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Check an agenda document without starting a run
async fn validate_agenda(Json(body): Json<Value>) -> Result<Json<AgendaSummary>, AppError> {
    let agenda = Agenda::from_value(body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(Json(AgendaSummary::of(&agenda)))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
