//! HTTP endpoints beside the WebSocket: a health probe and a read-only
//! session snapshot.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub session_active: bool,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let session_active = state
        .current_session()
        .await
        .map(|s| s.active)
        .unwrap_or(false);

    Json(HealthResponse {
        status: "OK",
        timestamp: chrono::Utc::now().to_rfc3339(),
        session_active,
    })
}

/// GET /api/session
///
/// Current session snapshot, 404 before the teacher has created one.
pub async fn session_snapshot(State(state): State<Arc<AppState>>) -> Response {
    match state.current_session().await {
        Some(session) => Json(session).into_response(),
        None => (StatusCode::NOT_FOUND, "Session not found").into_response(),
    }
}
