//! Health check endpoint

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Indexed chunks, absent if the index is unreadable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    /// Connected sessions
    pub sessions: usize,
}

async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let chunks = state.index.len().ok();
    Json(HealthResponse {
        status: if chunks.is_some() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        chunks,
        sessions: state.sessions.len().await,
    })
}

/// Build health router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}
