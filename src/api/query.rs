//! Retrieval lookup endpoint

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::retrieval::ScoredChunk;

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub q: String,
    /// Result count, defaults to the configured `top_k`
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub results: Vec<ScoredChunk>,
}

async fn query(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    let top_k = params.k.unwrap_or(state.pipeline.settings().top_k);
    let index = Arc::clone(&state.index);
    let text = params.q.clone();

    let results = tokio::task::spawn_blocking(move || index.query_scored(&text, top_k))
        .await
        .map_err(|e| ApiError::Internal(format!("query task failed: {e}")))??;

    Ok(Json(QueryResponse {
        query: params.q,
        results,
    }))
}

/// Build query router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/query", get(query))
        .with_state(state)
}
