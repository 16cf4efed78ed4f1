//! Document upload endpoint

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
};
use serde::Serialize;

use super::{ApiError, ApiState};

/// Upload size ceiling
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Chunks added to the index
    pub chunks: usize,
}

/// Ingest the text file in multipart field `file`
async fn upload(
    State(state): State<Arc<ApiState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|_| ApiError::BadRequest("file is not UTF-8 text".to_string()))?;

        let index = Arc::clone(&state.index);
        let chunks = tokio::task::spawn_blocking(move || index.ingest(&text))
            .await
            .map_err(|e| ApiError::Internal(format!("ingest task failed: {e}")))??;

        tracing::info!(filename = ?filename, chunks, "uploaded document ingested");
        return Ok(Json(UploadResponse {
            status: "ok",
            filename,
            chunks,
        }));
    }

    Err(ApiError::NoFile)
}

/// Build upload router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
