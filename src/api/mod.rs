//! HTTP and WebSocket server for browser clients

pub mod health;
pub mod query;
pub mod session;
pub mod upload;
pub mod websocket;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub use session::{Session, SessionInfo, SessionRegistry};
pub use websocket::{WsIncoming, WsOutgoing};

use crate::config::ServerConfig;
use crate::pipeline::Pipeline;
use crate::retrieval::SimilarityIndex;
use crate::Result;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
    pub index: Arc<SimilarityIndex>,
    pub sessions: SessionRegistry,
    /// Scratch directory for per-session audio files
    pub work_dir: PathBuf,
}

impl ApiState {
    pub fn new(pipeline: Arc<Pipeline>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            index: Arc::clone(pipeline.index()),
            pipeline,
            sessions: SessionRegistry::new(),
            work_dir: work_dir.into(),
        }
    }
}

/// Build the full router: API routes, WebSocket, optional static client
pub fn router(state: Arc<ApiState>, static_dir: Option<&Path>) -> Router {
    let mut router = Router::new()
        .merge(health::router(state.clone()))
        .merge(upload::router(state.clone()))
        .merge(query::router(state.clone()))
        .merge(websocket::router(state));

    if let Some(static_dir) = static_dir {
        let index_file = static_dir.join("index.html");
        let serve_dir = ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

        router = router.fallback_service(serve_dir);
        tracing::info!(path = %static_dir.display(), "serving static files");
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router.layer(cors).layer(TraceLayer::new_for_http())
}

/// Server-mode entry point
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: ApiState, config: &ServerConfig) -> Self {
        Self {
            state: Arc::new(state),
            host: config.host.clone(),
            port: config.port,
            static_dir: config.static_dir.clone(),
        }
    }

    /// Run the API server until it fails or the process is interrupted
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(addr = %addr, "API server listening");

        let app = router(self.state, self.static_dir.as_deref());
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutting down API server");
            })
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// API errors rendered as `{"error": {"code", "message"}}`
#[derive(Debug)]
pub enum ApiError {
    NoFile,
    BadRequest(String),
    Internal(String),
}

impl From<crate::Error> for ApiError {
    fn from(e: crate::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::NoFile => (StatusCode::BAD_REQUEST, "no_file", "no file".to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}
