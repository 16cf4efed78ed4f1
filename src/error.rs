//! Error types for Murmur

use thiserror::Error;

/// Result type alias for Murmur operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Murmur pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or encoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Completion service error
    #[error("completion error: {0}")]
    Completion(String),

    /// Similarity index invariant or lock failure
    #[error("index error: {0}")]
    Index(String),

    /// Vector store persistence error
    #[error("store error: {0}")]
    Store(String),

    /// Session transport error
    #[error("session error: {0}")]
    Session(String),

    /// A stage degraded while the pipeline runs fail-loud
    #[error("stage {stage} failed: {reason}")]
    StageFailed {
        stage: &'static str,
        reason: String,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
