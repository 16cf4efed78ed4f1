//! Murmur - retrieval-augmented voice assistant
//!
//! This library provides the pieces of a local voice assistant:
//! - Retrieval (term-frequency similarity index with persistence and caching)
//! - Pipeline orchestration (capture, transcribe, augment, generate, speak)
//! - Per-stage latency metrics
//! - Voice I/O and adapters for external speech and completion services
//! - A WebSocket server for browser clients, one session per connection
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │        CLI voice loop   │   HTTP / WebSocket         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Pipeline                          │
//! │  Transcribe │ Augment (retrieval) │ Generate │ Speak │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                External services                     │
//! │   whisper.cpp  │  llama.cpp server  │  TTS endpoint  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod retrieval;
pub mod services;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use metrics::{MetricsLog, RunTimer, Stage};
pub use pipeline::{Interaction, Pipeline, PipelineSettings, PipelineState, Turn, VoiceLoop};
pub use retrieval::{SimilarityIndex, VectorStore, augment};
pub use services::{Completer, StageOutcome, Synthesizer, Transcriber};
