//! External collaborators of the pipeline
//!
//! Speech recognition, text generation, speech synthesis and audio I/O are
//! opaque services reached through these traits. Adapters return plain
//! `Result`s; the pipeline decides how a failure degrades.

mod completion;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

pub use completion::{CompletionResponse, LlamaCompletion, parse_completion};

/// Reply used when the completion service gives nothing usable
pub const COMPLETION_FALLBACK: &str = "Sorry, could not parse the model response.";

/// Result of one pipeline stage under the fail-soft policy
///
/// `Degraded` carries the placeholder that replaced the real value, so an
/// empty transcript from silence can be told apart from a failed recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome<T> {
    /// The collaborator produced this value
    Ok(T),
    /// The collaborator failed; `value` is the substituted placeholder
    Degraded { value: T, reason: String },
}

impl<T> StageOutcome<T> {
    /// The produced or substituted value
    pub const fn value(&self) -> &T {
        match self {
            Self::Ok(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Ok(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Why the stage degraded
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// Speech-to-text over a recorded audio file
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcript of the audio at `audio_path`
    ///
    /// An empty string means no speech was detected.
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

/// Text generation from a prompt
#[async_trait]
pub trait Completer: Send + Sync {
    /// Ask for up to `n_predict` tokens continuing `prompt`
    ///
    /// Transport failures are errors; a reply that arrives but cannot be
    /// understood is `CompletionResponse::Unparsable`.
    async fn complete(&self, prompt: &str, n_predict: u32) -> Result<CompletionResponse>;
}

/// Encoding of synthesized speech
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }
}

/// Synthesized speech ready to write or play
#[derive(Debug, Clone)]
pub struct SpeechAudio {
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
}

/// Text-to-speech
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio>;
}

/// Fixed-duration recording to a WAV file
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn record(&self, path: &Path, duration: Duration) -> Result<()>;
}

/// Plays an audio file to completion
#[async_trait]
pub trait Player: Send + Sync {
    async fn play(&self, path: &Path) -> Result<()>;
}
