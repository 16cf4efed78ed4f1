//! Shared test utilities
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use murmur::config::FailurePolicy;
use murmur::services::{
    AudioFormat, Completer, CompletionResponse, Player, Recorder, SpeechAudio, Synthesizer,
    Transcriber,
};
use murmur::{Error, MetricsLog, Pipeline, PipelineSettings, Result, SimilarityIndex, VectorStore};

/// Open an index persisted under `dir`
#[must_use]
pub fn temp_index(dir: &Path, chunk_size: usize) -> Arc<SimilarityIndex> {
    let store = VectorStore::new(dir.join("vector_store.json"));
    Arc::new(SimilarityIndex::open(store, chunk_size, 64).expect("failed to open test index"))
}

#[must_use]
pub fn settings(policy: FailurePolicy) -> PipelineSettings {
    PipelineSettings {
        top_k: 3,
        n_predict: 100,
        fallback: murmur::services::COMPLETION_FALLBACK.to_string(),
        failure_policy: policy,
    }
}

/// Pipeline over the given fakes with an in-memory metrics log
pub fn pipeline(
    transcriber: Arc<dyn Transcriber>,
    completer: Arc<dyn Completer>,
    index: Arc<SimilarityIndex>,
    policy: FailurePolicy,
) -> Arc<Pipeline> {
    let metrics = Arc::new(tokio::sync::Mutex::new(MetricsLog::in_memory(5)));
    Arc::new(Pipeline::new(
        transcriber,
        completer,
        index,
        metrics,
        settings(policy),
    ))
}

/// "Recognizes" speech by reading the audio file as UTF-8 text
#[derive(Default)]
pub struct TextTranscriber;

#[async_trait]
impl Transcriber for TextTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(audio_path).await?;
        Ok(String::from_utf8_lossy(&bytes).trim().to_string())
    }
}

/// Recognizer that always fails
pub struct FailingTranscriber;

#[async_trait]
impl Transcriber for FailingTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<String> {
        Err(Error::Stt("whisper-cli not found".to_string()))
    }
}

/// Replies with the first line of the prompt and remembers every prompt
#[derive(Default)]
pub struct EchoCompleter {
    pub prompts: Mutex<Vec<String>>,
}

impl EchoCompleter {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl Completer for EchoCompleter {
    async fn complete(&self, prompt: &str, _n_predict: u32) -> Result<CompletionResponse> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        let first_line = prompt.lines().next().unwrap_or_default();
        Ok(CompletionResponse::Generated(format!("reply to: {first_line}")))
    }
}

/// Completion service that answers with a fixed response
pub struct FixedCompleter(pub CompletionResponse);

#[async_trait]
impl Completer for FixedCompleter {
    async fn complete(&self, _prompt: &str, _n_predict: u32) -> Result<CompletionResponse> {
        Ok(self.0.clone())
    }
}

/// Completion service that cannot be reached
pub struct UnreachableCompleter;

#[async_trait]
impl Completer for UnreachableCompleter {
    async fn complete(&self, _prompt: &str, _n_predict: u32) -> Result<CompletionResponse> {
        Err(Error::Completion("connection refused".to_string()))
    }
}

/// Synthesizer producing a few bytes of fake WAV, counting calls
#[derive(Default)]
pub struct FakeSynthesizer {
    pub calls: Mutex<Vec<String>>,
    pub fail: bool,
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio> {
        self.calls.lock().expect("calls lock").push(text.to_string());
        if self.fail {
            return Err(Error::Tts("voice unavailable".to_string()));
        }
        Ok(SpeechAudio {
            format: AudioFormat::Wav,
            bytes: b"RIFF fake speech".to_vec(),
        })
    }
}

/// Recorder that writes a canned utterance instead of using a microphone
pub struct ScriptedRecorder {
    pub utterance: Vec<u8>,
}

impl ScriptedRecorder {
    pub fn saying(text: &str) -> Self {
        Self {
            utterance: text.as_bytes().to_vec(),
        }
    }
}

#[async_trait]
impl Recorder for ScriptedRecorder {
    async fn record(&self, path: &Path, _duration: Duration) -> Result<()> {
        tokio::fs::write(path, &self.utterance).await?;
        Ok(())
    }
}

/// Player that remembers what it was asked to play
#[derive(Default)]
pub struct RecordingPlayer {
    pub played: Mutex<Vec<PathBuf>>,
}

impl RecordingPlayer {
    pub fn played(&self) -> Vec<PathBuf> {
        self.played.lock().expect("played lock").clone()
    }
}

#[async_trait]
impl Player for RecordingPlayer {
    async fn play(&self, path: &Path) -> Result<()> {
        assert!(path.exists(), "played file must exist during playback");
        self.played
            .lock()
            .expect("played lock")
            .push(path.to_path_buf());
        Ok(())
    }
}
