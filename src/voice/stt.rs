//! Speech-to-text (STT) adapters

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AsrConfig, AsrProvider};
use crate::services::Transcriber;
use crate::{Error, Result};

/// Response from an OpenAI-compatible transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Build the transcriber selected by the ASR configuration
///
/// # Errors
///
/// Returns error if the HTTP provider is selected without an API key
pub fn transcriber_from_config(config: &AsrConfig) -> Result<Arc<dyn Transcriber>> {
    match config.provider {
        AsrProvider::WhisperCli => Ok(Arc::new(WhisperCli::new(&config.binary, &config.model))),
        AsrProvider::OpenAi => {
            let api_key = config.api_key.clone().unwrap_or_default();
            Ok(Arc::new(WhisperApi::new(
                config.api_url.clone(),
                api_key,
                "whisper-1".to_string(),
            )?))
        }
    }
}

/// Runs a local whisper.cpp `whisper-cli` binary
///
/// The binary writes its transcript next to the input as `<audio>.txt`; the
/// sidecar is read and removed after each call.
pub struct WhisperCli {
    binary: String,
    model: PathBuf,
}

impl WhisperCli {
    #[must_use]
    pub fn new(binary: &str, model: &Path) -> Self {
        Self {
            binary: binary.to_string(),
            model: model.to_path_buf(),
        }
    }

    /// Locate the binary, either as a path or by name on `PATH`
    ///
    /// # Errors
    ///
    /// Returns error if the binary cannot be found
    pub fn resolve_binary(&self) -> Result<PathBuf> {
        let candidate = Path::new(&self.binary);
        if candidate.components().count() > 1 {
            if candidate.is_file() {
                return Ok(candidate.to_path_buf());
            }
            return Err(Error::Stt(format!(
                "whisper binary not found at {}",
                candidate.display()
            )));
        }

        which::which(&self.binary)
            .map_err(|e| Error::Stt(format!("whisper binary {} not on PATH: {e}", self.binary)))
    }
}

/// Where whisper-cli writes the transcript for `audio_path`
#[must_use]
pub fn sidecar_path(audio_path: &Path) -> PathBuf {
    let mut name = audio_path.as_os_str().to_os_string();
    name.push(".txt");
    PathBuf::from(name)
}

#[async_trait]
impl Transcriber for WhisperCli {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let binary = self.resolve_binary()?;
        tracing::debug!(binary = %binary.display(), audio = %audio_path.display(), "running whisper-cli");

        let output = tokio::process::Command::new(&binary)
            .arg("-m")
            .arg(&self.model)
            .arg("-f")
            .arg(audio_path)
            .arg("-otxt")
            .output()
            .await
            .map_err(|e| Error::Stt(format!("failed to run {}: {e}", binary.display())))?;

        if !output.status.success() {
            tracing::warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "whisper-cli exited with failure"
            );
        }

        let sidecar = sidecar_path(audio_path);
        let transcript = tokio::fs::read_to_string(&sidecar).await;
        if let Err(e) = tokio::fs::remove_file(&sidecar).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %sidecar.display(), error = %e, "failed to remove transcript file");
            }
        }

        let transcript = transcript
            .map_err(|e| Error::Stt(format!("no transcript produced at {}: {e}", sidecar.display())))?;
        let transcript = transcript.trim().to_string();

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

/// Posts audio to an OpenAI-compatible transcription endpoint
pub struct WhisperApi {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl WhisperApi {
    /// Create a new HTTP transcriber
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(url: String, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Transcriber for WhisperApi {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let audio = tokio::fs::read(audio_path).await?;
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        let transcript = result.text.trim().to_string();

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_appends_txt() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/mic_1.wav")),
            PathBuf::from("/tmp/mic_1.wav.txt")
        );
    }

    #[test]
    fn test_missing_binary_path() {
        let cli = WhisperCli::new("./no/such/whisper-cli", Path::new("model.bin"));
        assert!(matches!(cli.resolve_binary(), Err(Error::Stt(_))));
    }

    #[test]
    fn test_missing_binary_name() {
        let cli = WhisperCli::new("murmur-no-such-whisper-binary", Path::new("model.bin"));
        assert!(cli.resolve_binary().is_err());
    }

    #[tokio::test]
    async fn test_transcribe_without_binary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("mic.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        let cli = WhisperCli::new("./no/such/whisper-cli", Path::new("model.bin"));
        assert!(cli.transcribe(&audio).await.is_err());
    }

    #[test]
    fn test_api_requires_key() {
        let result = WhisperApi::new(
            "http://localhost/v1/audio/transcriptions".to_string(),
            String::new(),
            "whisper-1".to_string(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
