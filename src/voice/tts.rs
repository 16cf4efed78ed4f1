//! Text-to-speech (TTS) adapter

use async_trait::async_trait;

use crate::config::TtsConfig;
use crate::services::{AudioFormat, SpeechAudio, Synthesizer};
use crate::{Error, Result};

/// Synthesizes speech through an OpenAI-compatible `/audio/speech` endpoint
pub struct OpenAiSpeech {
    client: reqwest::Client,
    url: String,
    api_key: String,
    voice: String,
    speed: f64,
    model: String,
}

impl OpenAiSpeech {
    /// Create a new TTS client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn from_config(config: &TtsConfig) -> Result<Self> {
        let api_key = config.api_key.clone().unwrap_or_default();
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            api_key,
            voice: config.voice.clone(),
            speed: config.speed,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f64,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        tracing::debug!(chars = text.len(), voice = %self.voice, "synthesizing speech");

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(SpeechAudio {
            format: AudioFormat::Mp3,
            bytes: audio.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tts_config(api_key: Option<&str>) -> TtsConfig {
        TtsConfig {
            url: "http://localhost/v1/audio/speech".to_string(),
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            api_key: api_key.map(str::to_string),
        }
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            OpenAiSpeech::from_config(&tts_config(None)),
            Err(Error::Config(_))
        ));
        assert!(OpenAiSpeech::from_config(&tts_config(Some(""))).is_err());
        assert!(OpenAiSpeech::from_config(&tts_config(Some("sk-test"))).is_ok());
    }
}
