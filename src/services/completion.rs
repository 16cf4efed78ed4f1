//! llama.cpp-style `/completion` client

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Completer;
use crate::config::CompletionConfig;
use crate::{Error, Result};

/// What came back from the completion service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResponse {
    /// Well-formed reply with generated text
    Generated(String),
    /// The body was not the expected JSON shape
    Unparsable,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
}

#[derive(Deserialize)]
struct CompletionBody {
    content: String,
}

/// Interpret a completion response body
#[must_use]
pub fn parse_completion(body: &str) -> CompletionResponse {
    match serde_json::from_str::<CompletionBody>(body) {
        Ok(parsed) => CompletionResponse::Generated(parsed.content),
        Err(e) => {
            tracing::warn!(error = %e, body_len = body.len(), "unparsable completion response");
            CompletionResponse::Unparsable
        }
    }
}

/// Client for a llama.cpp server's completion endpoint
pub struct LlamaCompletion {
    client: reqwest::Client,
    endpoint: String,
}

impl LlamaCompletion {
    /// Create a client for the server at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/completion", base_url.trim_end_matches('/')),
        })
    }

    /// Create a client from the completion configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &CompletionConfig) -> Result<Self> {
        Self::new(&config.url, config.timeout)
    }

    /// Full URL requests are posted to
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Completer for LlamaCompletion {
    async fn complete(&self, prompt: &str, n_predict: u32) -> Result<CompletionResponse> {
        tracing::debug!(prompt_len = prompt.len(), n_predict, "requesting completion");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&CompletionRequest { prompt, n_predict })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "completion request failed");
                e
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "completion API error");
            return Err(Error::Completion(format!("completion API error {status}: {body}")));
        }

        Ok(parse_completion(&body))
    }
}
