//! Voice interaction pipeline
//!
//! Drives one utterance through transcription, retrieval augmentation and
//! generation, timing each stage and applying the failure policy. Speaking
//! is left to the caller: the local loop plays audio, the server sends text.

mod state;
mod voice_loop;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

pub use state::{Interaction, PipelineState};
pub use voice_loop::{LoopTurn, VoiceLoop};

use crate::config::{Config, FailurePolicy};
use crate::metrics::{MetricsLog, RunRecord, Stage, append_row};
use crate::retrieval::{SimilarityIndex, augment};
use crate::services::{Completer, CompletionResponse, StageOutcome, Transcriber};
use crate::{Error, Result};

/// Knobs applied to every run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub n_predict: u32,
    /// Reply substituted when generation fails
    pub fallback: String,
    pub failure_policy: FailurePolicy,
}

impl PipelineSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            n_predict: config.completion.n_predict,
            fallback: config.completion.fallback.clone(),
            failure_policy: config.pipeline.failure_policy,
        }
    }
}

/// Everything produced for one utterance before it is spoken
#[derive(Debug, Clone)]
pub struct Turn {
    pub transcript: StageOutcome<String>,
    pub context: StageOutcome<Vec<String>>,
    /// Prompt sent to the completion service
    pub prompt: String,
    pub reply: StageOutcome<String>,
}

impl Turn {
    /// Stages that fell back to a placeholder
    #[must_use]
    pub fn degraded_stages(&self) -> Vec<Stage> {
        [
            (Stage::Transcribe, self.transcript.is_degraded()),
            (Stage::Augment, self.context.is_degraded()),
            (Stage::GenerateResponse, self.reply.is_degraded()),
        ]
        .into_iter()
        .filter_map(|(stage, degraded)| degraded.then_some(stage))
        .collect()
    }
}

/// Shared transcribe, augment and generate stages
pub struct Pipeline {
    transcriber: Arc<dyn Transcriber>,
    completer: Arc<dyn Completer>,
    index: Arc<SimilarityIndex>,
    metrics: Arc<Mutex<MetricsLog>>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        completer: Arc<dyn Completer>,
        index: Arc<SimilarityIndex>,
        metrics: Arc<Mutex<MetricsLog>>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            transcriber,
            completer,
            index,
            metrics,
            settings,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[must_use]
    pub fn index(&self) -> &Arc<SimilarityIndex> {
        &self.index
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<Mutex<MetricsLog>> {
        &self.metrics
    }

    /// Run transcription, augmentation and generation for captured audio
    ///
    /// `interaction` must be capturing; it is left generating on success.
    ///
    /// # Errors
    ///
    /// Returns error on an invalid state transition, or under the fail-loud
    /// policy when a stage degrades. Metrics for the aborted run are logged
    /// before the error is returned.
    pub async fn respond(&self, interaction: &mut Interaction, audio_path: &Path) -> Result<Turn> {
        interaction.advance(PipelineState::Transcribing)?;
        let transcript = interaction
            .timer_mut()
            .time_async(Stage::Transcribe, self.transcribe(audio_path))
            .await;
        self.enforce(interaction, Stage::Transcribe, &transcript).await?;

        interaction.advance(PipelineState::Augmenting)?;
        let (context, prompt) = interaction
            .timer_mut()
            .time_async(Stage::Augment, self.augment(transcript.value()))
            .await;
        self.enforce(interaction, Stage::Augment, &context).await?;

        interaction.advance(PipelineState::Generating)?;
        let reply = interaction
            .timer_mut()
            .time_async(Stage::GenerateResponse, self.generate(&prompt))
            .await;
        self.enforce(interaction, Stage::GenerateResponse, &reply).await?;

        Ok(Turn {
            transcript,
            context,
            prompt,
            reply,
        })
    }

    /// Log the interaction's timings as one completed run and return it to idle
    ///
    /// The CSV row is appended on the blocking pool after the metrics lock is
    /// released.
    pub async fn finish(&self, interaction: &mut Interaction) -> RunRecord {
        let (record, path) = {
            let mut metrics = self.metrics.lock().await;
            let record = metrics.fold_run(interaction.timer_mut());
            (record, metrics.path().map(Path::to_path_buf))
        };
        interaction.reset();

        if let Some(path) = path {
            let row = record.clone();
            let appended = tokio::task::spawn_blocking(move || {
                let result = append_row(&path, &row);
                (path, result)
            })
            .await;
            match appended {
                Ok((_, Ok(()))) => {}
                Ok((path, Err(e))) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to append metrics row");
                }
                Err(e) => tracing::warn!(error = %e, "metrics append task failed"),
            }
        }

        record
    }

    /// Apply the failure policy to a finished stage
    ///
    /// # Errors
    ///
    /// Returns `Error::StageFailed` when the stage degraded and the policy is
    /// fail-loud; the run's metrics are logged first.
    pub async fn enforce<T>(
        &self,
        interaction: &mut Interaction,
        stage: Stage,
        outcome: &StageOutcome<T>,
    ) -> Result<()> {
        let Some(reason) = outcome.reason() else {
            return Ok(());
        };

        tracing::warn!(interaction = %interaction.id(), %stage, reason, "stage degraded");

        if self.settings.failure_policy == FailurePolicy::Loud {
            self.finish(interaction).await;
            return Err(Error::StageFailed {
                stage: stage.as_str(),
                reason: reason.to_string(),
            });
        }
        Ok(())
    }

    async fn transcribe(&self, audio_path: &Path) -> StageOutcome<String> {
        match self.transcriber.transcribe(audio_path).await {
            Ok(text) => {
                if text.is_empty() {
                    tracing::info!("no speech detected");
                }
                StageOutcome::Ok(text)
            }
            Err(e) => StageOutcome::Degraded {
                value: String::new(),
                reason: e.to_string(),
            },
        }
    }

    async fn augment(&self, query: &str) -> (StageOutcome<Vec<String>>, String) {
        let index = Arc::clone(&self.index);
        let owned = query.to_string();
        let top_k = self.settings.top_k;

        let context = match tokio::task::spawn_blocking(move || index.query(&owned, top_k)).await
        {
            Ok(Ok(chunks)) => StageOutcome::Ok(chunks),
            Ok(Err(e)) => StageOutcome::Degraded {
                value: Vec::new(),
                reason: e.to_string(),
            },
            Err(e) => StageOutcome::Degraded {
                value: Vec::new(),
                reason: format!("retrieval task failed: {e}"),
            },
        };

        tracing::debug!(chunks = context.value().len(), "retrieved context");
        let prompt = augment(query, context.value());
        (context, prompt)
    }

    async fn generate(&self, prompt: &str) -> StageOutcome<String> {
        let fallback = || self.settings.fallback.clone();
        match self.completer.complete(prompt, self.settings.n_predict).await {
            Ok(CompletionResponse::Generated(text)) => StageOutcome::Ok(text.trim().to_string()),
            Ok(CompletionResponse::Unparsable) => StageOutcome::Degraded {
                value: fallback(),
                reason: "unparsable completion response".to_string(),
            },
            Err(e) => StageOutcome::Degraded {
                value: fallback(),
                reason: e.to_string(),
            },
        }
    }
}
