//! Single-client record, respond and speak loop

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::{Interaction, Pipeline, PipelineState, Turn};
use crate::metrics::{RunRecord, Stage};
use crate::services::{Player, Recorder, StageOutcome, Synthesizer};
use crate::Result;

/// Outcome of one full local interaction
#[derive(Debug, Clone)]
pub struct LoopTurn {
    pub capture: StageOutcome<()>,
    pub turn: Turn,
    /// Whether audio was played; `false` for a blank reply
    pub spoken: StageOutcome<bool>,
    pub record: RunRecord,
}

/// Records from the microphone, runs the pipeline and speaks the reply
pub struct VoiceLoop {
    pipeline: Arc<Pipeline>,
    recorder: Arc<dyn Recorder>,
    synthesizer: Arc<dyn Synthesizer>,
    player: Arc<dyn Player>,
    work_dir: PathBuf,
    record_duration: Duration,
}

impl VoiceLoop {
    pub fn new(
        pipeline: Arc<Pipeline>,
        recorder: Arc<dyn Recorder>,
        synthesizer: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
        work_dir: impl Into<PathBuf>,
        record_duration: Duration,
    ) -> Self {
        Self {
            pipeline,
            recorder,
            synthesizer,
            player,
            work_dir: work_dir.into(),
            record_duration,
        }
    }

    /// Run one interaction end to end
    ///
    /// Temporary audio is removed whether or not the run succeeds.
    ///
    /// # Errors
    ///
    /// Returns error under the fail-loud policy when a stage degrades
    pub async fn run_once(&self) -> Result<LoopTurn> {
        let mut interaction = Interaction::new();
        let audio_path = self.work_dir.join("mic.wav");

        interaction.advance(PipelineState::Capturing)?;
        tracing::info!(secs = self.record_duration.as_secs_f64(), "recording");
        let capture = match interaction
            .timer_mut()
            .time_async(
                Stage::RecordAudio,
                self.recorder.record(&audio_path, self.record_duration),
            )
            .await
        {
            Ok(()) => StageOutcome::Ok(()),
            Err(e) => StageOutcome::Degraded {
                value: (),
                reason: e.to_string(),
            },
        };

        let turn = match self
            .pipeline
            .enforce(&mut interaction, Stage::RecordAudio, &capture)
            .await
        {
            Ok(()) => self.pipeline.respond(&mut interaction, &audio_path).await,
            Err(e) => Err(e),
        };
        remove_quietly(&audio_path).await;
        let turn = turn?;

        tracing::info!(transcript = %turn.transcript.value(), "you said");
        tracing::info!(reply = %turn.reply.value(), "assistant");

        interaction.advance(PipelineState::Speaking)?;
        let spoken = interaction
            .timer_mut()
            .time_async(Stage::Speak, self.speak(turn.reply.value()))
            .await;
        self.pipeline
            .enforce(&mut interaction, Stage::Speak, &spoken)
            .await?;

        let record = self.pipeline.finish(&mut interaction).await;

        Ok(LoopTurn {
            capture,
            turn,
            spoken,
            record,
        })
    }

    /// Repeat interactions until `turns` complete or Ctrl+C
    ///
    /// Ctrl+C is honored between interactions; a turn already under way runs
    /// to completion and is logged.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`VoiceLoop::run_once`]
    pub async fn run(&self, turns: Option<usize>) -> Result<usize> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let signal = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        let result = self.run_until(turns, shutdown_rx).await;
        signal.abort();
        result
    }

    /// Repeat interactions until `turns` complete or `shutdown` receives
    ///
    /// The shutdown channel is checked before each interaction starts.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`VoiceLoop::run_once`]
    pub async fn run_until(
        &self,
        turns: Option<usize>,
        mut shutdown: mpsc::Receiver<()>,
    ) -> Result<usize> {
        let mut completed = 0;

        while turns.is_none_or(|limit| completed < limit) {
            if shutdown.try_recv().is_ok() {
                tracing::info!(completed, "shutdown requested, stopping");
                break;
            }
            self.run_once().await?;
            completed += 1;
        }

        Ok(completed)
    }

    async fn speak(&self, reply: &str) -> StageOutcome<bool> {
        if reply.trim().is_empty() {
            tracing::info!("no response to speak");
            return StageOutcome::Ok(false);
        }

        match self.synthesize_and_play(reply).await {
            Ok(()) => StageOutcome::Ok(true),
            Err(e) => StageOutcome::Degraded {
                value: false,
                reason: e.to_string(),
            },
        }
    }

    async fn synthesize_and_play(&self, reply: &str) -> Result<()> {
        let audio = self.synthesizer.synthesize(reply).await?;
        let path = self
            .work_dir
            .join(format!("reply.{}", audio.format.extension()));

        tokio::fs::write(&path, &audio.bytes).await?;
        let played = self.player.play(&path).await;
        remove_quietly(&path).await;
        played
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove temporary audio");
        }
    }
}
