//! Scoped stage timing

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

/// Pipeline stage names as they appear in logs and the metrics CSV
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    RecordAudio,
    Transcribe,
    Augment,
    GenerateResponse,
    Speak,
}

impl Stage {
    /// Every stage in pipeline order
    pub const ALL: [Self; 5] = [
        Self::RecordAudio,
        Self::Transcribe,
        Self::Augment,
        Self::GenerateResponse,
        Self::Speak,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RecordAudio => "record_audio",
            Self::Transcribe => "transcribe",
            Self::Augment => "augment",
            Self::GenerateResponse => "generate_response",
            Self::Speak => "speak",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage durations for the run in progress
#[derive(Debug, Default, Clone)]
pub struct RunTimer {
    durations: BTreeMap<Stage, Duration>,
}

impl RunTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `stage`; the elapsed time is recorded when the guard drops
    ///
    /// Dropping covers every exit path, including `?` returns and unwinding.
    pub fn stage(&mut self, stage: Stage) -> StageGuard<'_> {
        tracing::trace!(%stage, "stage started");
        StageGuard {
            timer: self,
            stage,
            start: Instant::now(),
        }
    }

    /// Time a synchronous closure under `stage`
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let _guard = self.stage(stage);
        f()
    }

    /// Time a future under `stage`
    ///
    /// The duration is recorded even if the future is dropped before completion.
    pub async fn time_async<F: Future>(&mut self, stage: Stage, fut: F) -> F::Output {
        let _guard = self.stage(stage);
        fut.await
    }

    /// Add `elapsed` to the stage's accumulated duration
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        *self.durations.entry(stage).or_default() += elapsed;
    }

    /// Duration recorded for `stage`, if it ran
    #[must_use]
    pub fn get(&self, stage: Stage) -> Option<Duration> {
        self.durations.get(&stage).copied()
    }

    /// Sum of all recorded stages
    #[must_use]
    pub fn total(&self) -> Duration {
        self.durations.values().sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// Take the recorded durations, leaving the timer empty
    pub fn take(&mut self) -> BTreeMap<Stage, Duration> {
        std::mem::take(&mut self.durations)
    }
}

/// Records the enclosing scope's duration into a [`RunTimer`] on drop
pub struct StageGuard<'a> {
    timer: &'a mut RunTimer,
    stage: Stage,
    start: Instant,
}

impl StageGuard<'_> {
    /// Stage being timed
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        tracing::trace!(stage = %self.stage, elapsed_ms = elapsed.as_millis(), "stage finished");
        self.timer.record(self.stage, elapsed);
    }
}
