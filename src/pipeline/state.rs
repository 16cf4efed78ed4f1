//! Interaction state machine

use std::fmt;

use uuid::Uuid;

use crate::metrics::RunTimer;
use crate::{Error, Result};

/// Where an interaction is in the capture-to-speech sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PipelineState {
    #[default]
    Idle,
    Capturing,
    Transcribing,
    Augmenting,
    Generating,
    Speaking,
}

impl PipelineState {
    /// The only state this one may advance to
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Idle => Self::Capturing,
            Self::Capturing => Self::Transcribing,
            Self::Transcribing => Self::Augmenting,
            Self::Augmenting => Self::Generating,
            Self::Generating => Self::Speaking,
            Self::Speaking => Self::Idle,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Transcribing => "transcribing",
            Self::Augmenting => "augmenting",
            Self::Generating => "generating",
            Self::Speaking => "speaking",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pass through the pipeline: its state and stage timings
#[derive(Debug)]
pub struct Interaction {
    id: Uuid,
    state: PipelineState,
    timer: RunTimer,
}

impl Interaction {
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    /// Interaction tagged with an existing id (a session's, for instance)
    #[must_use]
    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            state: PipelineState::Idle,
            timer: RunTimer::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Move to `next`, which must follow the current state
    ///
    /// # Errors
    ///
    /// Returns error if `next` skips or reverses a step
    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        if self.state.next() != next {
            return Err(Error::Session(format!(
                "invalid transition {} -> {next}",
                self.state
            )));
        }
        tracing::debug!(interaction = %self.id, from = %self.state, to = %next, "state transition");
        self.state = next;
        Ok(())
    }

    /// Return to idle, discarding any unlogged timings
    pub fn reset(&mut self) {
        if self.state != PipelineState::Idle {
            tracing::debug!(interaction = %self.id, from = %self.state, "interaction reset");
        }
        self.state = PipelineState::Idle;
        self.timer.take();
    }

    pub const fn timer_mut(&mut self) -> &mut RunTimer {
        &mut self.timer
    }

    #[must_use]
    pub const fn timer(&self) -> &RunTimer {
        &self.timer
    }
}

impl Default for Interaction {
    fn default() -> Self {
        Self::new()
    }
}
