//! Per-connection session state
//!
//! A [`Session`] is owned by its connection task and never shared; the
//! [`SessionRegistry`] only tracks which sessions exist.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics::Stage;
use crate::pipeline::{Interaction, PipelineState};
use crate::{Error, Result};

/// Ceiling on audio buffered for a single utterance
pub const MAX_UTTERANCE_BYTES: usize = 32 * 1024 * 1024;

/// Registry entry for a connected client
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub connected_at: DateTime<Utc>,
    /// Utterances completed on this connection
    pub utterances: u64,
}

/// Connected sessions, shared across handlers
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, SessionInfo>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and return it
    pub async fn open(&self) -> Session {
        let id = Uuid::new_v4();
        let info = SessionInfo {
            id,
            connected_at: Utc::now(),
            utterances: 0,
        };
        self.inner.write().await.insert(id, info);
        tracing::debug!(session_id = %id, "session registered");
        Session::new(id)
    }

    /// Forget a session
    pub async fn close(&self, id: Uuid) -> Option<SessionInfo> {
        let removed = self.inner.write().await.remove(&id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, "session removed");
        }
        removed
    }

    pub async fn record_utterance(&self, id: Uuid) {
        if let Some(info) = self.inner.write().await.get_mut(&id) {
            info.utterances += 1;
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionInfo> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// One client's audio buffer and in-progress interaction
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    buffer: Vec<u8>,
    capture_started: Option<Instant>,
    interaction: Interaction,
}

impl Session {
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            buffer: Vec::new(),
            capture_started: None,
            interaction: Interaction::with_id(id),
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Bytes buffered for the current utterance
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.interaction.state()
    }

    /// Append an audio chunk; the first chunk starts capturing
    ///
    /// # Errors
    ///
    /// Returns error if the utterance would exceed [`MAX_UTTERANCE_BYTES`]
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if self.buffer.len() + chunk.len() > MAX_UTTERANCE_BYTES {
            return Err(Error::Session(format!(
                "utterance exceeds {MAX_UTTERANCE_BYTES} bytes"
            )));
        }

        if self.interaction.state() == PipelineState::Idle {
            self.interaction.advance(PipelineState::Capturing)?;
            self.capture_started = Some(Instant::now());
        }

        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    /// Take the buffered utterance, recording how long it was captured
    ///
    /// The buffer is left empty for the next utterance.
    ///
    /// # Errors
    ///
    /// Returns error if no audio has been received since the last utterance
    pub fn take_utterance(&mut self) -> Result<Vec<u8>> {
        if self.buffer.is_empty() {
            return Err(Error::Session("no audio received".to_string()));
        }

        if let Some(started) = self.capture_started.take() {
            self.interaction
                .timer_mut()
                .record(Stage::RecordAudio, started.elapsed());
        }

        Ok(std::mem::take(&mut self.buffer))
    }

    pub const fn interaction_mut(&mut self) -> &mut Interaction {
        &mut self.interaction
    }

    /// Drop buffered audio and return to idle
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.capture_started = None;
        self.interaction.reset();
    }
}
