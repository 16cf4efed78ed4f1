//! In-memory term-frequency similarity index
//!
//! Chunks and their term vectors live side by side in one locked state, so a
//! query never observes a half-applied ingest. Readers share the lock; ingest
//! and reload take it exclusively and clear the query cache in the same
//! critical section.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError, RwLock};

use lru::LruCache;

use super::chunker;
use super::store::VectorStore;
use crate::config::RetrievalConfig;
use crate::{Error, Result};

/// Occurrence count of each whitespace-separated term in a text
///
/// Terms are taken verbatim (case-sensitive), matching how chunks are split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermVector {
    counts: HashMap<String, u32>,
}

impl TermVector {
    /// Count the terms of `text`
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let mut counts = HashMap::new();
        for term in text.split_whitespace() {
            *counts.entry(term.to_string()).or_insert(0) += 1;
        }
        Self { counts }
    }

    /// Whether the text had no terms
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count of `term`, zero if absent
    #[must_use]
    pub fn count(&self, term: &str) -> u32 {
        self.counts.get(term).copied().unwrap_or(0)
    }

    /// Number of distinct terms
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    fn norm(&self) -> f64 {
        self.counts
            .values()
            .map(|&c| f64::from(c) * f64::from(c))
            .sum::<f64>()
            .sqrt()
    }

    /// Cosine similarity of the two count vectors
    ///
    /// Returns 0.0 when either vector has no terms.
    #[must_use]
    pub fn cosine(&self, other: &Self) -> f64 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }

        // Terms missing from either side contribute nothing to the dot product
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        let dot: f64 = small
            .counts
            .iter()
            .map(|(term, &c)| f64::from(c) * f64::from(large.count(term)))
            .sum();

        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return 0.0;
        }

        dot / denom
    }
}

/// A chunk with its similarity to a query
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ScoredChunk {
    /// Insertion position in the index
    pub position: usize,
    pub score: f64,
    pub text: String,
}

/// Cache key: the literal query string and the requested result count
type CacheKey = (String, usize);

/// Mutable index state guarded by the index lock
struct IndexState {
    chunks: Vec<String>,
    vectors: Vec<TermVector>,
    cache: Mutex<LruCache<CacheKey, Vec<String>>>,
}

impl IndexState {
    fn append(&mut self, new_chunks: Vec<String>) {
        self.vectors
            .extend(new_chunks.iter().map(|c| TermVector::from_text(c)));
        self.chunks.extend(new_chunks);
        self.assert_coindexed();
    }

    fn truncate(&mut self, len: usize) {
        self.chunks.truncate(len);
        self.vectors.truncate(len);
        self.assert_coindexed();
    }

    fn replace(&mut self, chunks: Vec<String>) {
        self.vectors = chunks.iter().map(|c| TermVector::from_text(c)).collect();
        self.chunks = chunks;
        self.assert_coindexed();
    }

    fn clear_cache(&mut self) {
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn assert_coindexed(&self) {
        assert_eq!(
            self.chunks.len(),
            self.vectors.len(),
            "chunk and term vector arrays out of step"
        );
    }
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::Index("index lock poisoned".to_string())
}

/// Shared retrieval index over chunked documents
///
/// Safe to share behind an `Arc` across sessions: queries run concurrently,
/// ingests are serialized with each other and with queries.
pub struct SimilarityIndex {
    state: RwLock<IndexState>,
    store: VectorStore,
    chunk_size: usize,
}

impl std::fmt::Debug for SimilarityIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityIndex")
            .field("store", &self.store)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl SimilarityIndex {
    /// Open the index, loading any chunks already in `store`
    ///
    /// # Errors
    ///
    /// Returns error if the store exists but cannot be read
    pub fn open(store: VectorStore, chunk_size: usize, cache_capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(cache_capacity)
            .ok_or_else(|| Error::Config("cache capacity must be at least 1".to_string()))?;

        let mut state = IndexState {
            chunks: Vec::new(),
            vectors: Vec::new(),
            cache: Mutex::new(LruCache::new(capacity)),
        };
        state.replace(store.load()?);

        tracing::info!(
            path = %store.path().display(),
            chunks = state.chunks.len(),
            "similarity index ready"
        );

        Ok(Self {
            state: RwLock::new(state),
            store,
            chunk_size: chunk_size.max(1),
        })
    }

    /// Open the index described by the retrieval configuration
    ///
    /// # Errors
    ///
    /// Returns error if the store exists but cannot be read
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        Self::open(
            VectorStore::new(&config.store_path),
            config.chunk_size,
            config.cache_capacity,
        )
    }

    /// Words per chunk used by `ingest`
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunk, index and persist one document, returning the new chunk count
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be written; the index is unchanged
    pub fn ingest(&self, text: &str) -> Result<usize> {
        self.ingest_batch(&[text])
    }

    /// Chunk and index several documents under one write lock and one save
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be written; the index is unchanged
    pub fn ingest_batch<S: AsRef<str>>(&self, texts: &[S]) -> Result<usize> {
        let new_chunks: Vec<String> = texts
            .iter()
            .flat_map(|t| chunker::split(t.as_ref(), self.chunk_size))
            .collect();
        let added = new_chunks.len();

        let mut state = self.state.write().map_err(poisoned)?;
        let previous_len = state.chunks.len();

        state.append(new_chunks);
        state.clear_cache();

        if let Err(e) = self.store.save(&state.chunks) {
            tracing::error!(error = %e, "failed to persist index, rolling back ingest");
            state.truncate(previous_len);
            return Err(e);
        }

        tracing::info!(added, total = state.chunks.len(), "ingested document chunks");
        Ok(added)
    }

    /// Replace the in-memory state with the store's contents
    ///
    /// Term vectors are rebuilt and the query cache cleared.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    pub fn reload(&self) -> Result<usize> {
        let chunks = self.store.load()?;
        let mut state = self.state.write().map_err(poisoned)?;
        state.replace(chunks);
        state.clear_cache();
        Ok(state.chunks.len())
    }

    /// Top `top_k` chunks for `text`, best first
    ///
    /// Ties keep insertion order and zero-similarity chunks are dropped, so
    /// fewer than `top_k` may come back. Results are cached per query string
    /// and count until the next mutation.
    ///
    /// # Errors
    ///
    /// Returns error if the index lock is poisoned
    pub fn query(&self, text: &str, top_k: usize) -> Result<Vec<String>> {
        let state = self.state.read().map_err(poisoned)?;
        let key = (text.to_string(), top_k);

        if let Some(hit) = state.cache.lock().map_err(poisoned)?.get(&key) {
            tracing::trace!(query = text, "query cache hit");
            return Ok(hit.clone());
        }

        if state.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let results: Vec<String> = Self::rank(&state, text, top_k)
            .into_iter()
            .map(|s| s.text)
            .collect();

        state
            .cache
            .lock()
            .map_err(poisoned)?
            .put(key, results.clone());

        tracing::debug!(query = text, results = results.len(), "query ranked");
        Ok(results)
    }

    /// Like `query` but with scores and positions, bypassing the cache
    ///
    /// # Errors
    ///
    /// Returns error if the index lock is poisoned
    pub fn query_scored(&self, text: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(Self::rank(&state, text, top_k))
    }

    fn rank(state: &IndexState, text: &str, top_k: usize) -> Vec<ScoredChunk> {
        let query = TermVector::from_text(text);

        let mut scored: Vec<(usize, f64)> = state
            .vectors
            .iter()
            .map(|v| query.cosine(v))
            .enumerate()
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(top_k)
            .filter(|&(_, score)| score > 0.0)
            .map(|(position, score)| ScoredChunk {
                position,
                score,
                text: state.chunks[position].clone(),
            })
            .collect()
    }

    /// Number of indexed chunks
    ///
    /// # Errors
    ///
    /// Returns error if the index lock is poisoned
    pub fn len(&self) -> Result<usize> {
        Ok(self.state.read().map_err(poisoned)?.chunks.len())
    }

    /// Whether no chunks are indexed
    ///
    /// # Errors
    ///
    /// Returns error if the index lock is poisoned
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Snapshot of all chunks in insertion order
    ///
    /// # Errors
    ///
    /// Returns error if the index lock is poisoned
    pub fn chunks(&self) -> Result<Vec<String>> {
        Ok(self.state.read().map_err(poisoned)?.chunks.clone())
    }

    /// Number of term vectors, which always equals `len()`
    ///
    /// # Errors
    ///
    /// Returns error if the index lock is poisoned
    pub fn vector_count(&self) -> Result<usize> {
        Ok(self.state.read().map_err(poisoned)?.vectors.len())
    }

    /// Number of cached query results
    ///
    /// # Errors
    ///
    /// Returns error if the index lock is poisoned
    pub fn cached_queries(&self) -> Result<usize> {
        let state = self.state.read().map_err(poisoned)?;
        let len = state.cache.lock().map_err(poisoned)?.len();
        Ok(len)
    }
}
