//! Retrieval-augmented prompting
//!
//! Documents are split into word-count chunks, indexed by term frequency and
//! persisted as plain chunk text. Queries rank chunks by cosine similarity
//! and the best ones are appended to the prompt.

pub mod chunker;
mod index;
mod ingest;
mod prompt;
mod store;

pub use index::{ScoredChunk, SimilarityIndex, TermVector};
pub use ingest::{IngestReport, ingest_files, move_to_processed};
pub use prompt::{CONTEXT_HEADER, augment};
pub use store::VectorStore;

/// Words per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 200;

/// Chunks retrieved per query
pub const DEFAULT_TOP_K: usize = 3;

/// Cached query results kept before the least recently used is evicted
pub const DEFAULT_CACHE_CAPACITY: usize = 256;
