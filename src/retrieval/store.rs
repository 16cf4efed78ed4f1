//! Durable storage for the ordered chunk list
//!
//! Only chunk text is written; term vectors are rebuilt on load.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Current on-disk format version
const FORMAT_VERSION: u32 = 1;

/// On-disk representation of the vector store
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    documents: Vec<String>,
}

/// JSON file holding every indexed chunk in ingestion order
#[derive(Debug, Clone)]
pub struct VectorStore {
    path: PathBuf,
}

impl VectorStore {
    /// Create a store backed by `path` (not touched until load/save)
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the chunk list
    ///
    /// A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(&self) -> Result<Vec<String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no vector store yet, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let file: StoreFile = serde_json::from_str(&content)?;
        if file.version != FORMAT_VERSION {
            return Err(Error::Store(format!(
                "unsupported store version {} in {}",
                file.version,
                self.path.display()
            )));
        }

        tracing::debug!(
            path = %self.path.display(),
            chunks = file.documents.len(),
            "loaded vector store"
        );
        Ok(file.documents)
    }

    /// Atomically replace the stored chunk list
    ///
    /// Writes to a temporary file in the same directory and renames it over
    /// the target, so readers see either the old or the new list.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written or renamed
    pub fn save(&self, chunks: &[String]) -> Result<()> {
        #[derive(Serialize)]
        struct StoreFileRef<'a> {
            version: u32,
            documents: &'a [String],
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let body = serde_json::to_vec(&StoreFileRef {
            version: FORMAT_VERSION,
            documents: chunks,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| Error::Store(format!("failed to replace {}: {e}", self.path.display())))?;

        tracing::debug!(path = %self.path.display(), chunks = chunks.len(), "saved vector store");
        Ok(())
    }
}
