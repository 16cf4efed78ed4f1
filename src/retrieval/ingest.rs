//! Document ingestion from text files

use std::path::{Path, PathBuf};

use super::SimilarityIndex;
use crate::{Error, Result};

/// Outcome of ingesting a set of files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Files read and indexed
    pub files: usize,
    /// Chunks added to the index
    pub chunks: usize,
    /// Where each file was moved, when a processed directory was given
    pub moved: Vec<PathBuf>,
}

/// Read, chunk and index each file, then optionally move them aside
///
/// Every file is read before the index is touched, so an unreadable file
/// fails the whole call without partial ingestion. Moving is best-effort:
/// a file that cannot be moved is logged and left in place.
///
/// # Errors
///
/// Returns error if a file cannot be read as UTF-8 text or the index cannot
/// be persisted
pub fn ingest_files<P: AsRef<Path>>(
    index: &SimilarityIndex,
    paths: &[P],
    processed_dir: Option<&Path>,
) -> Result<IngestReport> {
    let mut texts = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "failed to read document");
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {e}", path.display()),
            ))
        })?;
        texts.push(text);
    }

    let chunks = index.ingest_batch(&texts)?;

    let mut moved = Vec::new();
    if let Some(dir) = processed_dir {
        for path in paths {
            match move_to_processed(path.as_ref(), dir) {
                Ok(dest) => moved.push(dest),
                Err(e) => tracing::warn!(
                    path = %path.as_ref().display(),
                    error = %e,
                    "failed to move processed document"
                ),
            }
        }
    }

    tracing::info!(files = paths.len(), chunks, "documents ingested");
    Ok(IngestReport {
        files: paths.len(),
        chunks,
        moved,
    })
}

/// Move `path` into `dir`, keeping its file name
///
/// Falls back to copy-and-delete when a rename crosses filesystems.
///
/// # Errors
///
/// Returns error if the directory cannot be created or the file moved
pub fn move_to_processed(path: &Path, dir: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("not a file path: {}", path.display())))?;
    std::fs::create_dir_all(dir)?;
    let dest = dir.join(name);

    if std::fs::rename(path, &dest).is_err() {
        std::fs::copy(path, &dest)?;
        std::fs::remove_file(path)?;
    }

    tracing::debug!(from = %path.display(), to = %dest.display(), "moved processed document");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::VectorStore;

    fn index_in(dir: &Path) -> SimilarityIndex {
        SimilarityIndex::open(VectorStore::new(dir.join("store.json")), 200, 8).unwrap()
    }

    #[test]
    fn test_ingests_and_moves() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.txt");
        std::fs::write(&doc, "hello world. this is a test document.").unwrap();
        let processed = dir.path().join("processed");

        let index = index_in(dir.path());
        let report = ingest_files(&index, &[&doc], Some(processed.as_path())).unwrap();

        assert_eq!(report.files, 1);
        assert_eq!(report.chunks, 1);
        assert_eq!(report.moved, vec![processed.join("doc.txt")]);
        assert!(!doc.exists());
        assert!(processed.join("doc.txt").exists());

        let results = index.query("test document.", 3).unwrap();
        assert!(results.iter().any(|c| c.contains("test document")));
    }

    #[test]
    fn test_missing_file_fails_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, "fine content").unwrap();
        let missing = dir.path().join("missing.txt");

        let index = index_in(dir.path());
        let result = ingest_files(&index, &[&good, &missing], None);

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(index.is_empty().unwrap());
        assert!(good.exists());
    }

    #[test]
    fn test_without_processed_dir_leaves_files() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.txt");
        std::fs::write(&doc, "stay here").unwrap();

        let index = index_in(dir.path());
        let report = ingest_files(&index, &[&doc], None).unwrap();

        assert!(report.moved.is_empty());
        assert!(doc.exists());
    }
}
