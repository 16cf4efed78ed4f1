//! Augmented prompt assembly

use std::fmt::Write;

/// Header separating the user's query from retrieved context
pub const CONTEXT_HEADER: &str = "Relevant information:";

/// Characters of each chunk shown in the debug preview
const PREVIEW_CHARS: usize = 60;

/// Merge a query with ranked retrieved chunks
///
/// Chunks are numbered from 1 in the order given; they are never re-ranked.
/// With no chunks the query is returned unchanged.
#[must_use]
pub fn augment<S: AsRef<str>>(query: &str, chunks: &[S]) -> String {
    if chunks.is_empty() {
        return query.to_string();
    }

    let mut prompt = format!("{query}\n\n{CONTEXT_HEADER}");
    for (idx, chunk) in chunks.iter().enumerate() {
        let chunk = chunk.as_ref();
        let _ = write!(prompt, "\n[{}] {chunk}", idx + 1);

        let preview: String = chunk
            .chars()
            .take(PREVIEW_CHARS)
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        tracing::debug!(rank = idx + 1, %preview, "added chunk");
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_chunks_returns_query() {
        let chunks: [&str; 0] = [];
        assert_eq!(augment("what time is it", &chunks), "what time is it");
    }

    #[test]
    fn test_chunks_numbered_in_order() {
        let prompt = augment("x", &["a", "b"]);

        let q = prompt.find('x').unwrap();
        let header = prompt.find(CONTEXT_HEADER).unwrap();
        let first = prompt.find("[1] a").unwrap();
        let second = prompt.find("[2] b").unwrap();
        assert!(q < header && header < first && first < second);
    }

    #[test]
    fn test_exact_layout() {
        let prompt = augment("question", &["alpha".to_string(), "beta".to_string()]);
        assert_eq!(prompt, "question\n\nRelevant information:\n[1] alpha\n[2] beta");
    }

    #[test]
    fn test_does_not_rerank() {
        let prompt = augment("q", &["zeta", "alpha"]);
        assert!(prompt.find("[1] zeta").unwrap() < prompt.find("[2] alpha").unwrap());
    }
}
