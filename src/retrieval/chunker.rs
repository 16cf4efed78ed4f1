//! Word-count chunking of raw document text

/// Split text into chunks of at most `chunk_size` whitespace-separated words
///
/// Words are rejoined with single spaces, so runs of whitespace and newlines
/// collapse. The final chunk may be shorter. Empty or blank input yields no
/// chunks. A `chunk_size` of zero is treated as one.
#[must_use]
pub fn split(text: &str, chunk_size: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(chunk_size.max(1))
        .map(|group| group.join(" "))
        .collect()
}
