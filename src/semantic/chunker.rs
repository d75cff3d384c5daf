//! Paragraph chunking for note text.
//!
//! A chunk is one paragraph of the note's extracted text. Paragraphs are
//! separated by a blank line; anything shorter than the minimum length after
//! trimming is too noisy to retrieve on its own and is dropped.

/// Split `text` into ordered paragraph chunks.
///
/// Paragraph separator is two consecutive newlines. Each candidate is
/// trimmed, then kept only if it has at least `min_chars` characters.
/// The position of a kept chunk in the returned vec is its sequence number.
///
/// Empty or whitespace-only input, or input where no paragraph meets the
/// cutoff, yields an empty vec. A paragraph with no separator is kept whole
/// no matter how long; there is no upper length cap.
pub fn chunk_text(text: &str, min_chars: usize) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty() && paragraph.chars().count() >= min_chars)
        .map(str::to_string)
        .collect()
}
