//! Query text normalization

/// Punctuation removed before structured matching
const STRIPPED_PUNCTUATION: &[char] = &['?', ',', '.', '!', ';', ':', '\'', '"'];

/// Clean a raw query for matching
///
/// Lowercases, trims, strips `?,.!;:'"` and collapses whitespace runs to a
/// single space. Total: every input produces a (possibly empty) string.
#[must_use]
pub fn normalize(query: &str) -> String {
    let stripped: String = query
        .to_lowercase()
        .chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rewrite a transcript the recognizer commonly gets wrong
///
/// A lone "I" (with or without a trailing period) is almost always a
/// misheard "hi".
#[must_use]
pub fn correct_transcript(transcript: &str) -> String {
    let trimmed = transcript.trim();
    let lower = trimmed.to_lowercase();

    if lower == "i" || lower == "i." {
        tracing::debug!(transcript = trimmed, "corrected transcript to \"hi\"");
        return "hi".to_string();
    }

    trimmed.to_string()
}
