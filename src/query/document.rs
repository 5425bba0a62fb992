//! Unstructured document model
//!
//! A document is split into sections on blank lines and each section into
//! sentences on `.`, `!` and `?` runs. The model is rebuilt wholesale every
//! time new content is loaded.

use std::sync::LazyLock;

use regex::Regex;

static SECTION_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\n+").expect("valid section regex"));

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("valid sentence regex"));

/// A blank-line separated block of the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: usize,
    /// First sentence, or `Section N` when the block has no text
    pub title: String,
    /// Raw block text
    pub content: String,
    /// Trimmed, non-empty sentences in order
    pub sentences: Vec<String>,
}

/// Loaded document text and its derived sections
#[derive(Debug, Clone, Default)]
pub struct DocumentModel {
    title: String,
    content: String,
    sections: Vec<Section>,
}

impl DocumentModel {
    /// Build a model from raw document text
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let title = title.into();
        let content = content.into();

        let sections: Vec<Section> = if content.trim().is_empty() {
            Vec::new()
        } else {
            SECTION_BREAK
                .split(&content)
                .enumerate()
                .map(|(id, block)| {
                    let sentences = split_sentences(block);
                    Section {
                        id,
                        title: sentences
                            .first()
                            .cloned()
                            .unwrap_or_else(|| format!("Section {}", id + 1)),
                        content: block.to_string(),
                        sentences,
                    }
                })
                .collect()
        };

        tracing::debug!(
            sections = sections.len(),
            sentences = sections.iter().map(|s| s.sentences.len()).sum::<usize>(),
            "processed document"
        );

        Self {
            title,
            content,
            sections,
        }
    }

    /// Document title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Raw document text
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Derived sections in document order
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Whether there is no usable text
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Split text into trimmed, non-empty sentences
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    SENTENCE_END
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_and_sentences() {
        let doc = DocumentModel::new(
            "Notes",
            "First idea. Second idea!\n\n\nAnother block? Yes...\nStill here",
        );

        assert_eq!(doc.sections().len(), 2);

        let first = &doc.sections()[0];
        assert_eq!(first.id, 0);
        assert_eq!(first.title, "First idea");
        assert_eq!(first.sentences, vec!["First idea", "Second idea"]);

        let second = &doc.sections()[1];
        assert_eq!(second.sentences, vec!["Another block", "Yes", "Still here"]);
    }

    #[test]
    fn test_untitled_section() {
        let doc = DocumentModel::new("Notes", "Text.\n\n...");
        assert_eq!(doc.sections()[1].title, "Section 2");
        assert!(doc.sections()[1].sentences.is_empty());
    }

    #[test]
    fn test_empty_document() {
        let doc = DocumentModel::new("Empty", "   \n ");
        assert!(doc.is_empty());
        assert!(doc.sections().is_empty());
    }
}
