//! Query resolution pipeline entry point
//!
//! `received -> cache check -> command | structured match | document search -> cache`

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::document::DocumentModel;
use super::knowledge::KnowledgeBase;
use super::matcher::StructuredMatcher;
use super::normalize::normalize;
use super::search::search;

/// Answer for an empty or unintelligible transcript
pub const EMPTY_QUERY_MESSAGE: &str =
    "I didn't catch that. Could you please repeat your question?";

/// Answer for the help command
pub const HELP_MESSAGE: &str = "You can ask me anything about the document you've uploaded. \
     Try asking specific questions about the content.";

const HELP_TRIGGER: &str = "help";
const SUMMARY_TRIGGER: &str = "what is this document about";

/// Where an answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Previously computed answer for the same raw query
    Cached,
    /// Built-in help or summary command
    Command,
    /// Structured knowledge base
    Structured,
    /// Free-text document search
    Document,
    /// Input rejected before resolution
    Input,
}

/// A resolved answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub answer: String,
    pub source: AnswerSource,
}

/// Raw query to answer memo
///
/// Unbounded; only cleared when the document is reloaded.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<String, String>,
}

impl QueryCache {
    /// Look up a raw query, exact and case-sensitive
    #[must_use]
    pub fn get(&self, query: &str) -> Option<&str> {
        self.entries.get(query).map(String::as_str)
    }

    pub fn insert(&mut self, query: impl Into<String>, answer: impl Into<String>) {
        self.entries.insert(query.into(), answer.into());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves raw queries to spoken answers
///
/// Owns the per-session query cache and document model. The knowledge base is
/// shared and immutable.
#[derive(Debug, Default)]
pub struct QueryResolver {
    knowledge: Option<Arc<KnowledgeBase>>,
    matcher: StructuredMatcher,
    document: DocumentModel,
    cache: QueryCache,
}

impl QueryResolver {
    /// Create a resolver over an optional knowledge base and a document
    #[must_use]
    pub fn new(
        knowledge: Option<Arc<KnowledgeBase>>,
        matcher: StructuredMatcher,
        document: DocumentModel,
    ) -> Self {
        Self {
            knowledge,
            matcher,
            document,
            cache: QueryCache::default(),
        }
    }

    /// Resolve a raw query
    ///
    /// Never fails: misses and bad input produce a fixed message instead.
    pub fn resolve(&mut self, raw: &str) -> Resolution {
        if raw.trim().is_empty() {
            return Resolution {
                answer: EMPTY_QUERY_MESSAGE.to_string(),
                source: AnswerSource::Input,
            };
        }

        if let Some(answer) = self.cache.get(raw) {
            tracing::debug!(query = raw, "answer served from cache");
            return Resolution {
                answer: answer.to_string(),
                source: AnswerSource::Cached,
            };
        }

        let resolution = self.compute(raw);
        self.cache.insert(raw, resolution.answer.clone());
        resolution
    }

    fn compute(&self, raw: &str) -> Resolution {
        if let Some(answer) = self.command(raw) {
            return Resolution {
                answer,
                source: AnswerSource::Command,
            };
        }

        if let Some(kb) = &self.knowledge {
            let cleaned = normalize(raw);
            if let Some(hit) = self.matcher.find(&cleaned, kb) {
                return Resolution {
                    answer: hit.answer.to_string(),
                    source: AnswerSource::Structured,
                };
            }
        }

        Resolution {
            answer: search(raw, &self.document).text,
            source: AnswerSource::Document,
        }
    }

    fn command(&self, raw: &str) -> Option<String> {
        let lower = raw.to_lowercase();

        if lower.contains(HELP_TRIGGER) {
            return Some(HELP_MESSAGE.to_string());
        }

        if lower.contains(SUMMARY_TRIGGER) {
            return Some(self.summary());
        }

        None
    }

    fn summary(&self) -> String {
        let title = self.document.title();
        match self.document.sections().first() {
            Some(section) => format!(
                "This document is titled \"{title}\" and covers {}.",
                section.title
            ),
            None => format!("This document is titled \"{title}\"."),
        }
    }

    /// Replace the document and invalidate every cached answer
    pub fn load_document(&mut self, title: impl Into<String>, content: impl Into<String>) {
        self.document = DocumentModel::new(title, content);
        self.cache.clear();
        tracing::info!(
            title = self.document.title(),
            sections = self.document.sections().len(),
            "document reloaded, query cache cleared"
        );
    }

    /// Currently loaded document
    #[must_use]
    pub const fn document(&self) -> &DocumentModel {
        &self.document
    }

    /// Structured knowledge base, if one is loaded
    #[must_use]
    pub fn knowledge(&self) -> Option<&Arc<KnowledgeBase>> {
        self.knowledge.as_ref()
    }

    /// Number of cached answers
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(content: &str) -> QueryResolver {
        let kb = KnowledgeBase::from_json(
            r#"{ "categories": { "greetings": { "title": "Greetings",
                "questions": { "hello": "Hello there!" } } } }"#,
        )
        .unwrap();
        QueryResolver::new(
            Some(Arc::new(kb)),
            StructuredMatcher::default(),
            DocumentModel::new("Field Notes", content),
        )
    }

    #[test]
    fn test_structured_before_document() {
        let mut r = resolver("Hello is a word in this text.");
        let res = r.resolve("Hello!");
        assert_eq!(res.answer, "Hello there!");
        assert_eq!(res.source, AnswerSource::Structured);
    }

    #[test]
    fn test_document_search_without_structured_hit() {
        let mut r = resolver("Alpha runs fast. Beta is slow.");
        let res = r.resolve("alpha");
        assert_eq!(res.answer, "Alpha runs fast");
        assert_eq!(res.source, AnswerSource::Document);
    }

    #[test]
    fn test_second_call_is_cached() {
        let mut r = resolver("Alpha runs fast. Beta is slow.");
        let first = r.resolve("alpha");
        let second = r.resolve("alpha");
        assert_eq!(second.source, AnswerSource::Cached);
        assert_eq!(first.answer, second.answer);

        // cache key is the raw, case-sensitive query
        assert_eq!(r.resolve("Alpha").source, AnswerSource::Document);
        assert_eq!(r.cache_len(), 2);
    }

    #[test]
    fn test_reload_clears_cache() {
        let mut r = resolver("Alpha runs fast. Beta is slow.");
        assert_eq!(r.resolve("alpha").answer, "Alpha runs fast");

        r.load_document("Other", "Alpha sleeps all day.");
        assert_eq!(r.cache_len(), 0);

        let res = r.resolve("alpha");
        assert_eq!(res.source, AnswerSource::Document);
        assert_eq!(res.answer, "Alpha sleeps all day");
    }

    #[test]
    fn test_help_command() {
        let mut r = resolver("Alpha runs fast.");
        let res = r.resolve("Can you HELP me");
        assert_eq!(res.answer, HELP_MESSAGE);
        assert_eq!(res.source, AnswerSource::Command);
        assert_eq!(r.resolve("Can you HELP me").source, AnswerSource::Cached);
    }

    #[test]
    fn test_summary_command() {
        let mut r = resolver("Robots are coming. Slowly.\n\nSecond part.");
        let res = r.resolve("So what is this document about?");
        assert_eq!(
            res.answer,
            "This document is titled \"Field Notes\" and covers Robots are coming."
        );
    }

    #[test]
    fn test_summary_without_sections() {
        let mut r = resolver("");
        let res = r.resolve("what is this document about");
        assert_eq!(res.answer, "This document is titled \"Field Notes\".");
    }

    #[test]
    fn test_empty_query_not_cached() {
        let mut r = resolver("Alpha.");
        let res = r.resolve("   ");
        assert_eq!(res.source, AnswerSource::Input);
        assert_eq!(res.answer, EMPTY_QUERY_MESSAGE);
        assert_eq!(r.cache_len(), 0);
    }

    #[test]
    fn test_without_knowledge_base() {
        let mut r = QueryResolver::new(
            None,
            StructuredMatcher::default(),
            DocumentModel::new("Doc", "Hello world here."),
        );
        let res = r.resolve("hello");
        assert_eq!(res.source, AnswerSource::Document);
        assert_eq!(res.answer, "Hello world here");
    }
}
