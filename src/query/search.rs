//! Free-text search over the unstructured document
//!
//! Used when the structured matcher has nothing. Sentences are scored by
//! keyword hits and at most three are combined into a spoken answer.

use std::collections::HashSet;

use super::document::{DocumentModel, split_sentences};

/// Answer when no document text is loaded
pub const NO_DOCUMENT_MESSAGE: &str = "I don't have any information available. \
     Please make sure the document is properly loaded.";

/// Answer when the query has no usable keywords
pub const ASK_SPECIFIC_MESSAGE: &str = "I can only answer questions based on the document \
     content. Please ask a specific question about it.";

/// Answer when no keyword occurs anywhere in the document
pub const NOT_COVERED_MESSAGE: &str = "I don't have information about that topic in the \
     document. I can only answer questions based on the specific content in the document.";

/// Answer when no sentence scored
pub const NOT_FOUND_MESSAGE: &str = "I couldn't find specific information about that in the \
     document. I can only provide answers based on what's explicitly mentioned in the document.";

/// Words ignored when extracting keywords
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "to", "of", "and", "in", "that", "have",
    "it", "for", "on", "with", "you", "your", "me", "my", "i", "we", "our", "us", "they",
    "their", "them",
];

/// Keywords must be longer than this many characters
const MIN_KEYWORD_CHARS: usize = 2;

/// Exact-phrase search only runs for queries longer than this
const MIN_PHRASE_CHARS: usize = 10;

/// Score assigned to an exact-phrase hit
const PHRASE_SCORE: u32 = 100;

/// Score per keyword found in a sentence
const KEYWORD_SCORE: u32 = 10;

/// Bonus per distinct keyword when two or more match
const DISTINCT_KEYWORD_BONUS: u32 = 5;

/// Bonus for short sentences that matched anything
const SHORT_SENTENCE_BONUS: u32 = 5;

/// Sentences shorter than this get the short-sentence bonus
const SHORT_SENTENCE_CHARS: usize = 100;

/// Leading characters used when a phrase hit spans sentences
const PHRASE_PREVIEW_CHARS: usize = 150;

/// Number of sentences combined into an answer
const MAX_RESULTS: usize = 3;

/// Top score must exceed the runner-up by this factor to stand alone
const DOMINANCE_RATIO: f64 = 1.5;

/// How a search answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    NoDocument,
    NoKeywords,
    NotCovered,
    Phrase,
    Keywords,
    NotFound,
}

/// Spoken answer produced by [`search`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchAnswer {
    pub text: String,
    pub outcome: SearchOutcome,
}

impl SearchAnswer {
    fn fixed(text: &str, outcome: SearchOutcome) -> Self {
        Self {
            text: text.to_string(),
            outcome,
        }
    }
}

#[derive(Debug)]
struct ScoredSentence {
    sentence: String,
    score: u32,
}

/// Search the document for sentences answering `query`
///
/// Never fails: every miss produces one of the fixed explanatory messages.
#[must_use]
pub fn search(query: &str, document: &DocumentModel) -> SearchAnswer {
    if document.is_empty() {
        return SearchAnswer::fixed(NO_DOCUMENT_MESSAGE, SearchOutcome::NoDocument);
    }

    let query = query.to_lowercase();
    let keywords = extract_keywords(&query);

    if keywords.is_empty() {
        return SearchAnswer::fixed(ASK_SPECIFIC_MESSAGE, SearchOutcome::NoKeywords);
    }

    let content_lower = document.content().to_lowercase();
    if !keywords.iter().any(|k| content_lower.contains(k.as_str())) {
        tracing::debug!(?keywords, "no keyword occurs in the document");
        return SearchAnswer::fixed(NOT_COVERED_MESSAGE, SearchOutcome::NotCovered);
    }

    tracing::debug!(query = %query, ?keywords, "searching document");

    let mut outcome = SearchOutcome::Phrase;
    let mut matches = phrase_matches(&query, document);

    if matches.is_empty() {
        outcome = SearchOutcome::Keywords;
        matches = keyword_matches(&keywords, document);
    }

    match compose(&matches) {
        Some(text) => {
            tracing::debug!(
                results = matches.len(),
                best = matches.first().map(|m| m.score),
                "document search matched"
            );
            SearchAnswer { text, outcome }
        }
        None => SearchAnswer::fixed(NOT_FOUND_MESSAGE, SearchOutcome::NotFound),
    }
}

/// Lowercased query words that are neither stop words nor too short
fn extract_keywords(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.chars().count() > MIN_KEYWORD_CHARS && !STOP_WORDS.contains(w))
        .map(ToString::to_string)
        .collect()
}

/// Sections containing the whole query verbatim
fn phrase_matches(query: &str, document: &DocumentModel) -> Vec<ScoredSentence> {
    if query.chars().count() <= MIN_PHRASE_CHARS {
        return Vec::new();
    }

    document
        .sections()
        .iter()
        .filter(|section| section.content.to_lowercase().contains(query))
        .map(|section| ScoredSentence {
            sentence: sentence_with_phrase(&section.content, query),
            score: PHRASE_SCORE,
        })
        .collect()
}

/// First sentence of `text` containing `phrase`, else a leading excerpt
fn sentence_with_phrase(text: &str, phrase: &str) -> String {
    split_sentences(text)
        .into_iter()
        .find(|s| s.to_lowercase().contains(phrase))
        .unwrap_or_else(|| {
            let preview: String = text.chars().take(PHRASE_PREVIEW_CHARS).collect();
            format!("{}...", preview.trim())
        })
}

/// Score every sentence and keep the best few
fn keyword_matches(keywords: &[String], document: &DocumentModel) -> Vec<ScoredSentence> {
    let mut scored: Vec<ScoredSentence> = document
        .sections()
        .iter()
        .flat_map(|section| section.sentences.iter())
        .filter_map(|sentence| {
            let score = score_sentence(sentence, keywords);
            (score > 0).then(|| ScoredSentence {
                sentence: sentence.clone(),
                score,
            })
        })
        .collect();

    // stable: equal scores keep document order
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(MAX_RESULTS);
    scored
}

#[allow(clippy::cast_possible_truncation)]
fn score_sentence(sentence: &str, keywords: &[String]) -> u32 {
    let text = sentence.to_lowercase();

    let hits: Vec<&str> = keywords
        .iter()
        .map(String::as_str)
        .filter(|k| text.contains(k))
        .collect();

    let mut score = KEYWORD_SCORE * hits.len() as u32;

    let distinct = hits.iter().collect::<HashSet<_>>().len() as u32;
    if distinct > 1 {
        score += distinct * DISTINCT_KEYWORD_BONUS;
    }

    if score > 0 && sentence.chars().count() < SHORT_SENTENCE_CHARS {
        score += SHORT_SENTENCE_BONUS;
    }

    score
}

/// Combine ranked sentences into one answer
fn compose(matches: &[ScoredSentence]) -> Option<String> {
    let top = matches.first()?;

    let dominant = matches
        .get(1)
        .is_none_or(|second| f64::from(top.score) > f64::from(second.score) * DOMINANCE_RATIO);

    if dominant {
        return Some(top.sentence.clone());
    }

    Some(
        matches
            .iter()
            .map(|m| m.sentence.as_str())
            .collect::<Vec<_>>()
            .join(". "),
    )
}
