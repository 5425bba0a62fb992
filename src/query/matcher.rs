//! Structured response matching against the knowledge base
//!
//! Heuristics run in a fixed order and the first hit wins:
//! 1. topic redirect (e.g. "why is the voice changing")
//! 2. exact greeting
//! 3. self-introduction phrasing
//! 4. question key containment / similarity, then category title
//! 5. keyword overlap with question keys
//! 6. topic keyword table
//! 7. general fallback answer

use super::knowledge::{
    GENERAL_CATEGORY, GREETINGS_CATEGORY, KnowledgeBase, UNKNOWN_QUESTION_FALLBACK,
};

/// Default similarity a question key must exceed to match
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;

/// Queries answered from the greetings category
const GREETINGS: &[&str] = &["hi", "hello", "hey", "yo", "whats up"];

/// Greeting answered when the exact greeting key is missing
const CANONICAL_GREETING: &str = "hello";

/// Phrasings that ask the assistant to introduce itself
const SELF_INTRODUCTIONS: &[&str] = &[
    "about yourself",
    "about you",
    "who are you",
    "tell me about you",
];

/// Greeting key answering self-introduction queries
const SELF_INTRODUCTION_KEY: &str = "who_are_you";

/// Minimum length (exclusive) of words used for keyword overlap
const MIN_KEYWORD_CHARS: usize = 3;

/// Redirect a subject mentioned with a trigger word to a designated category
#[derive(Debug, Clone)]
pub struct TopicRedirect {
    /// Word that must appear in the query
    pub subject: String,
    /// At least one of these must appear alongside the subject
    pub triggers: Vec<String>,
    /// Category searched for an answer
    pub category: String,
    /// Question keys containing any of these substrings are answered
    pub topics: Vec<String>,
}

/// Tunable matcher rules
#[derive(Debug, Clone)]
pub struct MatcherRules {
    /// Similarity (exclusive) above which a question key matches
    pub similarity_threshold: f64,
    /// Optional subject redirect checked before anything else
    pub redirect: Option<TopicRedirect>,
    /// Ordered `category -> keywords` table used as a late fallback
    pub topic_keywords: Vec<(String, Vec<String>)>,
}

impl Default for MatcherRules {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            redirect: Some(TopicRedirect {
                subject: "voice".to_string(),
                triggers: owned(&["change", "changing", "different", "switch"]),
                category: "ai_adoption".to_string(),
                topics: owned(&["hardware", "ai"]),
            }),
            topic_keywords: vec![
                (
                    "ai_adoption".to_string(),
                    owned(&["ai", "artificial intelligence", "adoption", "hardware", "voice", "robot"]),
                ),
                (
                    "ar_vr".to_string(),
                    owned(&["ar", "vr", "augmented", "virtual", "reality", "metaverse"]),
                ),
                (
                    "future_society".to_string(),
                    owned(&["future", "society", "individual", "automation", "people"]),
                ),
                (
                    "mentorship".to_string(),
                    owned(&["mentor", "coaching", "project", "help", "learning"]),
                ),
                ("personal".to_string(), owned(&["feel", "excited", "optimistic"])),
            ],
        }
    }
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(ToString::to_string).collect()
}

/// Which heuristic produced a structured answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    TopicRedirect,
    Greeting,
    SelfIntroduction,
    Question,
    CategoryTitle,
    KeywordOverlap,
    TopicKeywords,
    GeneralFallback,
}

/// A structured answer and the rule that found it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuredMatch<'a> {
    pub answer: &'a str,
    pub rule: MatchRule,
}

/// Resolves cleaned queries against a [`KnowledgeBase`]
#[derive(Debug, Clone, Default)]
pub struct StructuredMatcher {
    rules: MatcherRules,
}

impl StructuredMatcher {
    /// Create a matcher with the given rules
    #[must_use]
    pub const fn new(rules: MatcherRules) -> Self {
        Self { rules }
    }

    /// Rules in effect
    #[must_use]
    pub const fn rules(&self) -> &MatcherRules {
        &self.rules
    }

    /// Find a structured answer for an already normalized query
    ///
    /// Returns `None` when no heuristic applies; missing `greetings` or
    /// `general` categories simply disable the heuristics that need them.
    #[must_use]
    pub fn find<'a>(&self, cleaned: &str, kb: &'a KnowledgeBase) -> Option<StructuredMatch<'a>> {
        if cleaned.is_empty() {
            return None;
        }

        let found = self
            .topic_redirect(cleaned, kb)
            .map(|a| (a, MatchRule::TopicRedirect))
            .or_else(|| greeting(cleaned, kb).map(|a| (a, MatchRule::Greeting)))
            .or_else(|| self_introduction(cleaned, kb).map(|a| (a, MatchRule::SelfIntroduction)))
            .or_else(|| self.question_scan(cleaned, kb))
            .or_else(|| keyword_overlap(cleaned, kb).map(|a| (a, MatchRule::KeywordOverlap)))
            .or_else(|| self.topic_keywords(cleaned, kb).map(|a| (a, MatchRule::TopicKeywords)))
            .or_else(|| general_fallback(kb).map(|a| (a, MatchRule::GeneralFallback)));

        match found {
            Some((answer, rule)) => {
                tracing::debug!(query = cleaned, ?rule, "structured match");
                Some(StructuredMatch { answer, rule })
            }
            None => {
                tracing::debug!(query = cleaned, "no structured match");
                None
            }
        }
    }

    fn topic_redirect<'a>(&self, query: &str, kb: &'a KnowledgeBase) -> Option<&'a str> {
        let redirect = self.rules.redirect.as_ref()?;

        let triggered = query.contains(redirect.subject.as_str())
            && redirect.triggers.iter().any(|t| query.contains(t.as_str()));
        if !triggered {
            return None;
        }

        let category = kb.category(&redirect.category)?;
        category
            .questions()
            .find(|(key, _)| redirect.topics.iter().any(|t| key.contains(t.as_str())))
            .map(|(_, answer)| answer)
            .or(category.content.as_deref())
    }

    fn question_scan<'a>(&self, query: &str, kb: &'a KnowledgeBase) -> Option<(&'a str, MatchRule)> {
        for (_, category) in kb.categories() {
            for (key, answer) in category.questions() {
                let clean_key = question_phrase(key);

                if query.contains(clean_key.as_str())
                    || clean_key.contains(query)
                    || similarity(query, &clean_key) > self.rules.similarity_threshold
                {
                    return Some((answer, MatchRule::Question));
                }
            }

            if query.contains(category.title.to_lowercase().as_str()) {
                if let Some(content) = category.content.as_deref() {
                    return Some((content, MatchRule::CategoryTitle));
                }
            }
        }

        None
    }

    fn topic_keywords<'a>(&self, query: &str, kb: &'a KnowledgeBase) -> Option<&'a str> {
        self.rules
            .topic_keywords
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| query.contains(k.as_str())))
            .find_map(|(key, _)| {
                let category = kb.category(key)?;
                category.content.as_deref().or_else(|| category.first_answer())
            })
    }
}

/// Score word overlap between two space-separated phrases
///
/// Counts words of `a` longer than three characters that also appear as whole
/// words in `b`, divided by the larger word count.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity(a: &str, b: &str) -> f64 {
    let words_a: Vec<&str> = a.split(' ').collect();
    let words_b: Vec<&str> = b.split(' ').collect();

    let matches = words_a
        .iter()
        .filter(|w| w.chars().count() > MIN_KEYWORD_CHARS && words_b.contains(w))
        .count();

    matches as f64 / words_a.len().max(words_b.len()) as f64
}

/// Question keys are authored as `snake_case` phrases
fn question_phrase(key: &str) -> String {
    key.to_lowercase().replace('_', " ")
}

fn greeting<'a>(query: &str, kb: &'a KnowledgeBase) -> Option<&'a str> {
    if !GREETINGS.contains(&query) {
        return None;
    }

    let Some(greetings) = kb.category(GREETINGS_CATEGORY) else {
        tracing::warn!("greeting received but knowledge base has no greetings category");
        return None;
    };

    let key = query.replace(' ', "_");
    greetings
        .question(&key)
        .or_else(|| greetings.question(CANONICAL_GREETING))
        .or_else(|| greetings.first_answer())
}

fn self_introduction<'a>(query: &str, kb: &'a KnowledgeBase) -> Option<&'a str> {
    if !SELF_INTRODUCTIONS.iter().any(|p| query.contains(p)) {
        return None;
    }

    kb.category(GREETINGS_CATEGORY)?
        .question(SELF_INTRODUCTION_KEY)
}

fn keyword_overlap<'a>(query: &str, kb: &'a KnowledgeBase) -> Option<&'a str> {
    let words: Vec<&str> = query
        .split(' ')
        .filter(|w| w.chars().count() > MIN_KEYWORD_CHARS)
        .collect();

    if words.is_empty() {
        return None;
    }

    kb.categories().find_map(|(_, category)| {
        let mut best: Option<(&str, usize)> = None;

        for (key, answer) in category.questions() {
            let clean_key = question_phrase(key);
            let score = words.iter().filter(|w| clean_key.contains(**w)).count();

            if score > 0 && best.is_none_or(|(_, s)| score > s) {
                best = Some((answer, score));
            }
        }

        best.map(|(answer, _)| answer)
    })
}

fn general_fallback(kb: &KnowledgeBase) -> Option<&str> {
    kb.category(GENERAL_CATEGORY)?
        .fallback(UNKNOWN_QUESTION_FALLBACK)
}
