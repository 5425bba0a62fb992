//! Structured knowledge base
//!
//! The knowledge base is a curated `category -> questions` mapping loaded once
//! at startup. The JSON file shape is
//!
//! ```text
//! { "metadata": { "voiceId": "..." },
//!   "categories": { "<key>": { "title": "...", "content": "...",
//!                              "questions": { "<key>": "answer" },
//!                              "fallbacks": { "<key>": "answer" } } } }
//! ```
//!
//! Files are validated on load: a category without a title, an empty key, or
//! fallbacks declared outside the `general` category fail with
//! [`KnowledgeBaseError`] instead of surfacing later as missing lookups.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use indexmap::IndexMap;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::Result;

/// Category holding greeting answers
pub const GREETINGS_CATEGORY: &str = "greetings";

/// Category holding the fallback answers
pub const GENERAL_CATEGORY: &str = "general";

/// Fallback answer used when nothing else matched
pub const UNKNOWN_QUESTION_FALLBACK: &str = "unknown_question";

/// Validation failures for a knowledge base file
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KnowledgeBaseError {
    /// Category key is empty
    #[error("category key must not be empty")]
    EmptyCategoryKey,

    /// Category has no title
    #[error("category `{0}` has no title")]
    MissingTitle(String),

    /// Question key is empty
    #[error("category `{0}` contains an empty question key")]
    EmptyQuestionKey(String),

    /// Fallbacks only belong to the general category
    #[error("category `{0}` declares fallbacks, only `general` may")]
    UnexpectedFallbacks(String),
}

/// On-disk / wire representation of a knowledge base
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBaseFile {
    #[serde(default)]
    pub metadata: MetadataFile,

    #[serde(default)]
    pub categories: IndexMap<String, CategoryFile>,
}

/// Wire representation of the metadata block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataFile {
    #[serde(rename = "voiceId", default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

/// Wire representation of a category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, deserialize_with = "unique_keys")]
    pub questions: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallbacks: Option<IndexMap<String, String>>,
}

/// Knowledge base metadata
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Voice used for remote synthesis, overriding the configured default
    pub voice_id: Option<String>,
}

/// What kind of category this is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryKind {
    /// Ordinary topic category
    Topic,
    /// The distinguished general category and its fallback answers
    General { fallbacks: IndexMap<String, String> },
}

/// A validated category
#[derive(Debug, Clone)]
pub struct Category {
    pub title: String,
    pub content: Option<String>,
    questions: IndexMap<String, String>,
    pub kind: CategoryKind,
}

impl Category {
    /// Look up an answer by its exact question key
    #[must_use]
    pub fn question(&self, key: &str) -> Option<&str> {
        self.questions.get(key).map(String::as_str)
    }

    /// Iterate `(question key, answer)` pairs in authored order
    pub fn questions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.questions.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether the category has any questions
    #[must_use]
    pub fn has_questions(&self) -> bool {
        !self.questions.is_empty()
    }

    /// Answer of the first authored question
    #[must_use]
    pub fn first_answer(&self) -> Option<&str> {
        self.questions.values().next().map(String::as_str)
    }

    /// Look up a fallback answer (general category only)
    #[must_use]
    pub fn fallback(&self, key: &str) -> Option<&str> {
        match &self.kind {
            CategoryKind::General { fallbacks } => fallbacks.get(key).map(String::as_str),
            CategoryKind::Topic => None,
        }
    }
}

/// Validated, immutable knowledge base
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    metadata: Metadata,
    categories: IndexMap<String, Category>,
}

impl KnowledgeBase {
    /// Parse and validate a knowledge base from JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or fails validation
    pub fn from_json(json: &str) -> Result<Self> {
        let file: KnowledgeBaseFile = serde_json::from_str(json)?;
        Ok(Self::from_file(file)?)
    }

    /// Load a knowledge base from disk
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is malformed
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let kb = Self::from_json(&content)?;
        tracing::info!(
            path = %path.display(),
            categories = kb.categories.len(),
            "loaded knowledge base"
        );
        Ok(kb)
    }

    /// Validate the wire representation
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found
    pub fn from_file(file: KnowledgeBaseFile) -> std::result::Result<Self, KnowledgeBaseError> {
        let mut categories = IndexMap::with_capacity(file.categories.len());

        for (key, raw) in file.categories {
            if key.trim().is_empty() {
                return Err(KnowledgeBaseError::EmptyCategoryKey);
            }

            let title = raw
                .title
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| KnowledgeBaseError::MissingTitle(key.clone()))?;

            if raw.questions.keys().any(|q| q.trim().is_empty()) {
                return Err(KnowledgeBaseError::EmptyQuestionKey(key));
            }

            let kind = match raw.fallbacks {
                Some(fallbacks) if key == GENERAL_CATEGORY => CategoryKind::General { fallbacks },
                Some(_) => return Err(KnowledgeBaseError::UnexpectedFallbacks(key)),
                None if key == GENERAL_CATEGORY => CategoryKind::General {
                    fallbacks: IndexMap::new(),
                },
                None => CategoryKind::Topic,
            };

            categories.insert(
                key,
                Category {
                    title,
                    content: raw.content,
                    questions: raw.questions,
                    kind,
                },
            );
        }

        Ok(Self {
            metadata: Metadata {
                voice_id: file.metadata.voice_id.filter(|v| !v.is_empty()),
            },
            categories,
        })
    }

    /// Convert back to the wire representation
    #[must_use]
    pub fn to_file(&self) -> KnowledgeBaseFile {
        let categories = self
            .categories
            .iter()
            .map(|(key, category)| {
                let fallbacks = match &category.kind {
                    CategoryKind::General { fallbacks } => Some(fallbacks.clone()),
                    CategoryKind::Topic => None,
                };
                (
                    key.clone(),
                    CategoryFile {
                        title: Some(category.title.clone()),
                        content: category.content.clone(),
                        questions: category.questions.clone(),
                        fallbacks,
                    },
                )
            })
            .collect();

        KnowledgeBaseFile {
            metadata: MetadataFile {
                voice_id: self.metadata.voice_id.clone(),
            },
            categories,
        }
    }

    /// Voice override from the metadata block
    #[must_use]
    pub fn voice_id(&self) -> Option<&str> {
        self.metadata.voice_id.as_deref()
    }

    /// Look up a category by key
    #[must_use]
    pub fn category(&self, key: &str) -> Option<&Category> {
        self.categories.get(key)
    }

    /// Iterate categories in authored order
    pub fn categories(&self) -> impl Iterator<Item = (&str, &Category)> {
        self.categories.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of categories
    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Whether the knowledge base has no categories
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Deserialize a string map, rejecting repeated keys
fn unique_keys<'de, D>(deserializer: D) -> std::result::Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct UniqueKeys(PhantomData<IndexMap<String, String>>);

    impl<'de> Visitor<'de> for UniqueKeys {
        type Value = IndexMap<String, String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of question keys to answer strings")
        }

        fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut map = IndexMap::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, value)) = access.next_entry::<String, String>()? {
                if map.contains_key(&key) {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate question key `{key}`"
                    )));
                }
                map.insert(key, value);
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(UniqueKeys(PhantomData))
}
