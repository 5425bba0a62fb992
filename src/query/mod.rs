//! Query resolution: normalization, structured matching and document search

pub mod document;
pub mod knowledge;
pub mod matcher;
pub mod normalize;
pub mod resolver;
pub mod search;

pub use document::{DocumentModel, Section};
pub use knowledge::{Category, CategoryKind, KnowledgeBase, KnowledgeBaseError, KnowledgeBaseFile};
pub use matcher::{MatchRule, MatcherRules, StructuredMatch, StructuredMatcher, similarity};
pub use normalize::{correct_transcript, normalize};
pub use resolver::{AnswerSource, QueryCache, QueryResolver, Resolution};
pub use search::{SearchAnswer, SearchOutcome, search};
