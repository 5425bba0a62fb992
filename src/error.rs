//! Error types for the Docent gateway

use thiserror::Error;

use crate::query::KnowledgeBaseError;

/// Result type alias for Docent operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Docent gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Knowledge base failed validation
    #[error("malformed knowledge base: {0}")]
    KnowledgeBase(#[from] KnowledgeBaseError),

    /// Document could not be loaded or extracted
    #[error("document error: {0}")]
    Document(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// An upstream service answered with a non-success status
    #[error("{service} error ({status}): {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// LLM enhancement error
    #[error("enhancement error: {0}")]
    Enhancement(String),

    /// Audio playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// Local speech synthesis error
    #[error("speech error: {0}")]
    Speech(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
