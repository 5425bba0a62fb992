//! Docent Gateway - voice question answering over a single document
//!
//! This library provides the pieces of a spoken Q&A assistant:
//! - Query resolution against a structured knowledge base and free text
//! - A voice sequencer with remote synthesis and local fallback
//! - An HTTP gateway that serves documents and proxies speech synthesis
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Client session                      │
//! │   Transcript  │  Query Resolver  │  Sequencer        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ HTTP
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Docent Gateway                       │
//! │   Documents  │  Knowledge base  │  TTS proxy         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │        ElevenLabs (speech)  │  OpenAI (phrasing)     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod assistant;
pub mod client;
pub mod config;
pub mod content;
pub mod error;
pub mod query;
pub mod voice;

pub use assistant::{Assistant, session_voice_id};
pub use client::GatewayClient;
pub use config::Config;
pub use error::{Error, Result};
pub use query::{KnowledgeBase, QueryResolver, Resolution};
