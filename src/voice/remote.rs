//! Remote speech synthesis collaborator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A request to render text as speech
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    /// Original user query, used upstream to rephrase the answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Rendered speech
#[derive(Debug, Clone, Default)]
pub struct SynthesizedSpeech {
    /// Encoded audio (MP3 from the gateway)
    pub audio: Vec<u8>,
    /// Rephrased text, when the service enhanced the answer
    pub enhanced_text: Option<String>,
}

/// Renders text into audio through an external service
#[async_trait]
pub trait RemoteSynthesizer: Send + Sync {
    /// Synthesize a request
    ///
    /// # Errors
    ///
    /// Returns error on network failure, non-success status or malformed payload
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedSpeech>;
}
