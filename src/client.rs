//! HTTP client for the docent gateway
//!
//! Used by the CLI session: fetches the client configuration, knowledge base
//! and document, and renders speech through the gateway's synthesis proxy.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::api::ApiResponse;
use crate::api::config::ClientConfig;
use crate::api::documents::DocumentBody;
use crate::query::{KnowledgeBase, KnowledgeBaseFile};
use crate::voice::{RemoteSynthesizer, SynthesisRequest, SynthesizedSpeech};
use crate::{Error, Result};

/// Gateway API client
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

/// Successful synthesis payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisPayload {
    #[serde(default)]
    enhanced_text: Option<String>,
    audio_content: String,
}

impl GatewayClient {
    /// Create a new gateway client
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Gateway base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the client configuration
    ///
    /// # Errors
    ///
    /// Returns error if the gateway is unreachable or answers with a failure
    pub async fn fetch_config(&self) -> Result<ClientConfig> {
        self.get_envelope("/api/config").await
    }

    /// Fetch and validate the structured knowledge base for `document_id`
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the gateway has none, or
    /// [`Error::KnowledgeBase`] if it is malformed
    pub async fn fetch_knowledge_base(&self, document_id: &str) -> Result<KnowledgeBase> {
        let file: KnowledgeBaseFile = self
            .get_envelope(&format!("/api/documents/{document_id}_responses"))
            .await?;

        let kb = KnowledgeBase::from_file(file)?;
        tracing::info!(categories = kb.len(), "knowledge base fetched");
        Ok(kb)
    }

    /// Fetch a document and its text
    ///
    /// # Errors
    ///
    /// Returns error if the gateway is unreachable or the document is unknown
    pub async fn fetch_document(&self, document_id: &str) -> Result<DocumentBody> {
        self.get_envelope(&format!("/api/documents/{document_id}"))
            .await
    }

    async fn get_envelope<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(path.to_string()));
        }

        let body = response.text().await?;
        let envelope: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                Error::Serialization(e)
            } else {
                gateway_error(status, body.trim().to_string())
            }
        })?;

        match envelope.data {
            Some(data) if envelope.success && status.is_success() => Ok(data),
            _ => Err(gateway_error(status, envelope.message)),
        }
    }
}

#[async_trait]
impl RemoteSynthesizer for GatewayClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedSpeech> {
        let url = format!("{}/api/tts", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("audio/") && status.is_success() {
            let audio = response.bytes().await?;
            tracing::debug!(bytes = audio.len(), "raw audio from gateway");
            return Ok(SynthesizedSpeech {
                audio: audio.to_vec(),
                enhanced_text: None,
            });
        }

        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
                .map(|envelope| envelope.message)
                .unwrap_or_else(|_| body.trim().to_string());
            return Err(gateway_error(status, message));
        }

        if let Ok(payload) = serde_json::from_str::<SynthesisPayload>(&body) {
            let audio = base64::engine::general_purpose::STANDARD
                .decode(payload.audio_content.trim())
                .map_err(|e| Error::Tts(format!("invalid audio encoding: {e}")))?;

            return Ok(SynthesizedSpeech {
                audio,
                enhanced_text: payload.enhanced_text.filter(|t| !t.is_empty()),
            });
        }

        match serde_json::from_str::<ApiResponse<serde_json::Value>>(&body) {
            Ok(envelope) if !envelope.success => Err(gateway_error(status, envelope.message)),
            _ => Err(Error::Tts(format!(
                "unexpected synthesis response ({content_type})"
            ))),
        }
    }
}

fn gateway_error(status: StatusCode, message: String) -> Error {
    Error::Upstream {
        service: "gateway",
        status: status.as_u16(),
        message,
    }
}
