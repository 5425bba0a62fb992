//! Server-side speech synthesis proxy
//!
//! Keeps provider credentials on the server. Requests are processed one at a
//! time in arrival order by a single worker, with a short pause between
//! upstream calls.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::enhance::Enhancer;
use super::tts::{TextToSpeech, VoiceSettings};
use crate::Error;

/// Longest text forwarded to the synthesizer
pub const DEFAULT_MAX_CHARS: usize = 5000;

/// Pause between consecutive upstream requests
pub const DEFAULT_QUEUE_DELAY: Duration = Duration::from_millis(100);

/// Incoming synthesis request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default, rename = "model_id")]
    pub model_id: Option<String>,
    #[serde(default, rename = "voice_settings")]
    pub voice_settings: Option<VoiceSettings>,
    /// User query the answer responds to
    #[serde(default)]
    pub context: Option<String>,
}

/// Successful synthesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyReply {
    pub enhanced_text: String,
    /// Base64 encoded MP3
    pub audio_content: String,
}

/// Why a proxy request failed
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProxyError {
    #[error("Invalid or missing text parameter")]
    InvalidText,

    #[error("Voice ID is required")]
    MissingVoice,

    #[error("Text-to-speech is not configured")]
    NotConfigured,

    /// Upstream rejected the request; its status is passed through
    #[error("ElevenLabs API error: {message}")]
    Upstream { status: u16, message: String },

    #[error("Error processing text-to-speech request: {0}")]
    Internal(String),

    #[error("speech proxy is not running")]
    Stopped,
}

impl ProxyError {
    /// HTTP status code reported to the caller
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::InvalidText | Self::MissingVoice => 400,
            Self::NotConfigured | Self::Stopped => 503,
            Self::Upstream { status, .. } => *status,
            Self::Internal(_) => 500,
        }
    }

    /// Rejected before any upstream call was made
    const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidText | Self::MissingVoice | Self::NotConfigured
        )
    }
}

impl From<Error> for ProxyError {
    fn from(err: Error) -> Self {
        match err {
            Error::Upstream {
                status, message, ..
            } => Self::Upstream { status, message },
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Voice used when a request names none
    pub default_voice_id: Option<String>,
    pub max_chars: usize,
    pub queue_delay: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            default_voice_id: None,
            max_chars: DEFAULT_MAX_CHARS,
            queue_delay: DEFAULT_QUEUE_DELAY,
        }
    }
}

type Reply = std::result::Result<ProxyReply, ProxyError>;

struct Job {
    request: ProxyRequest,
    reply: oneshot::Sender<Reply>,
}

/// Handle to the proxy worker
#[derive(Clone)]
pub struct SpeechProxy {
    jobs: mpsc::UnboundedSender<Job>,
}

impl SpeechProxy {
    /// Spawn the worker
    ///
    /// Without a TTS client every valid request fails with
    /// [`ProxyError::NotConfigured`]; without an enhancer text is spoken as is.
    #[must_use]
    pub fn spawn(
        tts: Option<Arc<TextToSpeech>>,
        enhancer: Option<Arc<Enhancer>>,
        config: ProxyConfig,
    ) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();

        let worker = Worker {
            tts,
            enhancer,
            config,
        };
        tokio::spawn(worker.run(rx));

        Self { jobs }
    }

    /// Queue a request and wait for its turn and result
    ///
    /// # Errors
    ///
    /// Returns the [`ProxyError`] describing why synthesis failed
    pub async fn submit(&self, request: ProxyRequest) -> Reply {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(Job { request, reply })
            .map_err(|_| ProxyError::Stopped)?;
        rx.await.map_err(|_| ProxyError::Stopped)?
    }
}

struct Worker {
    tts: Option<Arc<TextToSpeech>>,
    enhancer: Option<Arc<Enhancer>>,
    config: ProxyConfig,
}

impl Worker {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = jobs.recv().await {
            tracing::debug!(waiting = jobs.len(), "processing speech request");

            let result = self.process(job.request).await;
            let called_upstream = !matches!(&result, Err(e) if e.is_rejection());

            if job.reply.send(result).is_err() {
                tracing::debug!("speech requester went away");
            }

            if called_upstream {
                tokio::time::sleep(self.config.queue_delay).await;
            }
        }
    }

    async fn process(&self, request: ProxyRequest) -> Reply {
        let text = request
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProxyError::InvalidText)?;

        let text = truncate_chars(text, self.config.max_chars);

        let voice_id = request
            .voice_id
            .filter(|v| !v.is_empty())
            .or_else(|| self.config.default_voice_id.clone())
            .ok_or(ProxyError::MissingVoice)?;

        let tts = self.tts.as_ref().ok_or(ProxyError::NotConfigured)?;

        tracing::info!(voice_id = %voice_id, chars = text.chars().count(), "TTS request");

        let enhanced_text = match &self.enhancer {
            Some(enhancer) => enhancer.enhance(&text, request.context.as_deref()).await,
            None => text,
        };

        let audio = tts
            .synthesize(
                &enhanced_text,
                &voice_id,
                request.model_id.as_deref(),
                request.voice_settings,
            )
            .await
            .inspect_err(|e| tracing::error!(error = %e, "speech synthesis failed"))?;

        Ok(ProxyReply {
            enhanced_text,
            audio_content: base64::engine::general_purpose::STANDARD.encode(audio),
        })
    }
}

fn truncate_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo".to_string(), 2), "hé");
        assert_eq!(truncate_chars("short".to_string(), 10), "short");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ProxyError::InvalidText.status(), 400);
        assert_eq!(ProxyError::MissingVoice.status(), 400);
        assert_eq!(
            ProxyError::Upstream {
                status: 401,
                message: "bad key".to_string()
            }
            .status(),
            401
        );
        assert_eq!(ProxyError::Internal("x".to_string()).status(), 500);
    }

    #[test]
    fn test_upstream_error_passthrough() {
        let err = ProxyError::from(Error::Upstream {
            service: "elevenlabs",
            status: 429,
            message: "Too many requests".to_string(),
        });
        assert_eq!(err.status(), 429);
        assert_eq!(err.to_string(), "ElevenLabs API error: Too many requests");
    }

    #[tokio::test]
    async fn test_validation_order() {
        let proxy = SpeechProxy::spawn(None, None, ProxyConfig::default());

        let err = proxy
            .submit(ProxyRequest {
                text: Some("   ".to_string()),
                ..ProxyRequest::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, ProxyError::InvalidText);

        let err = proxy
            .submit(ProxyRequest {
                text: Some("hello".to_string()),
                ..ProxyRequest::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, ProxyError::MissingVoice);

        let err = proxy
            .submit(ProxyRequest {
                text: Some("hello".to_string()),
                voice_id: Some("v1".to_string()),
                ..ProxyRequest::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, ProxyError::NotConfigured);
    }

    #[test]
    fn test_request_wire_names() {
        let request: ProxyRequest = serde_json::from_str(
            r#"{"text":"hi","voiceId":"v","model_id":"m","voice_settings":
                {"stability":0.1,"similarity_boost":0.2},"context":"q"}"#,
        )
        .unwrap();
        assert_eq!(request.voice_id.as_deref(), Some("v"));
        assert_eq!(request.model_id.as_deref(), Some("m"));
        assert!(request.voice_settings.is_some());
    }
}
