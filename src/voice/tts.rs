//! Text-to-speech (TTS) via ElevenLabs

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// ElevenLabs API root
pub const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io/v1";

/// Model used when none is configured
pub const DEFAULT_TTS_MODEL: &str = "eleven_monolingual_v1";

/// Voice rendering settings sent with every request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    settings: VoiceSettings,
    base_url: String,
}

impl TextToSpeech {
    /// Create a new ElevenLabs TTS client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, model: String, settings: VoiceSettings) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            settings,
            base_url: ELEVENLABS_API_URL.to_string(),
        })
    }

    /// Point the client at a different API root
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Synthesize text to speech
    ///
    /// `model_id` and `settings` override the configured defaults.
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upstream`] carrying the upstream status and detail
    /// message on a non-success response, [`Error::Tts`] if the response is
    /// not audio or is empty
    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        model_id: Option<&str>,
        settings: Option<VoiceSettings>,
    ) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
            voice_settings: VoiceSettings,
        }

        let url = format!("{}/text-to-speech/{voice_id}", self.base_url);

        let request = ElevenLabsRequest {
            text,
            model_id: model_id.unwrap_or(&self.model),
            voice_settings: settings.unwrap_or(self.settings),
        };

        tracing::debug!(voice_id, chars = text.len(), model = request.model_id, "requesting speech");

        let response = self
            .client
            .post(&url)
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                service: "elevenlabs",
                status: status.as_u16(),
                message: upstream_message(&body),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !content_type.contains("audio") {
            return Err(Error::Tts(format!(
                "unexpected content type from ElevenLabs: {content_type}"
            )));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(Error::Tts("received empty audio from ElevenLabs".to_string()));
        }

        tracing::debug!(bytes = audio.len(), "speech received");
        Ok(audio.to_vec())
    }
}

/// Extract `detail.message` (or `detail`) from an error body, else the raw body
fn upstream_message(body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let detail = v.get("detail")?;
            detail
                .get("message")
                .and_then(serde_json::Value::as_str)
                .or_else(|| detail.as_str())
                .map(ToString::to_string)
        });

    detail.unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_rejected() {
        let result = TextToSpeech::new(
            SecretString::from(String::new()),
            DEFAULT_TTS_MODEL.to_string(),
            VoiceSettings::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_upstream_message() {
        assert_eq!(
            upstream_message(r#"{"detail":{"status":"quota","message":"Quota exceeded"}}"#),
            "Quota exceeded"
        );
        assert_eq!(upstream_message(r#"{"detail":"Bad voice"}"#), "Bad voice");
        assert_eq!(upstream_message("  gateway timeout "), "gateway timeout");
    }

    #[test]
    fn test_request_settings_shape() {
        let value = serde_json::to_value(VoiceSettings::default()).unwrap();
        assert_eq!(value["stability"], 0.5);
        assert_eq!(value["similarity_boost"], 0.75);
    }
}
