//! Client configuration endpoints
//!
//! Provider keys stay on the server; clients only learn which features work.

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, ApiState};

/// Build config router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/config", get(client_config))
        .route("/api/voice", get(voice_info))
        .with_state(state)
}

/// Features available to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub elevenlabs_voice_id: String,
    pub tts_enabled: bool,
    pub openai_enabled: bool,
}

/// Voice and rendering settings in ElevenLabs form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceInfo {
    pub voice_id: String,
    pub settings: VoiceInfoSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfoSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

async fn client_config(State(state): State<Arc<ApiState>>) -> Json<ApiResponse<ClientConfig>> {
    Json(ApiResponse::ok(ClientConfig {
        elevenlabs_voice_id: state.voice_id.clone(),
        tts_enabled: state.tts_enabled,
        openai_enabled: state.openai_enabled,
    }))
}

async fn voice_info(State(state): State<Arc<ApiState>>) -> Json<ApiResponse<VoiceInfo>> {
    Json(ApiResponse::ok(VoiceInfo {
        voice_id: state.voice_id.clone(),
        settings: VoiceInfoSettings {
            stability: state.voice_settings.stability,
            similarity_boost: state.voice_settings.similarity_boost,
            style: 0.0,
            use_speaker_boost: true,
        },
    }))
}
