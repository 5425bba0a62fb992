//! Text-to-speech proxy endpoint

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};

use super::{ApiError, ApiState};
use crate::voice::{ProxyError, ProxyReply, ProxyRequest};

/// Build voice router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/tts", post(synthesize))
        .with_state(state)
}

/// Synthesize text to speech
///
/// Returns `{ enhancedText, audioContent }` with base64 MP3 audio. Requests are
/// served one at a time in arrival order.
async fn synthesize(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<ProxyRequest>, JsonRejection>,
) -> Result<Json<ProxyReply>, VoiceError> {
    let Json(request) = payload.map_err(|e| {
        tracing::debug!(error = %e, "rejected TTS payload");
        VoiceError(ProxyError::InvalidText)
    })?;

    let reply = state.proxy.submit(request).await.map_err(VoiceError)?;
    Ok(Json(reply))
}

/// Proxy failure rendered as a failed envelope
#[derive(Debug)]
pub struct VoiceError(pub ProxyError);

impl IntoResponse for VoiceError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "TTS request failed");
        }

        ApiError::Status(status, self.0.to_string()).into_response()
    }
}
