//! Server-side question answering

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};
use serde::Deserialize;

use super::{ApiError, ApiResponse, ApiState};
use crate::query::Resolution;

/// Build ask router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/ask", post(ask))
        .with_state(state)
}

/// Question to answer
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub query: String,
}

async fn ask(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Resolution>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let resolution = state.resolver.lock().await.resolve(&request.query);
    tracing::debug!(query = %request.query, source = ?resolution.source, "answered");

    Ok(Json(ApiResponse::ok(resolution)))
}
