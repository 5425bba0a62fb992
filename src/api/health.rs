//! Health check endpoint

use axum::{Router, http::StatusCode, routing::get};

/// Liveness probe - is the service running?
async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Build health router (no state needed)
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}
