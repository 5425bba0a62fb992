//! HTTP API server for the docent gateway

pub mod ask;
pub mod config;
pub mod documents;
pub mod health;
pub mod voice;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::query::{KnowledgeBase, QueryResolver};
use crate::voice::{SpeechProxy, VoiceSettings};

/// Largest accepted request body (document uploads)
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Standard response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// Failed response with no data
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Error returned by API handlers, rendered as a failed envelope
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Status(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Status(status, msg) => (status, msg),
        };

        (status, Json(ApiResponse::<()>::failure(message))).into_response()
    }
}

/// Shared state for API handlers
pub struct ApiState {
    /// Identifier of the served document
    pub document_id: String,
    /// Structured answers, served as `{document_id}_responses`
    pub knowledge: Option<Arc<KnowledgeBase>>,
    /// Shared resolver; owns the document model and query cache
    pub resolver: Mutex<QueryResolver>,
    pub proxy: SpeechProxy,
    pub voice_id: String,
    pub voice_settings: VoiceSettings,
    pub tts_enabled: bool,
    pub openai_enabled: bool,
}

impl ApiState {
    /// Identifier under which the knowledge base is served
    #[must_use]
    pub fn knowledge_id(&self) -> String {
        format!("{}_responses", self.document_id)
    }
}

/// API server builder
pub struct ApiServerBuilder {
    port: u16,
    document_id: String,
    resolver: QueryResolver,
    proxy: SpeechProxy,
    voice_id: String,
    voice_settings: VoiceSettings,
    tts_enabled: bool,
    openai_enabled: bool,
    static_dir: Option<PathBuf>,
    allowed_origins: Vec<String>,
}

impl ApiServerBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new(
        port: u16,
        document_id: impl Into<String>,
        resolver: QueryResolver,
        proxy: SpeechProxy,
    ) -> Self {
        Self {
            port,
            document_id: document_id.into(),
            resolver,
            proxy,
            voice_id: crate::config::DEFAULT_VOICE_ID.to_string(),
            voice_settings: VoiceSettings::default(),
            tts_enabled: false,
            openai_enabled: false,
            static_dir: None,
            allowed_origins: crate::config::DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Set the default voice advertised to clients
    #[must_use]
    pub fn voice_id(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    /// Set the voice settings advertised to clients
    #[must_use]
    pub const fn voice_settings(mut self, settings: VoiceSettings) -> Self {
        self.voice_settings = settings;
        self
    }

    /// Mark remote synthesis as available
    #[must_use]
    pub const fn tts_enabled(mut self, enabled: bool) -> Self {
        self.tts_enabled = enabled;
        self
    }

    /// Mark answer enhancement as available
    #[must_use]
    pub const fn openai_enabled(mut self, enabled: bool) -> Self {
        self.openai_enabled = enabled;
        self
    }

    /// Set static files directory for the web UI
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Set the regex patterns of accepted CORS origins
    #[must_use]
    pub fn allowed_origins(mut self, patterns: Vec<String>) -> Self {
        self.allowed_origins = patterns;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let allowed_origins = self
            .allowed_origins
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern, error = %e, "ignoring invalid origin pattern");
                    None
                }
            })
            .collect();

        let state = Arc::new(ApiState {
            document_id: self.document_id,
            knowledge: self.resolver.knowledge().cloned(),
            resolver: Mutex::new(self.resolver),
            proxy: self.proxy,
            voice_id: self.voice_id,
            voice_settings: self.voice_settings,
            tts_enabled: self.tts_enabled,
            openai_enabled: self.openai_enabled,
        });

        ApiServer {
            state,
            port: self.port,
            static_dir: self.static_dir,
            allowed_origins: Arc::new(allowed_origins),
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
    allowed_origins: Arc<Vec<Regex>>,
}

impl ApiServer {
    /// Shared handler state
    #[must_use]
    pub fn state(&self) -> Arc<ApiState> {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(config::router(self.state.clone()))
            .merge(documents::router(self.state.clone()))
            .merge(ask::router(self.state.clone()))
            .merge(voice::router(self.state.clone()))
            .merge(health::router());

        // Serve static files if configured
        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir =
                ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        let origins = self.allowed_origins.clone();
        let cors = CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
                origin
                    .to_str()
                    .is_ok_and(|origin| origin_allowed(&origins, origin))
            }))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true);

        router
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            tts = self.state.tts_enabled,
            openai = self.state.openai_enabled,
            "API server listening"
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Whether `origin` matches any accepted pattern
#[must_use]
pub fn origin_allowed(patterns: &[Regex], origin: &str) -> bool {
    patterns.iter().any(|re| re.is_match(origin))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_patterns() -> Vec<Regex> {
        crate::config::DEFAULT_ALLOWED_ORIGINS
            .iter()
            .map(|p| Regex::new(p).unwrap())
            .collect()
    }

    #[test]
    fn test_default_origins() {
        let patterns = default_patterns();
        assert!(origin_allowed(&patterns, "https://docent.alice.repl.co"));
        assert!(origin_allowed(&patterns, "https://abc.replit.dev"));
        assert!(origin_allowed(&patterns, "http://localhost:3000"));
        assert!(origin_allowed(&patterns, "http://127.0.0.1:8080"));
        assert!(origin_allowed(&patterns, "file://"));
        assert!(!origin_allowed(&patterns, "https://evil.example.com"));
        assert!(!origin_allowed(&patterns, "https://repl.co.evil.com"));
    }

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::ok(vec![1, 2])).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert_eq!(json["message"], "");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));

        let json = serde_json::to_value(ApiResponse::<()>::failure("nope")).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["data"].is_null());
        assert_eq!(json["message"], "nope");
    }
}
