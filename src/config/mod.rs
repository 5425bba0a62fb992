//! Configuration management for the Docent gateway
//!
//! Every setting is resolved env > TOML file > default. A `.env` file in the
//! working directory is loaded into the environment by the binary first.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::query::matcher::DEFAULT_SIMILARITY_THRESHOLD;
use crate::voice::{
    DEFAULT_LLM_MODEL, DEFAULT_MAX_CHARS, DEFAULT_QUEUE_DELAY, DEFAULT_RETRY_DELAY,
    DEFAULT_TTS_MODEL, VoiceSettings,
};
use file::DocentConfigFile;

/// Voice used when nothing else names one
pub const DEFAULT_VOICE_ID: &str = "TnVT7p6RBpw3AtQyx4cd";

/// Port the gateway listens on by default
pub const DEFAULT_PORT: u16 = 3000;

/// Origins accepted by CORS unless configured otherwise
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    r"\.repl\.co$",
    r"\.replit\.dev$",
    "localhost",
    r"127\.0\.0\.1",
    "^file://",
];

const DEFAULT_DOCUMENT_ID: &str = "document";
const DEFAULT_DOCUMENT_TITLE: &str = "Document";
const DEFAULT_DOCUMENTS_DIR: &str = "documents";
const DEFAULT_PERSONA: &str = "the author";
const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_PLAYER: &str = "mpv --no-video --really-quiet";
const DEFAULT_SPEECH_ENGINE: &str = "espeak-ng";

/// Docent configuration
#[derive(Debug)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Answer enhancement configuration
    pub llm: LlmConfig,

    /// Knowledge sources
    pub document: DocumentConfig,

    /// Gateway base URL used by the client commands
    pub gateway_url: String,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (web UI)
    pub static_dir: Option<PathBuf>,

    /// Regex patterns of accepted CORS origins
    pub allowed_origins: Vec<String>,
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// `ElevenLabs` API key (remote TTS)
    pub elevenlabs: Option<SecretString>,

    /// `OpenAI` API key (answer enhancement)
    pub openai: Option<SecretString>,
}

/// Voice configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Default ElevenLabs voice
    pub voice_id: String,

    /// ElevenLabs model identifier
    pub tts_model: String,

    /// Stability / similarity settings sent with each request
    pub settings: VoiceSettings,

    /// Longest text sent for synthesis
    pub max_chars: usize,

    /// Pause between proxied synthesis requests
    pub queue_delay: Duration,

    /// Delay before retrying refused playback
    pub retry_delay: Duration,

    /// Audio player command line
    pub player: String,

    /// Local speech engine command line
    pub speech_engine: String,
}

/// Enhancement configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Chat completion model
    pub model: String,

    /// Name the assistant speaks as
    pub persona: String,
}

/// Knowledge source configuration
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    /// Identifier exposed through the documents API
    pub id: String,

    /// Human readable title
    pub title: String,

    /// `.txt` or `.html` document file
    pub path: PathBuf,

    /// Structured knowledge base JSON
    pub knowledge_path: PathBuf,

    /// Similarity a question key must exceed to match
    pub similarity_threshold: f64,
}

impl Config {
    /// Load configuration from the environment and config file
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();
        Self::from_sources(&fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    #[must_use]
    pub fn from_sources<F>(fc: &DocentConfigFile, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        // Server (env > toml > default)
        let server = ServerConfig {
            port: env("DOCENT_PORT")
                .or_else(|| env("PORT"))
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            static_dir: env("DOCENT_STATIC_DIR")
                .or_else(|| fc.server.static_dir.clone())
                .map(PathBuf::from),
            allowed_origins: env("DOCENT_ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .or_else(|| fc.server.allowed_origins.clone())
                .unwrap_or_else(|| {
                    DEFAULT_ALLOWED_ORIGINS
                        .iter()
                        .map(ToString::to_string)
                        .collect()
                }),
        };

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            elevenlabs: env("ELEVEN_LABS_API_KEY")
                .or_else(|| env("ELEVENLABS_API_KEY"))
                .or_else(|| fc.api_keys.elevenlabs.clone())
                .map(SecretString::from),
            openai: env("OPENAI_API_KEY")
                .or_else(|| fc.api_keys.openai.clone())
                .map(SecretString::from),
        };

        let defaults = VoiceSettings::default();
        let voice = VoiceConfig {
            voice_id: env("ELEVEN_LABS_VOICE_ID")
                .or_else(|| fc.voice.voice_id.clone())
                .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            tts_model: env("DOCENT_TTS_MODEL")
                .or_else(|| fc.voice.tts_model.clone())
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            settings: VoiceSettings {
                stability: fc.voice.stability.unwrap_or(defaults.stability),
                similarity_boost: fc
                    .voice
                    .similarity_boost
                    .unwrap_or(defaults.similarity_boost),
            },
            max_chars: fc.voice.max_chars.unwrap_or(DEFAULT_MAX_CHARS),
            queue_delay: fc
                .voice
                .queue_delay_ms
                .map_or(DEFAULT_QUEUE_DELAY, Duration::from_millis),
            retry_delay: fc
                .voice
                .retry_delay_ms
                .map_or(DEFAULT_RETRY_DELAY, Duration::from_millis),
            player: env("DOCENT_PLAYER")
                .or_else(|| fc.voice.player.clone())
                .unwrap_or_else(|| DEFAULT_PLAYER.to_string()),
            speech_engine: env("DOCENT_SPEECH_ENGINE")
                .or_else(|| fc.voice.speech_engine.clone())
                .unwrap_or_else(|| DEFAULT_SPEECH_ENGINE.to_string()),
        };

        let llm = LlmConfig {
            model: env("DOCENT_LLM_MODEL")
                .or_else(|| fc.llm.model.clone())
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            persona: env("DOCENT_PERSONA_NAME")
                .or_else(|| fc.llm.persona.clone())
                .unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
        };

        let id = env("DOCENT_DOCUMENT_ID")
            .or_else(|| fc.document.id.clone())
            .unwrap_or_else(|| DEFAULT_DOCUMENT_ID.to_string());

        let document = DocumentConfig {
            title: env("DOCENT_DOCUMENT_TITLE")
                .or_else(|| fc.document.title.clone())
                .unwrap_or_else(|| DEFAULT_DOCUMENT_TITLE.to_string()),
            path: env("DOCENT_DOCUMENT_PATH")
                .or_else(|| fc.document.path.clone())
                .map_or_else(
                    || PathBuf::from(DEFAULT_DOCUMENTS_DIR).join(format!("{id}.txt")),
                    PathBuf::from,
                ),
            knowledge_path: env("DOCENT_KNOWLEDGE_PATH")
                .or_else(|| fc.document.knowledge_path.clone())
                .map_or_else(
                    || PathBuf::from(DEFAULT_DOCUMENTS_DIR).join(format!("{id}_responses.json")),
                    PathBuf::from,
                ),
            similarity_threshold: env("DOCENT_SIMILARITY_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .or(fc.document.similarity_threshold)
                .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD),
            id,
        };

        let gateway_url = env("DOCENT_GATEWAY_URL")
            .or_else(|| fc.client.gateway_url.clone())
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());

        Self {
            server,
            api_keys,
            voice,
            llm,
            document,
            gateway_url,
        }
    }
}
