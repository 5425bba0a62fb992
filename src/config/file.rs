//! TOML configuration file loading
//!
//! Supports `~/.config/docent/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct DocentConfigFile {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Speech synthesis and playback configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Answer enhancement configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Knowledge sources
    #[serde(default)]
    pub document: DocumentFileConfig,

    /// Client-side settings
    #[serde(default)]
    pub client: ClientFileConfig,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,

    /// Directory of static web assets
    pub static_dir: Option<String>,

    /// Regex patterns of accepted CORS origins
    pub allowed_origins: Option<Vec<String>>,
}

/// Voice configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Default ElevenLabs voice
    pub voice_id: Option<String>,

    /// ElevenLabs model (e.g. "eleven_monolingual_v1")
    pub tts_model: Option<String>,

    pub stability: Option<f32>,
    pub similarity_boost: Option<f32>,

    /// Longest text sent for synthesis
    pub max_chars: Option<usize>,

    /// Pause between proxied synthesis requests
    pub queue_delay_ms: Option<u64>,

    /// Delay before retrying refused playback
    pub retry_delay_ms: Option<u64>,

    /// Audio player command line
    pub player: Option<String>,

    /// Local speech engine command line
    pub speech_engine: Option<String>,
}

/// Enhancement configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-4o")
    pub model: Option<String>,

    /// Name the assistant speaks as
    pub persona: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Knowledge source configuration
#[derive(Debug, Default, Deserialize)]
pub struct DocumentFileConfig {
    pub id: Option<String>,
    pub title: Option<String>,
    pub path: Option<String>,
    pub knowledge_path: Option<String>,
    pub similarity_threshold: Option<f64>,
}

/// Client configuration
#[derive(Debug, Default, Deserialize)]
pub struct ClientFileConfig {
    /// Gateway base URL
    pub gateway_url: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `DocentConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> DocentConfigFile {
    let Some(path) = config_file_path() else {
        return DocentConfigFile::default();
    };

    if !path.exists() {
        return DocentConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                DocentConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            DocentConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/docent/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("docent").join("config.toml"))
}
