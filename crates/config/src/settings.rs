//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Company whose configuration every session uses
    #[serde(default)]
    pub company_id: Option<i64>,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// WebRTC configuration
    #[serde(default)]
    pub webrtc: WebRtcSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Company database (PostgREST) configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmSettings,

    /// Retrieval configuration
    #[serde(default)]
    pub rag: RagConfig,

    /// Speech gateway configuration
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Frame pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_webrtc()?;
        self.validate_llm()?;
        self.validate_rag()?;
        self.validate_pipeline()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port must be non-zero".to_string(),
            });
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::MissingField("server.host".to_string()));
        }
        Ok(())
    }

    fn validate_webrtc(&self) -> Result<(), ConfigError> {
        for (i, server) in self.webrtc.ice_servers.iter().enumerate() {
            if server.urls.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("webrtc.ice_servers[{}].urls", i),
                    message: "At least one URL is required".to_string(),
                });
            }
            let is_turn = server
                .urls
                .iter()
                .any(|u| u.starts_with("turn:") || u.starts_with("turns:"));
            if is_turn && (server.username.is_none() || server.credential.is_none()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("webrtc.ice_servers[{}]", i),
                    message: "TURN servers need a username and credential".to_string(),
                });
            }
        }
        if self.webrtc.ice_gathering_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "webrtc.ice_gathering_timeout_secs".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        if !self.llm.base_url.starts_with("http://") && !self.llm.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "llm.base_url".to_string(),
                message: format!("Not an http(s) URL: {}", self.llm.base_url),
            });
        }
        if self.llm.max_tool_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_tool_rounds".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", self.llm.temperature),
            });
        }
        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;

        if !(0.0..=1.0).contains(&rag.match_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "rag.match_threshold".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", rag.match_threshold),
            });
        }

        if rag.match_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.match_count".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if rag.embedding_model.trim().is_empty() {
            return Err(ConfigError::MissingField("rag.embedding_model".to_string()));
        }

        Ok(())
    }

    fn validate_pipeline(&self) -> Result<(), ConfigError> {
        if self.pipeline.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.channel_capacity".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins (empty = any origin)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    7860
}

fn default_request_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_request_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// ICE server entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// Server URLs (stun: or turn:)
    pub urls: Vec<String>,
    /// Username (for TURN)
    #[serde(default)]
    pub username: Option<String>,
    /// Credential (for TURN)
    #[serde(default)]
    pub credential: Option<String>,
}

/// WebRTC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRtcSettings {
    /// ICE servers offered to every peer connection
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServerConfig>,

    /// How long to wait for ICE gathering before answering
    #[serde(default = "default_ice_gathering_timeout")]
    pub ice_gathering_timeout_secs: u64,
}

fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![IceServerConfig {
        urls: vec!["stun:stun.l.google.com:19302".to_string()],
        username: None,
        credential: None,
    }]
}

fn default_ice_gathering_timeout() -> u64 {
    10
}

impl Default for WebRtcSettings {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            ice_gathering_timeout_secs: default_ice_gathering_timeout(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable the Prometheus endpoint
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Company database configuration (Supabase / PostgREST)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Project URL, e.g. `http://127.0.0.1:54321`
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Anonymous API key sent as `apikey` and bearer token
    #[serde(default = "default_database_key")]
    pub anon_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_database_timeout")]
    pub timeout_secs: u64,
}

fn default_database_url() -> String {
    std::env::var("SUPABASE_URL").unwrap_or_else(|_| "http://127.0.0.1:54321".to_string())
}

fn default_database_key() -> String {
    std::env::var("SUPABASE_ANON_KEY").unwrap_or_default()
}

fn default_database_timeout() -> u64 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            anon_key: default_database_key(),
            timeout_secs: default_database_timeout(),
        }
    }
}

/// Language model configuration shared by all sessions
///
/// The API key and model id come from the company record, not from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per response
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Model calls allowed per turn while resolving tool calls
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

fn default_llm_base_url() -> String {
    std::env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tool_rounds() -> usize {
    3
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_tokens: None,
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Augment user turns with retrieved knowledge
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum similarity score (0-1)
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    /// Number of chunks to retrieve
    #[serde(default = "default_match_count")]
    pub match_count: usize,

    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// OpenAI-compatible embeddings base URL
    #[serde(default = "default_embedding_base_url")]
    pub embedding_base_url: String,

    /// Timeout for each embedding or search call
    #[serde(default = "default_rag_timeout")]
    pub timeout_secs: u64,
}

fn default_match_threshold() -> f32 {
    0.7
}

fn default_match_count() -> usize {
    3
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_rag_timeout() -> u64 {
    10
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            match_threshold: default_match_threshold(),
            match_count: default_match_count(),
            embedding_model: default_embedding_model(),
            embedding_base_url: default_embedding_base_url(),
            timeout_secs: default_rag_timeout(),
        }
    }
}

/// Speech gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Speech recognition gateway base URL
    #[serde(default = "default_stt_url")]
    pub stt_url: String,

    /// Speech synthesis gateway base URL
    #[serde(default = "default_tts_url")]
    pub tts_url: String,

    /// Synthesis voice
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Synthesis sample rate
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Inbound audio is forwarded to the recognizer in segments of this length
    #[serde(default = "default_segment_ms")]
    pub segment_ms: u32,

    /// Request timeout in seconds
    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,
}

fn default_stt_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_tts_url() -> String {
    "http://127.0.0.1:8002".to_string()
}

fn default_voice() -> String {
    "af_heart".to_string()
}

fn default_sample_rate() -> u32 {
    24000
}

fn default_segment_ms() -> u32 {
    200
}

fn default_speech_timeout() -> u64 {
    15
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_url: default_stt_url(),
            tts_url: default_tts_url(),
            voice: default_voice(),
            sample_rate: default_sample_rate(),
            segment_ms: default_segment_ms(),
            timeout_secs: default_speech_timeout(),
        }
    }
}

/// Frame pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Capacity of each inter-stage channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Load settings from files and environment
///
/// Priority: env vars > config/{env} > config/default > defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from("config", env)
}

/// Load settings from a specific configuration directory
pub fn load_settings_from(dir: &str, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name(&format!("{}/default", dir)).required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("{}/{}", dir, env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("RECEPTIONIST")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(dir, env = env.unwrap_or("default"), "Settings loaded");

    Ok(settings)
}
