//! Configuration management for the voice receptionist
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`)
//! - Environment variables (`RECEPTIONIST__` prefix, plus the conventional
//!   `SUPABASE_URL`, `SUPABASE_ANON_KEY` and `LLM_BASE_URL`)
//!
//! Per-company settings are resolved once at startup into an immutable
//! [`SessionConfig`] shared by every session.

pub mod prompts;
pub mod session;
pub mod settings;

pub use prompts::{build_system_prompt, DEFAULT_RAG_INSTRUCTIONS};
pub use session::{CompanyProfile, RetrievalParams, SessionConfig};
pub use settings::{
    load_settings, DatabaseConfig, IceServerConfig, LlmSettings, ObservabilityConfig,
    PipelineSettings, RagConfig, ServerConfig, Settings, SpeechConfig, WebRtcSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Company with id {0} not found")]
    CompanyNotFound(i64),

    #[error("Failed to load company configuration: {0}")]
    CompanyLookup(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
