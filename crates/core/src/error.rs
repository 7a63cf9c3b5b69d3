//! Error types shared across pipeline stages

use thiserror::Error;

/// Errors surfaced by pipeline stages and collaborators
#[derive(Error, Debug)]
pub enum Error {
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Speech recognition error: {0}")]
    Stt(String),

    #[error("Speech synthesis error: {0}")]
    Tts(String),

    #[error("Language model error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the session can keep going after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::ChannelClosed(_) | Error::Cancelled)
    }
}

/// Result alias used throughout the workspace
pub type Result<T> = std::result::Result<T, Error>;
