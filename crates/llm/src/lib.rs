//! Language model integration
//!
//! Features:
//! - OpenAI-compatible chat completions (OpenAI, Azure, vLLM, local servers)
//! - Server-sent event streaming of text deltas
//! - Tool calling, with streamed argument fragments reassembled per call

pub mod backend;
mod stream;

pub use backend::{OpenAIBackend, OpenAIConfig};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for receptionist_core::Error {
    fn from(err: LlmError) -> Self {
        receptionist_core::Error::Llm(err.to_string())
    }
}
