//! Persistence errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The request never produced a response (connect, timeout, body read)
    #[error("Request failed: {0}")]
    Request(String),

    /// The store answered with a non-success status
    #[error("Store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl PersistenceError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::NotFound(_) | Self::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for PersistenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PersistenceError::Decode(err.to_string())
        } else {
            PersistenceError::Request(err.to_string())
        }
    }
}
