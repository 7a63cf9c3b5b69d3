//! Voice Receptionist Server
//!
//! Signaling endpoint, session registry and per-session pipeline wiring.

pub mod http;
pub mod metrics;
pub mod registry;
pub mod services;
pub mod session;
pub mod state;

pub use http::create_router;
pub use metrics::init_metrics;
pub use registry::{Answer, Offer, SessionRegistry};
pub use services::{PipelineFactory, SessionServices};
pub use session::Session;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use receptionist_transport::TransportError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The connection went away while the request was being handled
    #[error("Connection gone: {0}")]
    ConnectionGone(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransportError> for ServerError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidDescription(msg) => ServerError::InvalidRequest(msg),
            TransportError::Closed => ServerError::ConnectionGone(err.to_string()),
            other => ServerError::Transport(other.to_string()),
        }
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        err.status()
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::ConnectionGone(_) => StatusCode::CONFLICT,
            ServerError::Transport(_) => StatusCode::BAD_GATEWAY,
            ServerError::Pipeline(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
