//! Tool errors

use serde_json::{json, Value};
use thiserror::Error;

/// Tool errors
///
/// Everything except `Registry` is reported back to the model as a failure
/// payload rather than propagated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("{0}")]
    Execution(String),

    #[error("Tool {tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("Tool {0} failed unexpectedly")]
    Panicked(String),

    #[error("Tool registry error: {0}")]
    Registry(String),
}

impl ToolError {
    pub fn invalid_arguments(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::Execution(_) => "execution",
            Self::Timeout { .. } => "timeout",
            Self::Panicked(_) => "panic",
            Self::Registry(_) => "registry",
        }
    }

    /// Payload returned to the model in place of a result
    pub fn failure_payload(&self) -> Value {
        json!({
            "success": false,
            "error": self.to_string(),
        })
    }
}

impl From<ToolError> for receptionist_core::Error {
    fn from(err: ToolError) -> Self {
        receptionist_core::Error::Tool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_payload() {
        let payload = ToolError::Execution("Failed to create appointment record".into())
            .failure_payload();

        assert_eq!(payload["success"], false);
        assert_eq!(payload["error"], "Failed to create appointment record");
    }

    #[test]
    fn test_kind() {
        assert_eq!(ToolError::UnknownTool("x".into()).kind(), "unknown_tool");
        assert_eq!(
            ToolError::Timeout {
                tool: "x".into(),
                secs: 1
            }
            .kind(),
            "timeout"
        );
    }
}
