//! Tool handler trait

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::ToolError;

/// Default timeout for tool execution
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes one named tool
///
/// Handlers receive arguments that already passed schema validation. A
/// returned `Err` is turned into a failure payload by the dispatcher.
#[async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    /// Tool name, matching an entry in the published schema
    fn name(&self) -> &str;

    /// Execute the tool
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;

    /// Upper bound on one execution
    fn timeout(&self) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }
}
