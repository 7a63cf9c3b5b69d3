//! Tool invocation trait

use async_trait::async_trait;

use crate::{ToolCall, ToolDefinition};

/// Executes model-issued tool calls
///
/// Implementations never fail: every outcome, including unknown tools and
/// handler faults, is encoded in the returned payload so the model can react
/// to it in its next response.
#[async_trait]
pub trait ToolInvoker: Send + Sync + 'static {
    /// Tool definitions published to the model
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute one call and return its result payload
    async fn invoke(&self, call: &ToolCall) -> serde_json::Value;
}
