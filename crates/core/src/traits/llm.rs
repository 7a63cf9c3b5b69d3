//! Language Model traits

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{Message, ModelReply, Result, ToolDefinition};

/// Language Model interface
///
/// # Example
///
/// ```ignore
/// let (tx, mut rx) = mpsc::channel(64);
/// let reply = llm.stream_chat(&messages, &tools, tx).await?;
/// while let Some(delta) = rx.recv().await {
///     print!("{}", delta);
/// }
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Stream a chat completion
    ///
    /// Text deltas are sent on `deltas` as they arrive. The returned reply
    /// carries the full text and any tool calls the model requested.
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        deltas: mpsc::Sender<String>,
    ) -> Result<ModelReply>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}
