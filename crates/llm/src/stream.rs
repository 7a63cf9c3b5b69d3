//! Streamed chat completion decoding

use std::collections::BTreeMap;

use serde::Deserialize;

use receptionist_core::{FinishReason, ModelReply, ToolCall};

use crate::LlmError;

#[derive(Debug, Deserialize)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// What a single SSE line contributed
#[derive(Debug, PartialEq)]
pub(crate) enum LineEvent {
    /// Text to forward downstream
    Text(String),
    /// The stream has ended
    Done,
    /// Nothing to forward (keep-alives, tool fragments, comments)
    Skip,
}

/// Accumulates one streamed completion
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    text: String,
    calls: BTreeMap<usize, PartialCall>,
    finish_reason: Option<String>,
}

impl StreamState {
    /// Feed one SSE line
    pub(crate) fn push_line(&mut self, line: &str) -> Result<LineEvent, LlmError> {
        let line = line.trim();
        let Some(payload) = line.strip_prefix("data:") else {
            return Ok(LineEvent::Skip);
        };
        let payload = payload.trim();

        if payload == "[DONE]" {
            return Ok(LineEvent::Done);
        }
        if payload.is_empty() {
            return Ok(LineEvent::Skip);
        }

        let chunk: StreamChunk = serde_json::from_str(payload)
            .map_err(|e| LlmError::InvalidResponse(format!("bad stream chunk: {}", e)))?;

        let mut text = String::new();
        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
            let Some(delta) = choice.delta else {
                continue;
            };
            if let Some(content) = delta.content {
                text.push_str(&content);
            }
            for call in delta.tool_calls {
                let entry = self.calls.entry(call.index).or_default();
                if let Some(id) = call.id {
                    entry.id = id;
                }
                if let Some(function) = call.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }
        }

        if text.is_empty() {
            return Ok(LineEvent::Skip);
        }
        self.text.push_str(&text);
        Ok(LineEvent::Text(text))
    }

    pub(crate) fn into_reply(self) -> ModelReply {
        let tool_calls = self
            .calls
            .into_values()
            .filter(|c| !c.name.is_empty())
            .map(|c| {
                let arguments = if c.arguments.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    // malformed arguments reach the dispatcher, which reports them back
                    serde_json::from_str(&c.arguments)
                        .unwrap_or(serde_json::Value::String(c.arguments))
                };
                ToolCall::new(c.id, c.name, arguments)
            })
            .collect::<Vec<_>>();

        let finish_reason = match self.finish_reason.as_deref() {
            Some(reason) => FinishReason::from_openai(reason),
            None if !tool_calls.is_empty() => FinishReason::ToolCalls,
            None => FinishReason::Stop,
        };

        ModelReply {
            text: self.text,
            tool_calls,
            finish_reason,
        }
    }
}
