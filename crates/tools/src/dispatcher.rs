//! Tool dispatcher
//!
//! Maps tool names to handlers and turns every `ToolCall` into exactly one
//! result payload. Handlers run in their own task, so a panicking or hung
//! handler costs one failure payload and nothing else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde_json::Value;

use receptionist_core::{
    Frame, FrameProcessor, ProcessorContext, Result, ToolCall, ToolDefinition, ToolInvoker,
};

use crate::{ToolError, ToolHandler};

struct RegisteredTool {
    handler: Arc<dyn ToolHandler>,
    validator: JSONSchema,
}

/// Validated name → handler registry
pub struct ToolDispatcher {
    definitions: Vec<ToolDefinition>,
    tools: HashMap<String, RegisteredTool>,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolDispatcher {
    /// Build a dispatcher, checking schema and handlers against each other
    ///
    /// Fails when a handler has no schema entry, a schema entry has no
    /// handler, a required argument is not declared as a property, or a
    /// parameter schema does not compile.
    pub fn new(
        definitions: Vec<ToolDefinition>,
        handlers: Vec<Arc<dyn ToolHandler>>,
    ) -> std::result::Result<Self, ToolError> {
        let mut by_name: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        for handler in handlers {
            let name = handler.name().to_string();
            if by_name.insert(name.clone(), handler).is_some() {
                return Err(ToolError::Registry(format!("duplicate handler: {}", name)));
            }
        }

        let mut tools = HashMap::with_capacity(definitions.len());
        for def in &definitions {
            let handler = by_name.remove(&def.name).ok_or_else(|| {
                ToolError::Registry(format!("no handler for published tool: {}", def.name))
            })?;

            if let Some(missing) = def
                .required_arguments()
                .into_iter()
                .find(|arg| !def.has_property(arg))
            {
                return Err(ToolError::Registry(format!(
                    "{}: required argument '{}' is not a declared property",
                    def.name, missing
                )));
            }

            let validator = JSONSchema::compile(&def.parameters).map_err(|e| {
                ToolError::Registry(format!("{}: invalid parameter schema: {}", def.name, e))
            })?;

            tools.insert(def.name.clone(), RegisteredTool { handler, validator });
        }

        if let Some(orphan) = by_name.keys().next() {
            return Err(ToolError::Registry(format!(
                "handler without published schema: {}",
                orphan
            )));
        }

        tracing::info!(tools = ?definitions.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(), "Tool dispatcher ready");

        Ok(Self { definitions, tools })
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a call, returning the handler output or the reason it failed
    pub async fn dispatch(&self, call: &ToolCall) -> std::result::Result<Value, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        validate(&call.name, &tool.validator, &call.arguments)?;

        let handler = Arc::clone(&tool.handler);
        let timeout = handler.timeout();
        let arguments = call.arguments.clone();
        let task = tokio::spawn(async move { handler.call(arguments).await });
        let abort = task.abort_handle();

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => {
                tracing::error!(tool = %call.name, tool_call_id = %call.id, "Tool handler panicked");
                Err(ToolError::Panicked(call.name.clone()))
            }
            Ok(Err(join_error)) => Err(ToolError::Execution(format!(
                "Tool {} was cancelled: {}",
                call.name, join_error
            ))),
            Err(_elapsed) => {
                abort.abort();
                Err(ToolError::Timeout {
                    tool: call.name.clone(),
                    secs: timeout.as_secs(),
                })
            }
        }
    }
}

fn validate(tool: &str, validator: &JSONSchema, arguments: &Value) -> std::result::Result<(), ToolError> {
    if let Value::String(raw) = arguments {
        return Err(ToolError::invalid_arguments(
            tool,
            format!("arguments are not a JSON object: {}", raw),
        ));
    }

    if let Err(errors) = validator.validate(arguments) {
        let message = errors
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ToolError::invalid_arguments(tool, message));
    }
    Ok(())
}

#[async_trait]
impl ToolInvoker for ToolDispatcher {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    async fn invoke(&self, call: &ToolCall) -> Value {
        let start = Instant::now();
        let outcome = self.dispatch(call).await;
        let elapsed = start.elapsed();

        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!("receptionist_tool_calls_total", "tool" => call.name.clone(), "outcome" => label)
            .increment(1);
        metrics::histogram!("receptionist_tool_seconds", "tool" => call.name.clone())
            .record(elapsed.as_secs_f64());

        match outcome {
            Ok(payload) => {
                tracing::info!(
                    tool = %call.name,
                    tool_call_id = %call.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Tool call completed"
                );
                payload
            }
            Err(e) => {
                tracing::warn!(
                    tool = %call.name,
                    tool_call_id = %call.id,
                    kind = e.kind(),
                    error = %e,
                    "Tool call failed"
                );
                e.failure_payload()
            }
        }
    }
}

#[async_trait]
impl FrameProcessor for ToolDispatcher {
    async fn process(&self, frame: Frame, _context: &mut ProcessorContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::ToolCallRequest(call) => {
                let payload = self.invoke(&call).await;
                Ok(vec![Frame::ToolCallResult {
                    id: call.id,
                    payload,
                }])
            }
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "tools"
    }
}
