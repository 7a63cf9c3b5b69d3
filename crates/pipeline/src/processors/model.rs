//! Model stage
//!
//! Owns the conversation history for one session and drives the language
//! model. Text deltas are pushed downstream as they stream in; tool calls
//! are executed between rounds and their results appended to the history
//! before the model is asked again. Every handled turn ends with exactly
//! one `TurnEnd`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use receptionist_core::{
    Frame, FrameProcessor, LanguageModel, Message, ProcessorContext, Result, ToolDefinition,
    ToolInvoker,
};

/// Buffer between the model client and the frame emitter
const DELTA_CHANNEL_CAPACITY: usize = 64;

/// Model stage configuration
#[derive(Debug, Clone)]
pub struct ModelStageConfig {
    /// System prompt seeded as the first history entry
    pub system_prompt: String,
    /// Tool rounds allowed per turn before the model must answer in text
    pub max_tool_rounds: usize,
}

impl Default for ModelStageConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            max_tool_rounds: 3,
        }
    }
}

/// Streams model replies and runs tool rounds
pub struct ModelStage {
    llm: Arc<dyn LanguageModel>,
    tools: Arc<dyn ToolInvoker>,
    definitions: Vec<ToolDefinition>,
    history: Mutex<Vec<Message>>,
    max_tool_rounds: usize,
}

impl ModelStage {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        tools: Arc<dyn ToolInvoker>,
        config: ModelStageConfig,
    ) -> Self {
        let definitions = tools.definitions();
        let mut history = Vec::new();
        if !config.system_prompt.is_empty() {
            history.push(Message::system(config.system_prompt));
        }

        Self {
            llm,
            tools,
            definitions,
            history: Mutex::new(history),
            max_tool_rounds: config.max_tool_rounds,
        }
    }

    /// Snapshot of the conversation history
    pub fn history(&self) -> Vec<Message> {
        self.history.lock().clone()
    }

    async fn run_turn(&self, context: &mut ProcessorContext) -> Result<()> {
        for round in 0..=self.max_tool_rounds {
            let messages = self.history();
            // the last round withholds tools so the model has to speak
            let tools: &[ToolDefinition] = if round < self.max_tool_rounds {
                &self.definitions
            } else {
                &[]
            };

            let started = Instant::now();
            let (tx, mut rx) = mpsc::channel::<String>(DELTA_CHANNEL_CAPACITY);
            let generate = self.llm.stream_chat(&messages, tools, tx);
            let forward = async {
                while let Some(text) = rx.recv().await {
                    if text.is_empty() {
                        continue;
                    }
                    context.push(Frame::ModelTextDelta { text }).await?;
                }
                Ok::<(), receptionist_core::Error>(())
            };

            let (reply, forwarded) = tokio::join!(generate, forward);
            metrics::histogram!("receptionist_model_round_seconds")
                .record(started.elapsed().as_secs_f64());
            let reply = reply?;
            forwarded?;

            if !reply.has_tool_calls() {
                if !reply.text.is_empty() {
                    self.history.lock().push(Message::assistant(reply.text));
                }
                return Ok(());
            }

            tracing::debug!(
                session_id = %context.session_id,
                round,
                calls = reply.tool_calls.len(),
                "Model requested tools"
            );

            self.history.lock().push(Message::assistant_tool_calls(
                reply.text,
                reply.tool_calls.clone(),
            ));

            for call in reply.tool_calls {
                context.push(Frame::ToolCallRequest(call.clone())).await?;

                let payload = self.tools.invoke(&call).await;

                self.history
                    .lock()
                    .push(Message::tool(payload.to_string(), call.id.clone()));
                context
                    .push(Frame::ToolCallResult {
                        id: call.id,
                        payload,
                    })
                    .await?;
            }
        }

        tracing::warn!(
            session_id = %context.session_id,
            max_tool_rounds = self.max_tool_rounds,
            "Tool round limit reached"
        );
        Ok(())
    }

    /// Run a turn and terminate it with `TurnEnd`, reporting failures inline
    async fn respond(&self, context: &mut ProcessorContext) -> Result<Vec<Frame>> {
        let mut out = Vec::with_capacity(2);

        if let Err(e) = self.run_turn(context).await {
            if !e.is_recoverable() {
                return Err(e);
            }
            tracing::error!(
                session_id = %context.session_id,
                turn = context.turn_number,
                error = %e,
                "Model turn failed"
            );
            out.push(Frame::error(self.name(), &e));
        }

        out.push(Frame::TurnEnd);
        Ok(out)
    }
}

#[async_trait]
impl FrameProcessor for ModelStage {
    async fn process(&self, frame: Frame, context: &mut ProcessorContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::ModelRequest { text } => {
                self.history.lock().push(Message::user(text));
                self.respond(context).await
            }
            Frame::StartConversation => {
                tracing::info!(session_id = %context.session_id, "Starting conversation");
                self.respond(context).await
            }
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "model"
    }
}
