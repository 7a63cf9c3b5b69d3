//! Pipeline processing traits

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{AudioPacket, Error, Result, ToolCall};

/// Frame types that flow through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Final transcript of one user utterance
    TranscriptText { text: String },

    /// Outgoing user utterance for the model (possibly augmented with retrieved context)
    ModelRequest { text: String },

    /// Client is ready; the bot speaks first using the conversation history alone
    StartConversation,

    /// Streamed model output
    ModelTextDelta { text: String },

    /// Model asked to run a tool
    ToolCallRequest(ToolCall),

    /// Result of a tool call, correlated by id
    ToolCallResult {
        id: String,
        payload: serde_json::Value,
    },

    /// Complete sentence ready for synthesis
    Sentence { text: String, index: usize },

    /// Synthesized audio for one sentence
    AudioOutput {
        packets: Vec<AudioPacket>,
        sentence_index: usize,
    },

    /// The model finished its response for this turn
    TurnEnd,

    /// Error occurred in pipeline
    Error {
        stage: String,
        message: String,
        recoverable: bool,
    },

    /// End of stream marker
    EndOfStream,
}

impl Frame {
    /// Check if this is an end-of-stream frame
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Frame::EndOfStream)
    }

    /// Check if this is an error frame
    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error { .. })
    }

    /// Control frames are forwarded by every stage and never dropped
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Frame::TurnEnd | Frame::EndOfStream | Frame::StartConversation
        )
    }

    /// Build an error frame for a stage
    pub fn error(stage: impl Into<String>, err: &Error) -> Self {
        Frame::Error {
            stage: stage.into(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }

    /// Get the stage name for this frame type
    pub fn stage_name(&self) -> &'static str {
        match self {
            Frame::TranscriptText { .. } => "transcript_text",
            Frame::ModelRequest { .. } => "model_request",
            Frame::StartConversation => "start_conversation",
            Frame::ModelTextDelta { .. } => "model_text_delta",
            Frame::ToolCallRequest(_) => "tool_call_request",
            Frame::ToolCallResult { .. } => "tool_call_result",
            Frame::Sentence { .. } => "sentence",
            Frame::AudioOutput { .. } => "audio_output",
            Frame::TurnEnd => "turn_end",
            Frame::Error { .. } => "error",
            Frame::EndOfStream => "end_of_stream",
        }
    }
}

/// Context passed to frame processors
///
/// Each stage owns its own copy. When the stage runs inside a running chain
/// the context carries the stage's downstream sender, so `push` delivers
/// frames immediately; otherwise pushed frames are buffered until the
/// caller drains them with `take_pending`.
#[derive(Debug, Clone, Default)]
pub struct ProcessorContext {
    /// Session ID
    pub session_id: String,
    /// Current conversation turn number
    pub turn_number: usize,
    emitter: Option<mpsc::Sender<Frame>>,
    pending: Vec<Frame>,
}

impl ProcessorContext {
    /// Create a new context for a session
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    /// Increment turn number
    pub fn next_turn(&mut self) {
        self.turn_number += 1;
    }

    /// Route pushed frames straight to a downstream channel
    pub fn attach_emitter(&mut self, tx: mpsc::Sender<Frame>) {
        self.emitter = Some(tx);
    }

    /// Emit a frame downstream before `process` returns
    ///
    /// Pushed frames always precede the frames returned from `process`.
    pub async fn push(&mut self, frame: Frame) -> Result<()> {
        match &self.emitter {
            Some(tx) => tx
                .send(frame)
                .await
                .map_err(|_| Error::ChannelClosed("downstream")),
            None => {
                self.pending.push(frame);
                Ok(())
            }
        }
    }

    /// Drain frames pushed while no emitter was attached
    pub fn take_pending(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.pending)
    }
}

/// Frame processor for pipeline stages
///
/// Each processor receives frames, processes them, and emits output frames.
/// Processors run in separate tokio tasks, connected by channels.
///
/// # Example Implementation
///
/// ```ignore
/// struct Upper;
///
/// #[async_trait]
/// impl FrameProcessor for Upper {
///     async fn process(&self, frame: Frame, _ctx: &mut ProcessorContext) -> Result<Vec<Frame>> {
///         match frame {
///             Frame::ModelTextDelta { text } => Ok(vec![Frame::ModelTextDelta {
///                 text: text.to_uppercase(),
///             }]),
///             other => Ok(vec![other]),
///         }
///     }
///
///     fn name(&self) -> &'static str {
///         "upper"
///     }
/// }
/// ```
#[async_trait]
pub trait FrameProcessor: Send + Sync + 'static {
    /// Process a frame and emit zero or more output frames
    ///
    /// # Arguments
    /// * `frame` - Input frame to process
    /// * `context` - Mutable per-stage context
    ///
    /// # Returns
    /// Vector of output frames (may be empty, one, or multiple)
    async fn process(&self, frame: Frame, context: &mut ProcessorContext) -> Result<Vec<Frame>>;

    /// Get processor name for tracing
    fn name(&self) -> &'static str;

    /// Called when pipeline starts
    async fn on_start(&self, _context: &mut ProcessorContext) -> Result<()> {
        Ok(())
    }

    /// Called when the pipeline stops, either at end of stream or on cancellation
    async fn on_stop(&self, _context: &mut ProcessorContext) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_stage_names() {
        assert_eq!(Frame::TurnEnd.stage_name(), "turn_end");
        assert_eq!(Frame::EndOfStream.stage_name(), "end_of_stream");
    }

    #[test]
    fn test_frame_predicates() {
        assert!(Frame::EndOfStream.is_end_of_stream());
        assert!(Frame::TurnEnd.is_control());
        assert!(!Frame::ModelTextDelta { text: "x".into() }.is_control());
        assert!(Frame::error("model", &Error::Llm("down".into())).is_error());
    }

    #[tokio::test]
    async fn test_push_buffers_without_emitter() {
        let mut ctx = ProcessorContext::new("session-123");
        ctx.push(Frame::TurnEnd).await.unwrap();

        assert_eq!(ctx.take_pending(), vec![Frame::TurnEnd]);
        assert!(ctx.take_pending().is_empty());
    }

    #[tokio::test]
    async fn test_push_sends_with_emitter() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut ctx = ProcessorContext::new("session-123");
        ctx.attach_emitter(tx);

        ctx.push(Frame::TurnEnd).await.unwrap();

        assert_eq!(rx.recv().await, Some(Frame::TurnEnd));
        assert!(ctx.take_pending().is_empty());
    }
}
