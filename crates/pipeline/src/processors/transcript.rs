//! Transcript intake stage
//!
//! Turns each finished user utterance into a model request and advances the
//! turn counter.

use async_trait::async_trait;
use receptionist_core::{Frame, FrameProcessor, ProcessorContext, Result};

#[derive(Debug, Default)]
pub struct TranscriptStage;

impl TranscriptStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FrameProcessor for TranscriptStage {
    async fn process(&self, frame: Frame, context: &mut ProcessorContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::TranscriptText { text } => {
                let text = text.trim();
                if text.is_empty() {
                    tracing::debug!(session_id = %context.session_id, "Ignoring blank transcript");
                    return Ok(vec![]);
                }

                context.next_turn();
                tracing::info!(
                    session_id = %context.session_id,
                    turn = context.turn_number,
                    transcript = %text,
                    "User utterance"
                );

                Ok(vec![Frame::ModelRequest {
                    text: text.to_string(),
                }])
            }
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "transcript"
    }
}
