//! Markdown sanitizer stage
//!
//! Cleans each model text delta before it reaches the sentence aggregator.

use async_trait::async_trait;
use receptionist_core::{Frame, FrameProcessor, ProcessorContext, Result};

/// Applies the output sanitizer to model text deltas
#[derive(Debug, Default)]
pub struct SanitizerStage;

impl SanitizerStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FrameProcessor for SanitizerStage {
    async fn process(&self, frame: Frame, _context: &mut ProcessorContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::ModelTextDelta { text } => {
                let cleaned = receptionist_text_processing::clean(&text);
                if cleaned.is_empty() {
                    tracing::trace!(raw = %text, "Delta empty after sanitizing");
                    return Ok(vec![]);
                }
                Ok(vec![Frame::ModelTextDelta { text: cleaned }])
            }
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "sanitizer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cleans_deltas() {
        let stage = SanitizerStage::new();
        let mut ctx = ProcessorContext::default();

        let out = stage
            .process(
                Frame::ModelTextDelta {
                    text: "**Great** news".into(),
                },
                &mut ctx,
            )
            .await
            .unwrap();

        assert_eq!(
            out,
            vec![Frame::ModelTextDelta {
                text: "Great news".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_drops_empty_result() {
        let stage = SanitizerStage::new();
        let mut ctx = ProcessorContext::default();

        let out = stage
            .process(Frame::ModelTextDelta { text: "**".into() }, &mut ctx)
            .await
            .unwrap();

        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_hash_token_keeps_word_boundary() {
        let stage = SanitizerStage::new();
        let mut ctx = ProcessorContext::default();
        let mut spoken = String::new();

        for token in ["Room", " #", "4"] {
            for frame in stage
                .process(Frame::ModelTextDelta { text: token.into() }, &mut ctx)
                .await
                .unwrap()
            {
                if let Frame::ModelTextDelta { text } = frame {
                    spoken.push_str(&text);
                }
            }
        }

        assert_eq!(spoken, "Room #4");
    }

    #[tokio::test]
    async fn test_control_frames_untouched() {
        let stage = SanitizerStage::new();
        let mut ctx = ProcessorContext::default();

        let out = stage.process(Frame::TurnEnd, &mut ctx).await.unwrap();

        assert_eq!(out, vec![Frame::TurnEnd]);
    }
}
