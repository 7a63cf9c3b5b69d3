//! Synthesis stage
//!
//! Converts each completed sentence into encoded audio packets.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use receptionist_core::{Frame, FrameProcessor, ProcessorContext, Result, TextToSpeech};

pub struct SynthesisStage {
    tts: Arc<dyn TextToSpeech>,
}

impl SynthesisStage {
    pub fn new(tts: Arc<dyn TextToSpeech>) -> Self {
        Self { tts }
    }
}

#[async_trait]
impl FrameProcessor for SynthesisStage {
    async fn process(&self, frame: Frame, context: &mut ProcessorContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::Sentence { text, index } => {
                if text.trim().is_empty() {
                    return Ok(vec![]);
                }

                let started = Instant::now();
                let synthesized = self.tts.synthesize(&text).await;
                metrics::histogram!("receptionist_synthesis_seconds")
                    .record(started.elapsed().as_secs_f64());

                match synthesized {
                    Ok(packets) => {
                        tracing::debug!(
                            session_id = %context.session_id,
                            sentence_index = index,
                            packets = packets.len(),
                            voice = self.tts.model_name(),
                            "Sentence synthesized"
                        );
                        Ok(vec![Frame::AudioOutput {
                            packets,
                            sentence_index: index,
                        }])
                    }
                    Err(e) => {
                        tracing::warn!(
                            session_id = %context.session_id,
                            sentence_index = index,
                            error = %e,
                            "Synthesis failed"
                        );
                        Ok(vec![Frame::error(self.name(), &e)])
                    }
                }
            }
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "synthesis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use receptionist_core::{AudioPacket, Error};

    struct FakeTts {
        fail: bool,
    }

    #[async_trait]
    impl TextToSpeech for FakeTts {
        async fn synthesize(&self, text: &str) -> Result<Vec<AudioPacket>> {
            if self.fail {
                return Err(Error::Tts("gateway down".into()));
            }
            Ok(vec![AudioPacket::new(text.as_bytes().to_vec(), 20, 0)])
        }

        fn model_name(&self) -> &str {
            "fake"
        }
    }

    #[tokio::test]
    async fn test_sentence_becomes_audio() {
        let stage = SynthesisStage::new(Arc::new(FakeTts { fail: false }));
        let mut ctx = ProcessorContext::default();

        let out = stage
            .process(
                Frame::Sentence {
                    text: "Hi.".into(),
                    index: 4,
                },
                &mut ctx,
            )
            .await
            .unwrap();

        assert!(matches!(
            &out[..],
            [Frame::AudioOutput { packets, sentence_index: 4 }] if packets.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_failure_becomes_error_frame() {
        let stage = SynthesisStage::new(Arc::new(FakeTts { fail: true }));
        let mut ctx = ProcessorContext::default();

        let out = stage
            .process(
                Frame::Sentence {
                    text: "Hi.".into(),
                    index: 0,
                },
                &mut ctx,
            )
            .await
            .unwrap();

        assert!(matches!(&out[..], [Frame::Error { recoverable: true, .. }]));
    }

    #[tokio::test]
    async fn test_turn_end_forwarded() {
        let stage = SynthesisStage::new(Arc::new(FakeTts { fail: false }));
        let mut ctx = ProcessorContext::default();

        let out = stage.process(Frame::TurnEnd, &mut ctx).await.unwrap();

        assert_eq!(out, vec![Frame::TurnEnd]);
    }
}
