//! Sentence aggregator for streaming model output
//!
//! Buffers model text deltas and emits complete sentences for synthesis.
//! A sentence is complete when the buffer ends in terminal punctuation, or
//! when a terminal mark followed by whitespace appears inside it. Whatever
//! is left when the turn ends is flushed as a final sentence.

use async_trait::async_trait;
use parking_lot::Mutex;
use receptionist_core::{Frame, FrameProcessor, ProcessorContext, Result};

/// Characters that end a sentence
const TERMINATORS: &[char] = &['.', '!', '?'];

#[derive(Debug, Default)]
struct AggregatorState {
    buffer: String,
    next_index: usize,
}

impl AggregatorState {
    fn append(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut ready = Vec::new();
        while let Some(sentence) = self.take_ready() {
            ready.push(sentence);
        }
        ready
    }

    /// Take the next complete sentence off the front of the buffer
    fn take_ready(&mut self) -> Option<String> {
        if self.buffer.trim_end().ends_with(TERMINATORS) {
            return Some(std::mem::take(&mut self.buffer));
        }

        let cut = last_boundary(&self.buffer)?;
        let rest = self.buffer.split_off(cut);
        Some(std::mem::replace(&mut self.buffer, rest))
    }

    /// Flush the remainder; blank text is discarded
    fn flush(&mut self) -> Option<String> {
        let remainder = std::mem::take(&mut self.buffer);
        if remainder.trim().is_empty() {
            None
        } else {
            Some(remainder)
        }
    }

    fn frame(&mut self, text: String) -> Frame {
        let index = self.next_index;
        self.next_index += 1;
        Frame::Sentence { text, index }
    }
}

/// Byte offset just past the last terminator that is followed by whitespace
fn last_boundary(text: &str) -> Option<usize> {
    let mut boundary = None;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if TERMINATORS.contains(&c) {
            if let Some((_, next)) = chars.peek() {
                if next.is_whitespace() {
                    boundary = Some(i + c.len_utf8());
                }
            }
        }
    }

    boundary
}

/// Sentence aggregator that buffers model deltas and emits sentences
pub struct SentenceAggregator {
    state: Mutex<AggregatorState>,
}

impl SentenceAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggregatorState::default()),
        }
    }

    /// Text buffered but not yet emitted
    pub fn buffered(&self) -> String {
        self.state.lock().buffer.clone()
    }
}

impl Default for SentenceAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameProcessor for SentenceAggregator {
    async fn process(&self, frame: Frame, _context: &mut ProcessorContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::ModelTextDelta { text } => {
                let mut state = self.state.lock();
                let sentences = state.append(&text);
                let frames: Vec<Frame> = sentences.into_iter().map(|s| state.frame(s)).collect();

                for f in &frames {
                    if let Frame::Sentence { text, index } = f {
                        tracing::debug!(index, sentence = %text, "Sentence complete");
                    }
                }

                Ok(frames)
            }
            Frame::TurnEnd | Frame::EndOfStream => {
                let mut out = Vec::with_capacity(2);
                {
                    let mut state = self.state.lock();
                    if let Some(remainder) = state.flush() {
                        out.push(state.frame(remainder));
                    }
                }
                out.push(frame);
                Ok(out)
            }
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "sentence_aggregator"
    }

    async fn on_stop(&self, context: &mut ProcessorContext) -> Result<()> {
        let pending = {
            let mut state = self.state.lock();
            state.flush().map(|remainder| state.frame(remainder))
        };

        if let Some(frame) = pending {
            // the downstream stage may already be gone
            if let Err(e) = context.push(frame).await {
                tracing::debug!(error = %e, "Dropped unflushed sentence on stop");
            }
        }

        Ok(())
    }
}
