//! Core traits for the voice receptionist
//!
//! ```text
//! Pipeline:
//!   - FrameProcessor: one stage of the per-session frame pipeline
//!
//! Speech Processing:
//!   - SpeechToText: inbound audio → utterance transcripts
//!   - TextToSpeech: sentence → encoded audio
//!   - AudioSink: encoded audio → remote peer
//!
//! Language Models:
//!   - LanguageModel: streamed chat completion with tool calling
//!
//! Tools:
//!   - ToolInvoker: executes model-issued tool calls
//! ```

mod llm;
mod pipeline;
mod speech;
mod tool;

pub use llm::LanguageModel;
pub use pipeline::{Frame, FrameProcessor, ProcessorContext};
pub use speech::{AudioSink, SpeechToText, TextToSpeech};
pub use tool::ToolInvoker;
