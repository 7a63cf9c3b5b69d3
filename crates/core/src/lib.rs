//! Core traits and types for the voice receptionist
//!
//! This crate provides foundational types used across all other crates:
//! - Frames flowing through the per-session pipeline
//! - The `FrameProcessor` trait implemented by every pipeline stage
//! - Collaborator traits (speech, language model, tools)
//! - Chat message and tool-call types
//! - Error types

pub mod audio;
pub mod error;
pub mod llm_types;
pub mod traits;

pub use audio::AudioPacket;
pub use error::{Error, Result};
pub use llm_types::{FinishReason, Message, ModelReply, Role, ToolCall, ToolDefinition};

pub use traits::{
    AudioSink, Frame, FrameProcessor, LanguageModel, ProcessorContext, SpeechToText,
    TextToSpeech, ToolInvoker,
};
