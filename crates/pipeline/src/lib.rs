//! Per-session conversation pipeline
//!
//! This crate provides the streaming frame pipeline for one call:
//! - Channel-based processor chains with cooperative cancellation
//! - Stages: transcript intake, model/tool loop, markdown sanitizer,
//!   sentence aggregator, speech synthesis
//! - `PipelineTask`, which binds a chain to inbound and outbound audio
//! - HTTP clients for the speech gateway

pub mod processors;
pub mod speech;
pub mod task;

// Processor exports
pub use processors::{
    ChainControl, ChainHandle, ModelStage, ModelStageConfig, ProcessorChain,
    ProcessorChainBuilder, SanitizerStage, SentenceAggregator, SynthesisStage, TranscriptStage,
};

// Speech gateway exports
pub use speech::{GatewaySpeechToText, GatewayTextToSpeech};

// Task exports
pub use task::{ConversationStarter, FrameObserver, PipelineIo, PipelineTask};
