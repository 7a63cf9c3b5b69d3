//! Frame processors for the conversation pipeline
//!
//! Each stage implements `FrameProcessor` and runs in its own task:
//!
//! ```text
//! transcript → retrieval → model → sanitizer → sentence aggregator → synthesis
//! ```
//!
//! The retrieval stage lives in the rag crate; everything else is here.

pub mod chain;
pub mod model;
pub mod sanitizer;
pub mod sentence_aggregator;
pub mod synthesis;
pub mod transcript;

pub use chain::{ChainControl, ChainHandle, ProcessorChain, ProcessorChainBuilder};
pub use model::{ModelStage, ModelStageConfig};
pub use sanitizer::SanitizerStage;
pub use sentence_aggregator::SentenceAggregator;
pub use synthesis::SynthesisStage;
pub use transcript::TranscriptStage;
