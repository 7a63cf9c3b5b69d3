//! Speech processing traits

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{AudioPacket, Result};

/// Speech-to-Text interface
///
/// The recognizer owns voice activity and end-of-utterance detection: it
/// consumes the session's inbound audio and reports one final transcript
/// per user utterance.
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Transcribe inbound audio until the audio channel closes
    ///
    /// # Arguments
    /// * `session_id` - Session the audio belongs to
    /// * `audio` - Encoded packets in arrival order
    /// * `transcripts` - Receives one string per finished utterance
    async fn transcribe_stream(
        &self,
        session_id: &str,
        audio: mpsc::Receiver<AudioPacket>,
        transcripts: mpsc::Sender<String>,
    ) -> Result<()>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

/// Text-to-Speech interface
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    /// Synthesize one sentence into encoded packets ready for the transport
    async fn synthesize(&self, text: &str) -> Result<Vec<AudioPacket>>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

/// Outbound audio destination for one session
#[async_trait]
pub trait AudioSink: Send + Sync + 'static {
    /// Write one encoded packet to the remote peer
    async fn write(&self, packet: &AudioPacket) -> Result<()>;
}
