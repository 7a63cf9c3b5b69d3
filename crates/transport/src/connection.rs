//! Peer connection abstractions

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use receptionist_core::{AudioPacket, AudioSink};

use crate::TransportError;

/// SDP offer or answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: "offer".to_string(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: "answer".to_string(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == "offer"
    }
}

/// Connection lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Media is flowing in both directions
    Connected,
    /// The remote participant went away (hang-up, network loss)
    ParticipantLeft { reason: String },
    /// The connection is closed for good; delivered at most once
    Closed,
}

/// Subscriber callback; runs on the transport's event task and must not block
pub type EventHandler = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

/// One caller's media session
#[async_trait]
pub trait PeerConnection: Send + Sync + 'static {
    /// Identifier assigned by the transport, stable across renegotiations
    fn pc_id(&self) -> &str;

    /// Answer the first offer
    async fn initialize(
        &self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, TransportError>;

    /// Answer a later offer on the same connection
    ///
    /// With `restart` the underlying transport is rebuilt; the pc_id, event
    /// subscriptions, inbound audio stream and outbound sink stay valid.
    async fn renegotiate(
        &self,
        offer: &SessionDescription,
        restart: bool,
    ) -> Result<SessionDescription, TransportError>;

    /// Close the connection; safe to call more than once
    async fn disconnect(&self);

    fn is_closed(&self) -> bool;

    /// Register a lifecycle event handler
    fn subscribe(&self, handler: EventHandler);

    /// Inbound audio; yields `Some` only on the first call
    fn take_audio_input(&self) -> Option<mpsc::Receiver<AudioPacket>>;

    /// Outbound audio
    fn audio_output(&self) -> Arc<dyn AudioSink>;
}

/// Creates connections for new callers
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_wire_format() {
        let answer = SessionDescription::answer("v=0");
        let json = serde_json::to_value(&answer).unwrap();

        assert_eq!(json, serde_json::json!({"sdp": "v=0", "type": "answer"}));

        let offer: SessionDescription =
            serde_json::from_str(r#"{"sdp": "v=0", "type": "offer"}"#).unwrap();
        assert!(offer.is_offer());
    }
}
