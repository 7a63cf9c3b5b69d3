//! Encoded audio packets
//!
//! The pipeline never decodes audio. Packets carry whatever the transport
//! negotiated (Opus for WebRTC) between the connection and the speech
//! collaborators.

use bytes::Bytes;

/// One encoded audio packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    /// Encoded payload
    pub data: Bytes,
    /// Playback duration of this packet
    pub duration_ms: u32,
    /// Media timestamp in milliseconds
    pub timestamp_ms: u64,
}

impl AudioPacket {
    /// Create a packet
    pub fn new(data: impl Into<Bytes>, duration_ms: u32, timestamp_ms: u64) -> Self {
        Self {
            data: data.into(),
            duration_ms,
            timestamp_ms,
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
