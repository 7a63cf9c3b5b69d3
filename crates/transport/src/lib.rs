//! Real-time transport for the voice receptionist
//!
//! A [`PeerConnection`] is one caller's media session: it answers SDP
//! offers, exposes inbound audio as a packet stream and outbound audio as an
//! [`receptionist_core::AudioSink`], and reports lifecycle changes through
//! typed [`ConnectionEvent`] subscriptions.

pub mod connection;
pub mod webrtc;

pub use connection::{
    ConnectionEvent, ConnectionFactory, EventHandler, PeerConnection, SessionDescription,
};
pub use webrtc::{WebRtcConnection, WebRtcConnectionFactory};

use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid session description: {0}")]
    InvalidDescription(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Connection closed")]
    Closed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransportError> for receptionist_core::Error {
    fn from(err: TransportError) -> Self {
        receptionist_core::Error::Pipeline(err.to_string())
    }
}
