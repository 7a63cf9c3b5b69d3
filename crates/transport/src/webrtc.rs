//! WebRTC transport
//!
//! Features:
//! - Opus audio in both directions, passed through without transcoding
//! - ICE/STUN/TURN from settings, answers carry the gathered candidates
//! - Renegotiation on the same connection, with optional full restart
//! - Paced outbound audio so packets leave at playback rate

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::time::Instant;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use receptionist_config::WebRtcSettings;
use receptionist_core::{AudioPacket, AudioSink};

use crate::connection::{
    ConnectionEvent, ConnectionFactory, EventHandler, PeerConnection, SessionDescription,
};
use crate::TransportError;

const OPUS_MIME_TYPE: &str = "audio/opus";
const OPUS_CLOCK_RATE: u32 = 48000;
const OPUS_PAYLOAD_TYPE: u8 = 111;
/// Inbound packets are assumed to use the default Opus packet time
const INBOUND_PACKET_MS: u32 = 20;
const INBOUND_AUDIO_CAPACITY: usize = 100;

fn opus_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: OPUS_MIME_TYPE.to_string(),
        clock_rate: OPUS_CLOCK_RATE,
        channels: 2,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
        rtcp_feedback: vec![],
    }
}

/// Create WebRTC API with media engine
fn build_api() -> Result<API, TransportError> {
    let mut media_engine = MediaEngine::default();

    media_engine
        .register_codec(
            RTCRtpCodecParameters {
                capability: opus_capability(),
                payload_type: OPUS_PAYLOAD_TYPE,
                stats_id: String::new(),
            },
            RTPCodecType::Audio,
        )
        .map_err(|e| TransportError::Internal(e.to_string()))?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)
        .map_err(|e| TransportError::Internal(e.to_string()))?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .with_setting_engine(SettingEngine::default())
        .build())
}

fn rtc_configuration(settings: &WebRtcSettings) -> RTCConfiguration {
    let ice_servers = settings
        .ice_servers
        .iter()
        .map(|s| RTCIceServer {
            urls: s.urls.clone(),
            username: s.username.clone().unwrap_or_default(),
            credential: s.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect();

    RTCConfiguration {
        ice_servers,
        ..Default::default()
    }
}

/// Creates [`WebRtcConnection`]s sharing one media engine
pub struct WebRtcConnectionFactory {
    api: Arc<API>,
    rtc_config: RTCConfiguration,
    gathering_timeout: Duration,
}

impl WebRtcConnectionFactory {
    pub fn new(settings: &WebRtcSettings) -> Result<Self, TransportError> {
        Ok(Self {
            api: Arc::new(build_api()?),
            rtc_config: rtc_configuration(settings),
            gathering_timeout: Duration::from_secs(settings.ice_gathering_timeout_secs),
        })
    }
}

#[async_trait]
impl ConnectionFactory for WebRtcConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>, TransportError> {
        let connection = WebRtcConnection::new(
            Arc::clone(&self.api),
            self.rtc_config.clone(),
            self.gathering_timeout,
        );
        tracing::debug!(pc_id = %connection.pc_id, "Peer connection created");
        Ok(Arc::new(connection))
    }
}

/// State shared with webrtc callbacks
struct Shared {
    pc_id: String,
    handlers: RwLock<Vec<EventHandler>>,
    closed: AtomicBool,
    /// Bumped whenever the underlying peer is rebuilt; callbacks from older
    /// peers are ignored
    generation: AtomicU64,
}

impl Shared {
    fn emit(&self, event: ConnectionEvent) {
        if event == ConnectionEvent::Closed && self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(pc_id = %self.pc_id, event = ?event, "Connection event");

        let handlers = self.handlers.read().clone();
        for handler in handlers {
            handler(event.clone());
        }
    }
}

/// WebRTC peer connection
pub struct WebRtcConnection {
    api: Arc<API>,
    rtc_config: RTCConfiguration,
    gathering_timeout: Duration,
    pc_id: String,
    shared: Arc<Shared>,
    peer: tokio::sync::Mutex<Option<Arc<RTCPeerConnection>>>,
    track: Arc<TrackLocalStaticSample>,
    sink: Arc<WebRtcAudioSink>,
    audio_tx: Mutex<Option<mpsc::Sender<AudioPacket>>>,
    audio_rx: Mutex<Option<mpsc::Receiver<AudioPacket>>>,
}

impl WebRtcConnection {
    fn new(api: Arc<API>, rtc_config: RTCConfiguration, gathering_timeout: Duration) -> Self {
        let pc_id = format!("pc-{}", uuid::Uuid::new_v4());
        let shared = Arc::new(Shared {
            pc_id: pc_id.clone(),
            handlers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        });

        let track = Arc::new(TrackLocalStaticSample::new(
            opus_capability(),
            "audio".to_string(),
            "receptionist".to_string(),
        ));
        let sink = Arc::new(WebRtcAudioSink::new(Arc::clone(&track), Arc::clone(&shared)));
        let (audio_tx, audio_rx) = mpsc::channel(INBOUND_AUDIO_CAPACITY);

        Self {
            api,
            rtc_config,
            gathering_timeout,
            pc_id,
            shared,
            peer: tokio::sync::Mutex::new(None),
            track,
            sink,
            audio_tx: Mutex::new(Some(audio_tx)),
            audio_rx: Mutex::new(Some(audio_rx)),
        }
    }

    /// Build a fresh RTCPeerConnection wired to this connection's track,
    /// inbound channel and subscribers
    async fn build_peer(&self) -> Result<Arc<RTCPeerConnection>, TransportError> {
        let audio_tx = self.audio_tx.lock().clone().ok_or(TransportError::Closed)?;
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let pc = Arc::new(
            self.api
                .new_peer_connection(self.rtc_config.clone())
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?,
        );

        let sender = pc
            .add_track(Arc::clone(&self.track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| TransportError::Media(format!("Failed to add audio track: {}", e)))?;

        // RTCP has to be drained for the interceptors to work
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });

        let shared = Arc::clone(&self.shared);
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let shared = Arc::clone(&shared);
            Box::pin(async move {
                if shared.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                tracing::debug!(pc_id = %shared.pc_id, state = %state, "Peer connection state changed");
                match state {
                    RTCPeerConnectionState::Connected => shared.emit(ConnectionEvent::Connected),
                    RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                        shared.emit(ConnectionEvent::ParticipantLeft {
                            reason: state.to_string(),
                        })
                    }
                    RTCPeerConnectionState::Closed => shared.emit(ConnectionEvent::Closed),
                    _ => {}
                }
            })
        }));

        let pc_id = self.pc_id.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let audio_tx = audio_tx.clone();
            let pc_id = pc_id.clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Audio {
                    return;
                }
                tracing::info!(pc_id = %pc_id, ssrc = track.ssrc(), "Inbound audio track");
                forward_track(&pc_id, track, audio_tx).await;
            })
        }));

        Ok(pc)
    }

    async fn negotiate(
        &self,
        pc: &RTCPeerConnection,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        if !offer.is_offer() {
            return Err(TransportError::InvalidDescription(format!(
                "expected an offer, got '{}'",
                offer.sdp_type
            )));
        }

        let remote = RTCSessionDescription::offer(offer.sdp.clone())
            .map_err(|e| TransportError::InvalidDescription(e.to_string()))?;
        pc.set_remote_description(remote)
            .await
            .map_err(|e| TransportError::InvalidDescription(e.to_string()))?;

        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let mut gathered = pc.gathering_complete_promise().await;
        pc.set_local_description(answer)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if tokio::time::timeout(self.gathering_timeout, gathered.recv())
            .await
            .is_err()
        {
            tracing::warn!(
                pc_id = %self.pc_id,
                timeout_secs = self.gathering_timeout.as_secs(),
                "ICE gathering timed out, answering with partial candidates"
            );
        }

        let local = pc.local_description().await.ok_or_else(|| {
            TransportError::ConnectionFailed("no local description after answer".to_string())
        })?;

        Ok(SessionDescription::answer(local.sdp))
    }
}

async fn forward_track(pc_id: &str, track: Arc<TrackRemote>, audio_tx: mpsc::Sender<AudioPacket>) {
    loop {
        match track.read_rtp().await {
            Ok((packet, _)) => {
                if packet.payload.is_empty() {
                    continue;
                }
                let timestamp_ms =
                    u64::from(packet.header.timestamp) * 1000 / u64::from(OPUS_CLOCK_RATE);
                let audio = AudioPacket::new(packet.payload, INBOUND_PACKET_MS, timestamp_ms);
                if audio_tx.send(audio).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(pc_id, error = %e, "Inbound track ended");
                break;
            }
        }
    }
}

#[async_trait]
impl PeerConnection for WebRtcConnection {
    fn pc_id(&self) -> &str {
        &self.pc_id
    }

    async fn initialize(
        &self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let mut peer = self.peer.lock().await;
        if peer.is_some() {
            return Err(TransportError::ConnectionFailed(
                "connection already initialized".to_string(),
            ));
        }

        let pc = self.build_peer().await?;
        match self.negotiate(&pc, offer).await {
            Ok(answer) => {
                *peer = Some(pc);
                tracing::info!(pc_id = %self.pc_id, "Peer connection initialized");
                Ok(answer)
            }
            Err(e) => {
                let _ = pc.close().await;
                Err(e)
            }
        }
    }

    async fn renegotiate(
        &self,
        offer: &SessionDescription,
        restart: bool,
    ) -> Result<SessionDescription, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let mut peer = self.peer.lock().await;

        if restart || peer.is_none() {
            let fresh = self.build_peer().await?;
            if let Some(old) = peer.replace(fresh) {
                if let Err(e) = old.close().await {
                    tracing::debug!(pc_id = %self.pc_id, error = %e, "Closing replaced peer failed");
                }
            }
            tracing::info!(pc_id = %self.pc_id, "Peer connection restarted");
        }

        let pc = peer.as_ref().map(Arc::clone).ok_or(TransportError::Closed)?;
        let answer = self.negotiate(&pc, offer).await?;
        tracing::info!(pc_id = %self.pc_id, restart, "Peer connection renegotiated");
        Ok(answer)
    }

    async fn disconnect(&self) {
        let pc = self.peer.lock().await.take();
        self.audio_tx.lock().take();

        if let Some(pc) = pc {
            if let Err(e) = pc.close().await {
                tracing::warn!(pc_id = %self.pc_id, error = %e, "Error closing peer connection");
            }
        }

        self.shared.emit(ConnectionEvent::Closed);
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn subscribe(&self, handler: EventHandler) {
        self.shared.handlers.write().push(handler);
    }

    fn take_audio_input(&self) -> Option<mpsc::Receiver<AudioPacket>> {
        self.audio_rx.lock().take()
    }

    fn audio_output(&self) -> Arc<dyn AudioSink> {
        Arc::clone(&self.sink) as Arc<dyn AudioSink>
    }
}

/// Outbound audio, paced at playback rate
pub struct WebRtcAudioSink {
    track: Arc<TrackLocalStaticSample>,
    shared: Arc<Shared>,
    /// When the next packet is due on the wire
    next_due: Mutex<Option<Instant>>,
}

impl WebRtcAudioSink {
    fn new(track: Arc<TrackLocalStaticSample>, shared: Arc<Shared>) -> Self {
        Self {
            track,
            shared,
            next_due: Mutex::new(None),
        }
    }

    /// Reserve a send slot for a packet of `duration`
    fn schedule(&self, duration: Duration) -> Instant {
        let now = Instant::now();
        let mut next_due = self.next_due.lock();
        let due = match *next_due {
            Some(due) if due > now => due,
            _ => now,
        };
        *next_due = Some(due + duration);
        due
    }
}

#[async_trait]
impl AudioSink for WebRtcAudioSink {
    async fn write(&self, packet: &AudioPacket) -> receptionist_core::Result<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(receptionist_core::Error::ChannelClosed("audio output"));
        }

        let duration = Duration::from_millis(u64::from(packet.duration_ms));
        tokio::time::sleep_until(self.schedule(duration)).await;

        let sample = Sample {
            data: packet.data.clone(),
            duration,
            ..Default::default()
        };
        self.track
            .write_sample(&sample)
            .await
            .map_err(|e| TransportError::Media(format!("Failed to write sample: {}", e)))?;

        Ok(())
    }
}
