//! HTTP speech gateway clients
//!
//! Recognition and synthesis run in a sidecar service. Audio crosses the
//! boundary as base64-encoded packets; this crate never decodes audio.
//!
//! - STT: `POST {stt_url}/segments` with a batch of inbound packets. The
//!   gateway keeps per-session state and answers with `{"text": ...}` once it
//!   has detected the end of an utterance.
//! - TTS: `POST {tts_url}/synthesize` with `{text, voice, sample_rate}` and
//!   answers with `{"packets": [...], "frame_ms": N}`.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use receptionist_config::SpeechConfig;
use receptionist_core::{AudioPacket, Error, Result, SpeechToText, TextToSpeech};

#[derive(Debug, Serialize)]
struct SegmentRequest<'a> {
    session_id: &'a str,
    packets: Vec<String>,
    sample_rate: u32,
    #[serde(rename = "final")]
    is_final: bool,
}

#[derive(Debug, Deserialize)]
struct SegmentResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
    sample_rate: u32,
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    packets: Vec<String>,
    #[serde(default = "default_frame_ms")]
    frame_ms: u32,
}

fn default_frame_ms() -> u32 {
    20
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Pipeline(format!("Failed to create HTTP client: {}", e)))
}

/// Speech recognition through the gateway
pub struct GatewaySpeechToText {
    client: reqwest::Client,
    url: String,
    sample_rate: u32,
    segment_ms: u32,
}

impl GatewaySpeechToText {
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/segments", config.stt_url.trim_end_matches('/')),
            sample_rate: config.sample_rate,
            segment_ms: config.segment_ms.max(1),
        })
    }

    async fn send_segment(
        &self,
        session_id: &str,
        packets: &[AudioPacket],
        is_final: bool,
    ) -> Result<Option<String>> {
        let request = SegmentRequest {
            session_id,
            packets: packets.iter().map(|p| BASE64.encode(&p.data)).collect(),
            sample_rate: self.sample_rate,
            is_final,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Stt(format!("STT request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Stt(format!(
                "STT gateway returned error: {}",
                response.status()
            )));
        }

        let body: SegmentResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("Failed to parse STT response: {}", e)))?;

        Ok(body.text.filter(|t| !t.trim().is_empty()))
    }
}

#[async_trait]
impl SpeechToText for GatewaySpeechToText {
    async fn transcribe_stream(
        &self,
        session_id: &str,
        mut audio: mpsc::Receiver<AudioPacket>,
        transcripts: mpsc::Sender<String>,
    ) -> Result<()> {
        let mut segment: Vec<AudioPacket> = Vec::new();
        let mut segment_ms = 0u32;

        while let Some(packet) = audio.recv().await {
            segment_ms = segment_ms.saturating_add(packet.duration_ms);
            segment.push(packet);

            if segment_ms < self.segment_ms {
                continue;
            }

            let batch = std::mem::take(&mut segment);
            segment_ms = 0;

            match self.send_segment(session_id, &batch, false).await {
                Ok(Some(text)) => {
                    if transcripts.send(text).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(None) => {}
                // one lost segment should not end recognition for the call
                Err(e) => tracing::warn!(session_id, error = %e, "STT segment failed"),
            }
        }

        match self.send_segment(session_id, &segment, true).await {
            Ok(Some(text)) => {
                let _ = transcripts.send(text).await;
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(session_id, error = %e, "Final STT segment failed"),
        }

        Ok(())
    }

    fn model_name(&self) -> &str {
        "gateway-stt"
    }
}

/// Speech synthesis through the gateway
pub struct GatewayTextToSpeech {
    client: reqwest::Client,
    url: String,
    voice: String,
    sample_rate: u32,
}

impl GatewayTextToSpeech {
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/synthesize", config.tts_url.trim_end_matches('/')),
            voice: config.voice.clone(),
            sample_rate: config.sample_rate,
        })
    }
}

#[async_trait]
impl TextToSpeech for GatewayTextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<AudioPacket>> {
        let request = SynthesizeRequest {
            text,
            voice: &self.voice,
            sample_rate: self.sample_rate,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Tts(format!("TTS request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Tts(format!(
                "TTS gateway returned error: {}",
                response.status()
            )));
        }

        let body: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| Error::Tts(format!("Failed to parse TTS response: {}", e)))?;

        let mut timestamp_ms = 0u64;
        let mut packets = Vec::with_capacity(body.packets.len());
        for encoded in body.packets {
            let data = BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| Error::Tts(format!("Invalid packet encoding: {}", e)))?;
            packets.push(AudioPacket::new(data, body.frame_ms, timestamp_ms));
            timestamp_ms += u64::from(body.frame_ms);
        }

        Ok(packets)
    }

    fn model_name(&self) -> &str {
        &self.voice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> SpeechConfig {
        SpeechConfig {
            stt_url: server.uri(),
            tts_url: server.uri(),
            segment_ms: 40,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_synthesize_decodes_packets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/synthesize"))
            .and(body_partial_json(serde_json::json!({"text": "Hello."})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "packets": [BASE64.encode(b"ab"), BASE64.encode(b"cd")],
                "frame_ms": 20
            })))
            .mount(&server)
            .await;

        let tts = GatewayTextToSpeech::new(&config(&server)).unwrap();
        let packets = tts.synthesize("Hello.").await.unwrap();

        assert_eq!(packets.len(), 2);
        assert_eq!(&packets[0].data[..], b"ab");
        assert_eq!(packets[1].timestamp_ms, 20);
    }

    #[tokio::test]
    async fn test_synthesize_gateway_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/synthesize"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tts = GatewayTextToSpeech::new(&config(&server)).unwrap();

        assert!(matches!(tts.synthesize("Hi.").await, Err(Error::Tts(_))));
    }

    #[tokio::test]
    async fn test_transcripts_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/segments"))
            .and(body_partial_json(serde_json::json!({"final": false})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "hello"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/segments"))
            .and(body_partial_json(serde_json::json!({"final": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let stt = GatewaySpeechToText::new(&config(&server)).unwrap();
        let (audio_tx, audio_rx) = mpsc::channel(8);
        let (text_tx, mut text_rx) = mpsc::channel(8);

        for i in 0..2 {
            audio_tx
                .send(AudioPacket::new(vec![1u8, 2, 3], 20, i * 20))
                .await
                .unwrap();
        }
        drop(audio_tx);

        stt.transcribe_stream("s1", audio_rx, text_tx).await.unwrap();

        assert_eq!(text_rx.recv().await.as_deref(), Some("hello"));
        assert_eq!(text_rx.recv().await, None);
    }
}
