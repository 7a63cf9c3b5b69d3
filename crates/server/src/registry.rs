//! Session registry
//!
//! Maps pc_id to the live session. Every entry is a slot guarded by its own
//! async mutex, so offers and closes on one pc_id run one at a time while
//! distinct pc_ids never contend. A slot is inserted (locked) before the
//! connection is initialized and only filled once the pipeline is running;
//! an empty slot therefore means "being created" or "already torn down".

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use receptionist_transport::{ConnectionEvent, ConnectionFactory, SessionDescription};

use crate::metrics;
use crate::services::PipelineFactory;
use crate::session::Session;
use crate::ServerError;

type Slot = Arc<Mutex<Option<Session>>>;

/// Signaling request body
#[derive(Debug, Clone, Deserialize)]
pub struct Offer {
    #[serde(default)]
    pub pc_id: Option<String>,
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
    #[serde(default)]
    pub restart_pc: Option<bool>,
}

impl Offer {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self {
            pc_id: None,
            sdp: sdp.into(),
            sdp_type: "offer".to_string(),
            restart_pc: None,
        }
    }

    pub fn with_pc_id(mut self, pc_id: impl Into<String>) -> Self {
        self.pc_id = Some(pc_id.into());
        self
    }

    pub fn with_restart(mut self, restart: bool) -> Self {
        self.restart_pc = Some(restart);
        self
    }

    fn description(&self) -> SessionDescription {
        SessionDescription {
            sdp: self.sdp.clone(),
            sdp_type: self.sdp_type.clone(),
        }
    }
}

/// Signaling response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub pc_id: String,
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
}

impl Answer {
    fn new(pc_id: impl Into<String>, description: SessionDescription) -> Self {
        Self {
            pc_id: pc_id.into(),
            sdp: description.sdp,
            sdp_type: description.sdp_type,
        }
    }
}

/// Owner of all live sessions
pub struct SessionRegistry {
    sessions: DashMap<String, Slot>,
    factory: Arc<dyn ConnectionFactory>,
    pipelines: Arc<dyn PipelineFactory>,
}

impl SessionRegistry {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        pipelines: Arc<dyn PipelineFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            factory,
            pipelines,
        })
    }

    /// Number of registered pc_ids, including sessions still being set up
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, pc_id: &str) -> bool {
        self.sessions.contains_key(pc_id)
    }

    pub fn pc_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    fn slot(&self, pc_id: &str) -> Option<Slot> {
        self.sessions.get(pc_id).map(|e| Arc::clone(e.value()))
    }

    /// Remove `pc_id` only if it still maps to `slot`
    fn remove_slot(&self, pc_id: &str, slot: &Slot) {
        self.sessions.remove_if(pc_id, |_, s| Arc::ptr_eq(s, slot));
        metrics::record_sessions_active(self.sessions.len());
    }

    /// Answer a signaling offer
    ///
    /// A known pc_id renegotiates the existing connection and keeps its
    /// pipeline. A missing or unknown pc_id starts a new session.
    pub async fn handle_offer(self: &Arc<Self>, offer: Offer) -> Result<Answer, ServerError> {
        let description = offer.description();
        if !description.is_offer() {
            return Err(ServerError::InvalidRequest(format!(
                "expected an offer, got '{}'",
                description.sdp_type
            )));
        }
        if description.sdp.trim().is_empty() {
            return Err(ServerError::InvalidRequest("empty sdp".to_string()));
        }

        if let Some(pc_id) = offer.pc_id.as_deref() {
            match self.slot(pc_id) {
                Some(slot) => {
                    let guard = slot.lock().await;
                    if let Some(session) = guard.as_ref() {
                        let restart = offer.restart_pc.unwrap_or(false);
                        tracing::info!(pc_id, restart, "Renegotiating connection");

                        let result = session.renegotiate(&description, restart).await;
                        metrics::record_renegotiation(restart, result.is_ok());
                        return result.map(|answer| Answer::new(pc_id, answer));
                    }
                    tracing::info!(pc_id, "Session went away during offer, creating new one");
                }
                None => {
                    tracing::info!(pc_id, "Unknown pc_id, creating new session");
                }
            }
        }

        let result = self.create_session(&description).await;
        metrics::record_offer(result.is_ok());
        result
    }

    async fn create_session(
        self: &Arc<Self>,
        offer: &SessionDescription,
    ) -> Result<Answer, ServerError> {
        let connection = self.factory.create().await?;
        let pc_id = connection.pc_id().to_string();

        let slot: Slot = Arc::new(Mutex::new(None));
        let mut guard = Arc::clone(&slot).lock_owned().await;
        self.sessions.insert(pc_id.clone(), Arc::clone(&slot));

        let registry = Arc::downgrade(self);
        let event_pc_id = pc_id.clone();
        connection.subscribe(Arc::new(move |event: ConnectionEvent| {
            if let Some(registry) = registry.upgrade() {
                let pc_id = event_pc_id.clone();
                tokio::spawn(async move { registry.handle_event(&pc_id, event).await });
            }
        }));

        let setup = async {
            let answer = connection.initialize(offer).await?;
            let pipeline = self.pipelines.start(&pc_id, connection.as_ref())?;
            Ok::<_, ServerError>((answer, pipeline))
        }
        .await;

        let (answer, pipeline) = match setup {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(pc_id = %pc_id, error = %e, "Session setup failed");
                self.remove_slot(&pc_id, &slot);
                drop(guard);
                connection.disconnect().await;
                return Err(e);
            }
        };

        let session = Session::new(Arc::clone(&connection), pipeline);
        if connection.is_closed() {
            tracing::warn!(pc_id = %pc_id, "Connection closed during setup");
            self.remove_slot(&pc_id, &slot);
            drop(guard);
            session.close().await;
            return Err(ServerError::ConnectionGone(pc_id));
        }

        *guard = Some(session);
        drop(guard);
        metrics::record_sessions_active(self.sessions.len());
        tracing::info!(pc_id = %pc_id, sessions = self.sessions.len(), "Session created");

        Ok(Answer::new(pc_id, answer))
    }

    async fn handle_event(&self, pc_id: &str, event: ConnectionEvent) {
        tracing::debug!(pc_id, event = ?event, "Connection event");

        match event {
            ConnectionEvent::Connected => {
                let Some(slot) = self.slot(pc_id) else {
                    return;
                };
                // queued outside the lock, a full pipeline must not stall signaling
                let greeting = slot.lock().await.as_ref().map(Session::greeting);
                if let Some(greeting) = greeting {
                    greeting.send().await;
                }
            }
            ConnectionEvent::ParticipantLeft { reason } => {
                tracing::info!(pc_id, reason = %reason, "Participant left");
                let Some(slot) = self.slot(pc_id) else {
                    return;
                };
                let connection = {
                    let guard = slot.lock().await;
                    guard.as_ref().map(|session| {
                        session.pipeline().cancel();
                        Arc::clone(session.connection())
                    })
                };
                // Disconnecting emits Closed, which tears the session down
                if let Some(connection) = connection {
                    connection.disconnect().await;
                }
            }
            ConnectionEvent::Closed => {
                self.on_closed(pc_id).await;
            }
        }
    }

    /// Tear down the session for `pc_id`
    ///
    /// Returns `false` when there was nothing to tear down.
    pub async fn on_closed(&self, pc_id: &str) -> bool {
        let Some(slot) = self.slot(pc_id) else {
            return false;
        };

        let session = slot.lock().await.take();
        self.remove_slot(pc_id, &slot);

        match session {
            Some(session) => {
                tracing::info!(pc_id, sessions = self.sessions.len(), "Removing session");
                session.close().await;
                true
            }
            None => false,
        }
    }

    /// Disconnect every session and wait for all of them
    pub async fn shutdown(&self) {
        let slots: Vec<Slot> = self
            .sessions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        self.sessions.clear();
        metrics::record_sessions_active(0);

        tracing::info!(sessions = slots.len(), "Shutting down sessions");

        futures::future::join_all(slots.into_iter().map(|slot| async move {
            let session = slot.lock().await.take();
            if let Some(session) = session {
                session.close().await;
            }
        }))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_wire_format() {
        let offer: Offer = serde_json::from_str(
            r#"{"pc_id": "pc-1", "sdp": "v=0", "type": "offer", "restart_pc": true}"#,
        )
        .unwrap();
        assert_eq!(offer.pc_id.as_deref(), Some("pc-1"));
        assert_eq!(offer.restart_pc, Some(true));

        let first: Offer = serde_json::from_str(r#"{"sdp": "v=0", "type": "offer"}"#).unwrap();
        assert!(first.pc_id.is_none());
        assert!(first.restart_pc.is_none());
    }

    #[test]
    fn test_answer_wire_format() {
        let answer = Answer::new("pc-1", SessionDescription::answer("v=0"));

        assert_eq!(
            serde_json::to_value(&answer).unwrap(),
            serde_json::json!({"pc_id": "pc-1", "sdp": "v=0", "type": "answer"})
        );
    }
}
