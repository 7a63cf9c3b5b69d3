//! Live call session

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use receptionist_pipeline::{ConversationStarter, PipelineTask};
use receptionist_transport::{PeerConnection, SessionDescription};

use crate::ServerError;

/// How long a closing session waits for its pipeline tasks
const PIPELINE_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One caller: the connection and the pipeline driving it
pub struct Session {
    pc_id: String,
    connection: Arc<dyn PeerConnection>,
    pipeline: PipelineTask,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(connection: Arc<dyn PeerConnection>, pipeline: PipelineTask) -> Self {
        Self {
            pc_id: connection.pc_id().to_string(),
            connection,
            pipeline,
            created_at: Utc::now(),
        }
    }

    pub fn pc_id(&self) -> &str {
        &self.pc_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn connection(&self) -> &Arc<dyn PeerConnection> {
        &self.connection
    }

    pub fn pipeline(&self) -> &PipelineTask {
        &self.pipeline
    }

    /// Answer a new offer on the existing connection; the pipeline is kept
    pub async fn renegotiate(
        &self,
        offer: &SessionDescription,
        restart: bool,
    ) -> Result<SessionDescription, ServerError> {
        Ok(self.connection.renegotiate(offer, restart).await?)
    }

    /// Greeting for this call, usable after the session lock is released
    pub fn greeting(&self) -> Greeting {
        Greeting {
            pc_id: self.pc_id.clone(),
            starter: self.pipeline.conversation_starter(),
        }
    }

    /// Stop the pipeline and disconnect
    pub async fn close(self) {
        self.pipeline.cancel();
        self.connection.disconnect().await;

        if tokio::time::timeout(PIPELINE_JOIN_TIMEOUT, self.pipeline.join())
            .await
            .is_err()
        {
            tracing::warn!(pc_id = %self.pc_id, "Pipeline did not stop in time");
        }

        let lifetime = Utc::now() - self.created_at;
        tracing::info!(
            pc_id = %self.pc_id,
            duration_secs = lifetime.num_seconds(),
            "Session closed"
        );
    }
}

/// The bot greeting, queued once the caller is connected
pub struct Greeting {
    pc_id: String,
    starter: ConversationStarter,
}

impl Greeting {
    /// May wait for room in the pipeline input
    pub async fn send(self) {
        match self.starter.start().await {
            Ok(true) => tracing::info!(pc_id = %self.pc_id, "Conversation started"),
            Ok(false) => {}
            Err(e) => tracing::warn!(pc_id = %self.pc_id, error = %e, "Failed to start conversation"),
        }
    }
}
