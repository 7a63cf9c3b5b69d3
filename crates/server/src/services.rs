//! Per-session pipeline wiring
//!
//! Collaborators (model, speech, tools, retrieval) are created once at
//! startup and shared; every session gets its own chain, since the model
//! stage and the sentence aggregator keep per-session state.

use std::sync::Arc;
use std::time::Duration;

use receptionist_config::{SessionConfig, Settings};
use receptionist_core::{LanguageModel, SpeechToText, TextToSpeech, ToolInvoker};
use receptionist_llm::{OpenAIBackend, OpenAIConfig};
use receptionist_persistence::PersistenceLayer;
use receptionist_pipeline::{
    GatewaySpeechToText, GatewayTextToSpeech, ModelStage, ModelStageConfig, PipelineIo,
    PipelineTask, ProcessorChain, SanitizerStage, SentenceAggregator, SynthesisStage,
    TranscriptStage,
};
use receptionist_rag::{
    EmbeddingProvider, OpenAIEmbedder, RetrievalAugmenter, RetrieverConfig, SimilaritySearch,
    SupabaseVectorStore,
};
use receptionist_tools::{BookAppointmentTool, ToolDispatcher, ToolHandler};
use receptionist_transport::PeerConnection;

use crate::ServerError;

/// Starts the pipeline for a freshly initialized connection
pub trait PipelineFactory: Send + Sync + 'static {
    fn start(
        &self,
        pc_id: &str,
        connection: &dyn PeerConnection,
    ) -> Result<PipelineTask, ServerError>;
}

/// Shared collaborators for all sessions of one company
pub struct SessionServices {
    pub config: Arc<SessionConfig>,
    pub retriever: RetrieverConfig,
    pub max_tool_rounds: usize,
    pub channel_capacity: usize,
    pub llm: Arc<dyn LanguageModel>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub tools: Arc<dyn ToolInvoker>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub search: Arc<dyn SimilaritySearch>,
}

impl SessionServices {
    /// Create the HTTP-backed collaborators
    pub fn init(
        settings: &Settings,
        config: Arc<SessionConfig>,
        persistence: &PersistenceLayer,
    ) -> Result<Self, ServerError> {
        let llm = OpenAIBackend::new(OpenAIConfig::from_settings(
            &settings.llm,
            config.api_key.clone(),
            config.model.clone(),
        ))
        .map_err(|e| ServerError::Internal(e.to_string()))?;

        let stt = GatewaySpeechToText::new(&settings.speech)
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        let tts = GatewayTextToSpeech::new(&settings.speech)
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        let booking: Arc<dyn ToolHandler> = Arc::new(BookAppointmentTool::new(
            config.company_id,
            Arc::new(persistence.appointments.clone()),
        ));
        let tools = ToolDispatcher::new(config.tools.clone(), vec![booking])
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        let embedder = OpenAIEmbedder::new(
            &settings.rag.embedding_base_url,
            config.retrieval.embedding_model.clone(),
            Duration::from_secs(settings.rag.timeout_secs),
        )
        .map_err(|e| ServerError::Internal(e.to_string()))?;
        let search = SupabaseVectorStore::new(persistence.client.clone());

        tracing::info!(
            company_id = config.company_id,
            model = %config.model,
            retrieval = config.retrieval.enabled,
            tools = ?config.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "Session services ready"
        );

        Ok(Self {
            retriever: RetrieverConfig::from_session(&config),
            max_tool_rounds: settings.llm.max_tool_rounds,
            channel_capacity: settings.pipeline.channel_capacity,
            config,
            llm: Arc::new(llm),
            stt: Arc::new(stt),
            tts: Arc::new(tts),
            tools: Arc::new(tools),
            embedder: Arc::new(embedder),
            search: Arc::new(search),
        })
    }

    /// transcript → retrieval → model/tools → sanitizer → aggregator → synthesis
    pub fn build_chain(&self) -> ProcessorChain {
        ProcessorChain::builder("session")
            .channel_capacity(self.channel_capacity)
            .processor(TranscriptStage::new())
            .processor(RetrievalAugmenter::new(
                Arc::clone(&self.embedder),
                Arc::clone(&self.search),
                self.retriever.clone(),
            ))
            .processor(ModelStage::new(
                Arc::clone(&self.llm),
                Arc::clone(&self.tools),
                ModelStageConfig {
                    system_prompt: self.config.system_prompt.clone(),
                    max_tool_rounds: self.max_tool_rounds,
                },
            ))
            .processor(SanitizerStage::new())
            .processor(SentenceAggregator::new())
            .processor(SynthesisStage::new(Arc::clone(&self.tts)))
            .build()
    }
}

impl PipelineFactory for SessionServices {
    fn start(
        &self,
        pc_id: &str,
        connection: &dyn PeerConnection,
    ) -> Result<PipelineTask, ServerError> {
        let audio_in = connection.take_audio_input().ok_or_else(|| {
            ServerError::Pipeline(format!("audio input of {} already taken", pc_id))
        })?;

        let chain = self.build_chain();
        Ok(PipelineTask::spawn(
            &chain,
            pc_id,
            PipelineIo {
                stt: Arc::clone(&self.stt),
                audio_in,
                audio_out: connection.audio_output(),
                observer: Some(crate::metrics::frame_observer()),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use receptionist_config::{CompanyProfile, DatabaseConfig};
    use receptionist_tools::default_definitions;

    fn services() -> SessionServices {
        let mut settings = Settings::default();
        settings.database = DatabaseConfig {
            url: "http://localhost:54321".into(),
            anon_key: "anon".into(),
            ..Default::default()
        };
        let company = CompanyProfile {
            id: 3,
            name: "Acme Dental".into(),
            openai_api_key: "sk-test".into(),
            system_prompt: "You are the Acme Dental receptionist.".into(),
            llm_model: "gpt-4o-mini".into(),
            rag_system_instructions: None,
        };
        let config =
            SessionConfig::resolve(&company, &settings, default_definitions()).unwrap();
        let persistence = receptionist_persistence::init(&settings.database).unwrap();

        SessionServices::init(&settings, Arc::new(config), &persistence).unwrap()
    }

    #[test]
    fn test_chain_order() {
        let chain = services().build_chain();

        assert_eq!(
            chain.stage_names(),
            vec![
                "transcript",
                "retrieval",
                "model",
                "sanitizer",
                "sentence_aggregator",
                "synthesis"
            ]
        );
    }

    #[test]
    fn test_tools_published() {
        let services = services();

        let names: Vec<_> = services
            .tools
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["book_appointment"]);
    }
}
