//! Retrieval augmentation stage
//!
//! On every `ModelRequest` the stage embeds the utterance, searches the
//! company knowledge base and, when anything relevant comes back, prepends
//! a context block. A request without results, or whose retrieval failed,
//! is forwarded untouched. Each request triggers exactly one retrieval;
//! failures are classified for logs and metrics but never retried.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use receptionist_config::SessionConfig;
use receptionist_core::{Frame, FrameProcessor, ProcessorContext, Result};

use crate::context::{augment, select_chunks};
use crate::embeddings::EmbeddingProvider;
use crate::vector_store::{RetrievalChunk, SimilaritySearch};
use crate::RagError;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Skip retrieval entirely when false
    pub enabled: bool,
    /// Tenant whose knowledge base is searched
    pub company_id: i64,
    /// Credential used for embeddings
    pub api_key: String,
    /// Minimum similarity
    pub threshold: f32,
    /// Maximum chunks per request
    pub count: usize,
}

impl RetrieverConfig {
    pub fn from_session(session: &SessionConfig) -> Self {
        Self {
            enabled: session.retrieval.enabled,
            company_id: session.company_id,
            api_key: session.api_key.clone(),
            threshold: session.retrieval.threshold,
            count: session.retrieval.count,
        }
    }
}

/// Prepends retrieved knowledge to user requests
pub struct RetrievalAugmenter {
    embedder: Arc<dyn EmbeddingProvider>,
    search: Arc<dyn SimilaritySearch>,
    config: RetrieverConfig,
}

impl RetrievalAugmenter {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        search: Arc<dyn SimilaritySearch>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            embedder,
            search,
            config,
        }
    }

    /// Embed then search, a single attempt
    pub async fn retrieve(&self, text: &str) -> std::result::Result<Vec<RetrievalChunk>, RagError> {
        let embedding = self.embedder.embed(text, &self.config.api_key).await?;
        self.search
            .search(
                &embedding,
                self.config.company_id,
                self.config.threshold,
                self.config.count,
            )
            .await
    }
}

#[async_trait]
impl FrameProcessor for RetrievalAugmenter {
    async fn process(&self, frame: Frame, context: &mut ProcessorContext) -> Result<Vec<Frame>> {
        let text = match frame {
            Frame::ModelRequest { text } if self.config.enabled => text,
            other => return Ok(vec![other]),
        };

        let started = Instant::now();
        let chunks = match self.retrieve(&text).await {
            Ok(chunks) => select_chunks(chunks, self.config.threshold, self.config.count),
            Err(e) => {
                tracing::warn!(
                    session_id = %context.session_id,
                    class = e.class(),
                    error = %e,
                    "Retrieval failed, continuing without context"
                );
                metrics::counter!("receptionist_retrieval_failures_total", "class" => e.class())
                    .increment(1);
                Vec::new()
            }
        };
        metrics::histogram!("receptionist_retrieval_seconds").record(started.elapsed().as_secs_f64());

        if chunks.is_empty() {
            tracing::debug!(session_id = %context.session_id, "No relevant chunks");
            return Ok(vec![Frame::ModelRequest { text }]);
        }

        tracing::info!(
            session_id = %context.session_id,
            chunks = chunks.len(),
            "Augmented request with retrieved context"
        );

        Ok(vec![Frame::ModelRequest {
            text: augment(&text, &chunks),
        }])
    }

    fn name(&self) -> &'static str {
        "retrieval"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use receptionist_persistence::PersistenceError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEmbedder {
        calls: AtomicUsize,
        failures: Mutex<VecDeque<RagError>>,
    }

    impl FixedEmbedder {
        fn new(failures: Vec<RagError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures: Mutex::new(failures.into()),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str, credential: &str) -> std::result::Result<Vec<f32>, RagError> {
            assert_eq!(credential, "sk-co");
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures.lock().pop_front() {
                Some(e) => Err(e),
                None => Ok(vec![0.5; 4]),
            }
        }
    }

    struct FixedSearch(Vec<RetrievalChunk>);

    #[async_trait]
    impl SimilaritySearch for FixedSearch {
        async fn search(
            &self,
            _embedding: &[f32],
            tenant_id: i64,
            _threshold: f32,
            _count: usize,
        ) -> std::result::Result<Vec<RetrievalChunk>, RagError> {
            assert_eq!(tenant_id, 12);
            Ok(self.0.clone())
        }
    }

    fn config() -> RetrieverConfig {
        RetrieverConfig {
            enabled: true,
            company_id: 12,
            api_key: "sk-co".into(),
            threshold: 0.7,
            count: 3,
        }
    }

    fn chunk(text: &str, similarity: f32) -> RetrievalChunk {
        RetrievalChunk {
            text: text.into(),
            similarity,
            file_name: "faq.pdf".into(),
            chunk_index: Some(0),
        }
    }

    async fn run(stage: &RetrievalAugmenter, text: &str) -> Vec<Frame> {
        let mut ctx = ProcessorContext::new("s");
        stage
            .process(Frame::ModelRequest { text: text.into() }, &mut ctx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_zero_chunks_forwards_identical_text() {
        let stage = RetrievalAugmenter::new(
            Arc::new(FixedEmbedder::new(vec![])),
            Arc::new(FixedSearch(vec![])),
            config(),
        );
        let text = "Do you take walk-ins?  ";

        let out = run(&stage, text).await;

        assert_eq!(out, vec![Frame::ModelRequest { text: text.into() }]);
    }

    #[tokio::test]
    async fn test_chunks_prepended() {
        let stage = RetrievalAugmenter::new(
            Arc::new(FixedEmbedder::new(vec![])),
            Arc::new(FixedSearch(vec![chunk("Walk-ins welcome.", 0.88)])),
            config(),
        );

        let out = run(&stage, "Do you take walk-ins?").await;

        match &out[..] {
            [Frame::ModelRequest { text }] => {
                assert!(text.contains("[Source 1: faq.pdf (relevance: 0.88)]"));
                assert!(text.ends_with("User question: Do you take walk-ins?"));
            }
            other => panic!("unexpected frames: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_results_below_threshold_ignored() {
        let stage = RetrievalAugmenter::new(
            Arc::new(FixedEmbedder::new(vec![])),
            Arc::new(FixedSearch(vec![chunk("noise", 0.2)])),
            config(),
        );

        let out = run(&stage, "hi").await;

        assert_eq!(out, vec![Frame::ModelRequest { text: "hi".into() }]);
    }

    #[tokio::test]
    async fn test_transient_failure_single_attempt() {
        let embedder = Arc::new(FixedEmbedder::new(vec![RagError::EmbeddingRequest(
            "timeout".into(),
        )]));
        let stage = RetrievalAugmenter::new(
            embedder.clone(),
            Arc::new(FixedSearch(vec![chunk("Walk-ins welcome.", 0.88)])),
            config(),
        );

        let out = run(&stage, "walk-ins?").await;

        // a later attempt would have succeeded, but the turn gets only one
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out, vec![Frame::ModelRequest { text: "walk-ins?".into() }]);
    }

    #[tokio::test]
    async fn test_search_failure_forwards_unmodified() {
        let embedder = Arc::new(FixedEmbedder::new(vec![RagError::Search(
            PersistenceError::Request("reset".into()),
        )]));
        let stage = RetrievalAugmenter::new(
            embedder.clone(),
            Arc::new(FixedSearch(vec![])),
            config(),
        );

        let out = run(&stage, "hello").await;

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out, vec![Frame::ModelRequest { text: "hello".into() }]);
    }

    #[tokio::test]
    async fn test_permanent_failure_forwards_unmodified() {
        let embedder = Arc::new(FixedEmbedder::new(vec![RagError::EmbeddingStatus {
            status: 401,
            body: "invalid key".into(),
        }]));
        let stage = RetrievalAugmenter::new(
            embedder.clone(),
            Arc::new(FixedSearch(vec![chunk("x", 0.9)])),
            config(),
        );

        let out = run(&stage, "hello").await;

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out, vec![Frame::ModelRequest { text: "hello".into() }]);
    }

    #[tokio::test]
    async fn test_each_request_retrieves_once() {
        let embedder = Arc::new(FixedEmbedder::new(vec![RagError::EmbeddingRequest(
            "timeout".into(),
        )]));
        let stage = RetrievalAugmenter::new(
            embedder.clone(),
            Arc::new(FixedSearch(vec![chunk("Walk-ins welcome.", 0.88)])),
            config(),
        );

        let first = run(&stage, "walk-ins?").await;
        let second = run(&stage, "walk-ins?").await;

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(first, vec![Frame::ModelRequest { text: "walk-ins?".into() }]);
        assert!(matches!(&second[..], [Frame::ModelRequest { text }] if text.contains("Source 1")));
    }

    #[tokio::test]
    async fn test_disabled_passes_through() {
        let embedder = Arc::new(FixedEmbedder::new(vec![]));
        let stage = RetrievalAugmenter::new(
            embedder.clone(),
            Arc::new(FixedSearch(vec![chunk("x", 0.9)])),
            RetrieverConfig {
                enabled: false,
                ..config()
            },
        );

        let out = run(&stage, "hello").await;

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(out, vec![Frame::ModelRequest { text: "hello".into() }]);
    }

    #[tokio::test]
    async fn test_other_frames_untouched() {
        let stage = RetrievalAugmenter::new(
            Arc::new(FixedEmbedder::new(vec![])),
            Arc::new(FixedSearch(vec![])),
            config(),
        );
        let mut ctx = ProcessorContext::new("s");

        let out = stage.process(Frame::TurnEnd, &mut ctx).await.unwrap();

        assert_eq!(out, vec![Frame::TurnEnd]);
    }
}
