//! Knowledge retrieval for the voice receptionist
//!
//! Features:
//! - OpenAI-compatible embeddings client
//! - Similarity search through the `search_rag_chunks` stored procedure
//! - Context block formatting
//! - `RetrievalAugmenter`, the pipeline stage that prepends retrieved
//!   knowledge to each user request

pub mod context;
pub mod embeddings;
pub mod retriever;
pub mod vector_store;

pub use context::{augment, format_context, select_chunks};
pub use embeddings::{EmbeddingProvider, OpenAIEmbedder};
pub use retriever::{RetrievalAugmenter, RetrieverConfig};
pub use vector_store::{RetrievalChunk, SimilaritySearch, SupabaseVectorStore};

use receptionist_persistence::PersistenceError;
use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    /// The embedding request never produced a response
    #[error("Embedding request failed: {0}")]
    EmbeddingRequest(String),

    #[error("Embedding service returned {status}: {body}")]
    EmbeddingStatus { status: u16, body: String },

    #[error("Malformed embedding response: {0}")]
    EmbeddingResponse(String),

    #[error("Similarity search failed: {0}")]
    Search(#[from] PersistenceError),
}

impl RagError {
    /// Network failures, timeouts, 5xx and 429 may succeed on a second attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::EmbeddingRequest(_) => true,
            RagError::EmbeddingStatus { status, .. } => *status == 429 || *status >= 500,
            RagError::EmbeddingResponse(_) => false,
            RagError::Search(e) => e.is_transient(),
        }
    }

    /// Label used in logs and metrics
    pub fn class(&self) -> &'static str {
        if self.is_retryable() {
            "retryable"
        } else {
            "permanent"
        }
    }
}

impl From<RagError> for receptionist_core::Error {
    fn from(err: RagError) -> Self {
        receptionist_core::Error::Retrieval(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(RagError::EmbeddingRequest("timeout".into()).class(), "retryable");
        assert_eq!(
            RagError::EmbeddingStatus {
                status: 429,
                body: String::new()
            }
            .class(),
            "retryable"
        );
        assert_eq!(
            RagError::EmbeddingStatus {
                status: 401,
                body: String::new()
            }
            .class(),
            "permanent"
        );
        assert_eq!(RagError::EmbeddingResponse("empty".into()).class(), "permanent");
        assert!(RagError::Search(PersistenceError::Request("reset".into())).is_retryable());
    }
}
