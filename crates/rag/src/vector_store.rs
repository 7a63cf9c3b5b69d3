//! Similarity search over the company knowledge base
//!
//! Chunks live in Postgres with pgvector; ranking happens inside the
//! `search_rag_chunks` stored procedure, called over PostgREST.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use receptionist_persistence::SupabaseClient;

use crate::RagError;

/// One retrieved knowledge chunk
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalChunk {
    pub text: String,
    /// Cosine similarity in [0, 1]
    pub similarity: f32,
    pub file_name: String,
    pub chunk_index: Option<i64>,
}

/// Finds chunks similar to a query vector for one tenant
#[async_trait]
pub trait SimilaritySearch: Send + Sync + 'static {
    async fn search(
        &self,
        embedding: &[f32],
        tenant_id: i64,
        threshold: f32,
        count: usize,
    ) -> Result<Vec<RetrievalChunk>, RagError>;
}

#[derive(Debug, Serialize)]
struct SearchParams<'a> {
    query_embedding: &'a [f32],
    company_id: i64,
    match_threshold: f32,
    match_count: usize,
}

#[derive(Debug, Deserialize)]
struct ChunkRow {
    #[serde(default)]
    chunk_text: String,
    #[serde(default)]
    similarity: f32,
    #[serde(default)]
    metadata: ChunkMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkMetadata {
    file_name: Option<String>,
    chunk_index: Option<i64>,
}

impl From<ChunkRow> for RetrievalChunk {
    fn from(row: ChunkRow) -> Self {
        Self {
            text: row.chunk_text,
            similarity: row.similarity,
            file_name: row
                .metadata
                .file_name
                .unwrap_or_else(|| "Unknown".to_string()),
            chunk_index: row.metadata.chunk_index,
        }
    }
}

/// `search_rag_chunks` over PostgREST
#[derive(Clone)]
pub struct SupabaseVectorStore {
    client: SupabaseClient,
}

impl SupabaseVectorStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SimilaritySearch for SupabaseVectorStore {
    async fn search(
        &self,
        embedding: &[f32],
        tenant_id: i64,
        threshold: f32,
        count: usize,
    ) -> Result<Vec<RetrievalChunk>, RagError> {
        let params = SearchParams {
            query_embedding: embedding,
            company_id: tenant_id,
            match_threshold: threshold,
            match_count: count,
        };

        let rows: Option<Vec<ChunkRow>> = self.client.rpc("search_rag_chunks", &params).await?;
        let chunks: Vec<RetrievalChunk> = rows
            .unwrap_or_default()
            .into_iter()
            .map(RetrievalChunk::from)
            .collect();

        tracing::debug!(company_id = tenant_id, found = chunks.len(), "Similarity search");
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use receptionist_config::DatabaseConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> SupabaseVectorStore {
        SupabaseVectorStore::new(
            SupabaseClient::new(&DatabaseConfig {
                url: server.uri(),
                anon_key: "anon".into(),
                timeout_secs: 5,
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_search_maps_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/search_rag_chunks"))
            .and(body_partial_json(serde_json::json!({
                "company_id": 5,
                "match_count": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "chunk_text": "We are open 9 to 5.",
                    "similarity": 0.91,
                    "metadata": {"file_name": "hours.pdf", "chunk_index": 2}
                },
                {
                    "chunk_text": "Parking is free.",
                    "similarity": 0.75,
                    "metadata": {}
                }
            ])))
            .mount(&server)
            .await;

        let chunks = store(&server).search(&[0.1, 0.2], 5, 0.7, 3).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].file_name, "hours.pdf");
        assert_eq!(chunks[0].chunk_index, Some(2));
        assert_eq!(chunks[1].file_name, "Unknown");
    }

    #[tokio::test]
    async fn test_null_result_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/search_rag_chunks"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let chunks = store(&server).search(&[0.1], 5, 0.7, 3).await.unwrap();

        assert!(chunks.is_empty());
    }
}
