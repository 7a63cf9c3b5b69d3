//! Embeddings
//!
//! Uses an OpenAI-compatible `/embeddings` endpoint. The credential is passed
//! per call because each company brings its own API key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::RagError;

/// Turns text into a dense vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + 'static {
    async fn embed(&self, text: &str, credential: &str) -> Result<Vec<f32>, RagError>;
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI embeddings client
pub struct OpenAIEmbedder {
    client: Client,
    url: String,
    model: String,
}

impl OpenAIEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::EmbeddingRequest(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    async fn embed(&self, text: &str, credential: &str) -> Result<Vec<f32>, RagError> {
        let request = EmbedRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(credential)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingRequest(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingStatus { status, body });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RagError::EmbeddingRequest(e.to_string()))?;
        let embed_response: EmbedResponse = serde_json::from_slice(&bytes)
            .map_err(|e| RagError::EmbeddingResponse(e.to_string()))?;

        embed_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| RagError::EmbeddingResponse("No embedding returned".to_string()))
    }
}
