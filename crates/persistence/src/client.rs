//! PostgREST client and connection settings

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;

use receptionist_config::DatabaseConfig;

use crate::error::PersistenceError;

/// Thin client over a Supabase PostgREST endpoint
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: Arc<str>,
}

impl SupabaseClient {
    /// Build a client authenticated with the project's anon key
    pub fn new(config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.anon_key)
            .map_err(|e| PersistenceError::Config(format!("invalid anon key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.anon_key))
            .map_err(|e| PersistenceError::Config(format!("invalid anon key: {}", e)))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PersistenceError::Config(e.to_string()))?;

        tracing::info!(url = %config.url, "PostgREST client ready");

        Ok(Self {
            http,
            base_url: Arc::from(config.url.trim_end_matches('/')),
        })
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    /// `GET /rest/v1/{table}` with PostgREST filters such as `("id", "eq.4")`
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, PersistenceError> {
        let mut query: Vec<(&str, String)> = vec![("select", "*".to_string())];
        query.extend(filters.iter().cloned());

        let response = self
            .http
            .get(self.rest_url(table))
            .query(&query)
            .send()
            .await?;

        decode(response).await
    }

    /// `POST /rest/v1/{table}` returning the inserted rows
    pub async fn insert<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        table: &str,
        row: &T,
    ) -> Result<Vec<R>, PersistenceError> {
        let response = self
            .http
            .post(self.rest_url(table))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;

        decode(response).await
    }

    /// `POST /rest/v1/rpc/{function}`
    pub async fn rpc<P: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        function: &str,
        params: &P,
    ) -> Result<R, PersistenceError> {
        let response = self
            .http
            .post(self.rest_url(&format!("rpc/{}", function)))
            .json(params)
            .send()
            .await?;

        decode(response).await
    }
}

async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, PersistenceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PersistenceError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> DatabaseConfig {
        DatabaseConfig {
            url: server.uri(),
            anon_key: "anon".to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_select_sends_auth_and_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/companies"))
            .and(query_param("id", "eq.7"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer anon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 7}])))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config(&server)).unwrap();
        let rows: Vec<serde_json::Value> = client
            .select("companies", &[("id", "eq.7".to_string())])
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_status_error_keeps_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/search_rag_chunks"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config(&server)).unwrap();
        let err = client
            .rpc::<_, serde_json::Value>("search_rag_chunks", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, PersistenceError::Status { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/f"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config(&server)).unwrap();
        let err = client
            .rpc::<_, Vec<serde_json::Value>>("f", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, PersistenceError::Decode(_)));
    }
}
