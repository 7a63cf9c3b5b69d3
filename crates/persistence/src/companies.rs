//! Company records

use async_trait::async_trait;

use receptionist_config::CompanyProfile;

use crate::{PersistenceError, SupabaseClient};

/// Source of company configuration
#[async_trait]
pub trait CompanyStore: Send + Sync {
    async fn load_company(&self, company_id: i64) -> Result<CompanyProfile, PersistenceError>;
}

/// `companies` table over PostgREST
#[derive(Clone)]
pub struct SupabaseCompanyStore {
    client: SupabaseClient,
}

impl SupabaseCompanyStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CompanyStore for SupabaseCompanyStore {
    async fn load_company(&self, company_id: i64) -> Result<CompanyProfile, PersistenceError> {
        tracing::info!(company_id, "Loading company configuration");

        let rows: Vec<CompanyProfile> = self
            .client
            .select("companies", &[("id", format!("eq.{}", company_id))])
            .await?;

        let company = rows
            .into_iter()
            .next()
            .ok_or_else(|| PersistenceError::NotFound(format!("company {}", company_id)))?;

        tracing::info!(
            company_id,
            name = %company.name,
            llm_model = %company.llm_model,
            custom_rag_instructions = company.rag_system_instructions.is_some(),
            "Loaded company configuration"
        );

        Ok(company)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use receptionist_config::DatabaseConfig;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store(server: &MockServer) -> SupabaseCompanyStore {
        let client = SupabaseClient::new(&DatabaseConfig {
            url: server.uri(),
            anon_key: "anon".into(),
            timeout_secs: 5,
        })
        .unwrap();
        SupabaseCompanyStore::new(client)
    }

    #[tokio::test]
    async fn test_load_company() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/companies"))
            .and(query_param("id", "eq.3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "id": 3,
                "name": "Acme Dental",
                "openai_api_key": "sk-test",
                "system_prompt": "You answer calls for Acme Dental.",
                "llm_model": "gpt-4o-mini",
                "rag_system_instructions": null,
                "created_at": "2025-01-01T00:00:00Z"
            }])))
            .mount(&server)
            .await;

        let company = store(&server).await.load_company(3).await.unwrap();

        assert_eq!(company.name, "Acme Dental");
        assert_eq!(company.rag_system_instructions, None);
    }

    #[tokio::test]
    async fn test_missing_company() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let err = store(&server).await.load_company(9).await.unwrap_err();

        assert!(matches!(err, PersistenceError::NotFound(_)));
    }
}
