//! Per-session configuration snapshot
//!
//! Resolved once from the company record and the process settings, then
//! shared read-only (behind an `Arc`) by every stage of every session.

use std::fmt;

use receptionist_core::ToolDefinition;
use serde::{Deserialize, Serialize};

use crate::prompts::build_system_prompt;
use crate::{ConfigError, Settings};

/// Company record as stored in the `companies` table
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub id: i64,
    pub name: String,
    pub openai_api_key: String,
    pub system_prompt: String,
    pub llm_model: String,
    #[serde(default)]
    pub rag_system_instructions: Option<String>,
}

impl fmt::Debug for CompanyProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompanyProfile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("openai_api_key", &"<redacted>")
            .field("llm_model", &self.llm_model)
            .field(
                "custom_rag_instructions",
                &self.rag_system_instructions.is_some(),
            )
            .finish()
    }
}

/// Retrieval parameters for one session
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    pub enabled: bool,
    pub threshold: f32,
    pub count: usize,
    pub embedding_model: String,
}

/// Immutable configuration for one session
#[derive(Clone)]
pub struct SessionConfig {
    pub company_id: i64,
    pub company_name: String,
    pub api_key: String,
    pub model: String,
    /// Full system prompt (company prompt plus instruction blocks)
    pub system_prompt: String,
    pub retrieval: RetrievalParams,
    /// Tool schema published to the model
    pub tools: Vec<ToolDefinition>,
}

impl SessionConfig {
    /// Resolve the snapshot from a company record
    pub fn resolve(
        company: &CompanyProfile,
        settings: &Settings,
        tools: Vec<ToolDefinition>,
    ) -> Result<Self, ConfigError> {
        if company.openai_api_key.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "companies[{}].openai_api_key",
                company.id
            )));
        }
        if company.llm_model.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "companies[{}].llm_model",
                company.id
            )));
        }

        let custom_rag = company
            .rag_system_instructions
            .as_deref()
            .filter(|s| !s.trim().is_empty());
        if custom_rag.is_some() {
            tracing::info!(company_id = company.id, "Using custom RAG instructions");
        } else {
            tracing::info!(company_id = company.id, "Using default RAG instructions");
        }

        Ok(Self {
            company_id: company.id,
            company_name: company.name.clone(),
            api_key: company.openai_api_key.clone(),
            model: company.llm_model.clone(),
            system_prompt: build_system_prompt(&company.system_prompt, custom_rag),
            retrieval: RetrievalParams {
                enabled: settings.rag.enabled,
                threshold: settings.rag.match_threshold,
                count: settings.rag.match_count,
                embedding_model: settings.rag.embedding_model.clone(),
            },
            tools,
        })
    }

    /// Look up a published tool by name
    pub fn tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("company_id", &self.company_id)
            .field("company_name", &self.company_name)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("retrieval", &self.retrieval)
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
