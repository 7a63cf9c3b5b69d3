//! OpenAI-compatible chat backend
//!
//! Works with:
//! - OpenAI
//! - Azure OpenAI (deployment URLs and `api-key` header)
//! - vLLM and other servers exposing `/chat/completions`

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;

use receptionist_config::LlmSettings;
use receptionist_core::{LanguageModel, Message, ModelReply, Role, ToolCall, ToolDefinition};

use crate::stream::{LineEvent, StreamState};
use crate::LlmError;

/// Configuration for OpenAI-compatible backends
#[derive(Clone)]
pub struct OpenAIConfig {
    /// API endpoint (OpenAI: https://api.openai.com/v1, Azure: custom)
    pub endpoint: String,
    /// API key
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0-2)
    pub temperature: f32,
    /// Request timeout
    pub timeout: Duration,
    /// Azure API version (Azure specific)
    pub api_version: Option<String>,
}

impl std::fmt::Debug for OpenAIConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: None,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            api_version: None,
        }
    }
}

impl OpenAIConfig {
    /// Create config for OpenAI
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Create config for Azure OpenAI
    pub fn azure(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: deployment.into(),
            api_version: Some(api_version.into()),
            ..Default::default()
        }
    }

    /// Company credential and model on top of the process LLM settings
    pub fn from_settings(
        settings: &LlmSettings,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: settings.base_url.clone(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.timeout_secs),
            api_version: None,
        }
    }
}

/// OpenAI-compatible backend
pub struct OpenAIBackend {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIBackend {
    /// Create new OpenAI backend
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() && !is_local(&config.endpoint) {
            return Err(LlmError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Get the full API URL for chat completions
    fn chat_url(&self) -> String {
        if let Some(ref api_version) = self.config.api_version {
            format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.config.endpoint.trim_end_matches('/'),
                self.config.model,
                api_version
            )
        } else {
            format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
        }
    }

    /// Build request headers
    fn build_headers(&self) -> reqwest::header::HeaderMap {
        use reqwest::header::HeaderValue;

        let mut headers = reqwest::header::HeaderMap::new();

        if self.config.api_version.is_some() {
            // Azure uses api-key header
            if let Ok(val) = HeaderValue::from_str(&self.config.api_key) {
                headers.insert("api-key", val);
            }
        } else if !self.config.api_key.is_empty() {
            let auth_value = format!("Bearer {}", self.config.api_key);
            if let Ok(val) = HeaderValue::from_str(&auth_value) {
                headers.insert(reqwest::header::AUTHORIZATION, val);
            }
        }

        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        headers
    }

    fn build_request<'a>(
        &'a self,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
            stream: true,
        }
    }

    async fn stream_completion(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        tx: mpsc::Sender<String>,
    ) -> Result<ModelReply, LlmError> {
        let start = std::time::Instant::now();
        let request = self.build_request(messages, tools);

        let response = self
            .client
            .post(self.chat_url())
            .headers(self.build_headers())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut state = StreamState::default();
        let mut first_token_ms: Option<u128> = None;

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Process complete SSE lines
            while let Some(line_end) = buffer.find('\n') {
                let line: String = buffer.drain(..=line_end).collect();

                match state.push_line(&line)? {
                    LineEvent::Text(text) => {
                        if first_token_ms.is_none() {
                            first_token_ms = Some(start.elapsed().as_millis());
                        }
                        if tx.send(text).await.is_err() {
                            tracing::debug!("Delta receiver dropped, abandoning stream");
                            break 'outer;
                        }
                    }
                    LineEvent::Done => break 'outer,
                    LineEvent::Skip => {}
                }
            }
        }

        if !buffer.trim().is_empty() {
            if let LineEvent::Text(text) = state.push_line(&buffer)? {
                let _ = tx.send(text).await;
            }
        }

        let reply = state.into_reply();
        tracing::debug!(
            model = %self.config.model,
            first_token_ms = first_token_ms.map(|ms| ms as u64),
            total_ms = start.elapsed().as_millis() as u64,
            tool_calls = reply.tool_calls.len(),
            finish_reason = ?reply.finish_reason,
            "Completion finished"
        );

        Ok(reply)
    }
}

fn is_local(endpoint: &str) -> bool {
    endpoint.starts_with("http://localhost") || endpoint.starts_with("http://127.0.0.1")
}

#[async_trait]
impl LanguageModel for OpenAIBackend {
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        deltas: mpsc::Sender<String>,
    ) -> receptionist_core::Result<ModelReply> {
        Ok(self.stream_completion(messages, tools, deltas).await?)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(msg: &'a Message) -> Self {
        let content = if msg.role == Role::Assistant
            && !msg.tool_calls.is_empty()
            && msg.content.is_empty()
        {
            None
        } else {
            Some(msg.content.as_str())
        };

        Self {
            role: msg.role.as_str(),
            content,
            tool_calls: msg.tool_calls.iter().map(WireToolCall::from).collect(),
            tool_call_id: msg.tool_call_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    /// JSON-encoded arguments
    arguments: String,
}

impl<'a> From<&'a ToolCall> for WireToolCall<'a> {
    fn from(call: &'a ToolCall) -> Self {
        let arguments = match &call.arguments {
            serde_json::Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        Self {
            id: &call.id,
            kind: "function",
            function: WireFunctionCall {
                name: &call.name,
                arguments,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

impl<'a> From<&'a ToolDefinition> for WireTool<'a> {
    fn from(def: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: def,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use receptionist_core::FinishReason;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(endpoint: &str) -> OpenAIBackend {
        OpenAIBackend::new(OpenAIConfig {
            endpoint: endpoint.to_string(),
            ..OpenAIConfig::openai("sk-test", "gpt-4o-mini")
        })
        .unwrap()
    }

    fn sse(lines: &[&str]) -> String {
        lines
            .iter()
            .map(|l| format!("data: {}\n\n", l))
            .collect::<String>()
    }

    #[test]
    fn test_remote_endpoint_requires_key() {
        let result = OpenAIBackend::new(OpenAIConfig::default());
        assert!(matches!(result, Err(LlmError::Configuration(_))));

        let local = OpenAIBackend::new(OpenAIConfig {
            endpoint: "http://localhost:8000/v1".into(),
            ..Default::default()
        });
        assert!(local.is_ok());
    }

    #[test]
    fn test_chat_url() {
        assert_eq!(
            backend("https://api.openai.com/v1/").chat_url(),
            "https://api.openai.com/v1/chat/completions"
        );

        let azure = OpenAIBackend::new(OpenAIConfig::azure(
            "https://acme.openai.azure.com",
            "key",
            "gpt4",
            "2024-02-01",
        ))
        .unwrap();
        assert_eq!(
            azure.chat_url(),
            "https://acme.openai.azure.com/openai/deployments/gpt4/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn test_request_serialization_with_tools() {
        let backend = backend("https://api.openai.com/v1");
        let call = ToolCall::new("call_1", "book_appointment", serde_json::json!({"a": 1}));
        let messages = vec![
            Message::system("sys"),
            Message::user("book me"),
            Message::assistant_tool_calls("", vec![call]),
            Message::tool("{\"success\":true}", "call_1"),
        ];
        let tools = vec![ToolDefinition::new(
            "book_appointment",
            "Book",
            serde_json::json!({"type": "object"}),
        )];

        let json = serde_json::to_value(backend.build_request(&messages, &tools)).unwrap();

        assert_eq!(json["stream"], true);
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "book_appointment");
        assert_eq!(json["messages"][2]["content"], serde_json::Value::Null);
        assert_eq!(json["messages"][2]["tool_calls"][0]["function"]["arguments"], "{\"a\":1}");
        assert_eq!(json["messages"][3]["role"], "tool");
        assert_eq!(json["messages"][3]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_no_tools_omits_field() {
        let backend = backend("https://api.openai.com/v1");
        let messages = vec![Message::user("hi")];

        let json = serde_json::to_value(backend.build_request(&messages, &[])).unwrap();

        assert!(json.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_streams_text() {
        let server = MockServer::start().await;
        let body = sse(&[
            r#"{"choices":[{"delta":{"role":"assistant","content":"Hello"}}]}"#,
            r#"{"choices":[{"delta":{"content":" there."}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ]);
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let backend = backend(&server.uri());
        let (tx, mut rx) = mpsc::channel(16);

        let reply = backend
            .stream_chat(&[Message::user("hi")], &[], tx)
            .await
            .unwrap();

        let mut deltas = Vec::new();
        while let Some(d) = rx.recv().await {
            deltas.push(d);
        }
        assert_eq!(deltas, vec!["Hello", " there."]);
        assert_eq!(reply.text, "Hello there.");
        assert_eq!(reply.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_streams_tool_call() {
        let server = MockServer::start().await;
        let body = sse(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_9","type":"function","function":{"name":"book_appointment","arguments":"{\"caller_name\":\"Bo\"}"}}]}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "[DONE]",
        ]);
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let backend = backend(&server.uri());
        let (tx, _rx) = mpsc::channel(16);

        let reply = backend
            .stream_chat(&[Message::user("book")], &[], tx)
            .await
            .unwrap();

        assert!(reply.has_tool_calls());
        assert_eq!(reply.tool_calls[0].name, "book_appointment");
        assert_eq!(reply.tool_calls[0].get_string("caller_name"), Some("Bo"));
    }

    #[tokio::test]
    async fn test_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let backend = backend(&server.uri());
        let (tx, _rx) = mpsc::channel(16);

        let err = backend
            .stream_chat(&[Message::user("hi")], &[], tx)
            .await
            .unwrap_err();

        assert!(matches!(err, receptionist_core::Error::Llm(msg) if msg.contains("429")));
    }
}
