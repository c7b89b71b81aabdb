//! Chat-completion capability and the HTTP backend.

use std::time::Duration;

use async_trait::async_trait;
use geoscope_types::{AuditError, LlmEndpoint, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-call timeout against a chat endpoint.
const LLM_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens: 2048,
            temperature: 0.2,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Backend label for logs and warnings.
    fn name(&self) -> String;
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: String,
}

/// Provider speaking the standard chat-completion wire format with bearer
/// auth.
pub struct HttpChatProvider {
    client: Client,
    endpoint: LlmEndpoint,
    model: String,
    label: String,
}

impl HttpChatProvider {
    pub fn new(label: impl Into<String>, endpoint: LlmEndpoint, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(LLM_TIMEOUT)
            .build()
            .map_err(|e| AuditError::internal(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            model: model.into(),
            label: label.into(),
        })
    }
}

#[async_trait]
impl ChatCompleter for HttpChatProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let wire = WireRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut http_request = self.client.post(&self.endpoint.url).json(&wire);
        if let Some(key) = &self.endpoint.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await.map_err(|e| {
            if e.is_timeout() {
                AuditError::timeout(format!("llm call via {}", self.label), 120)
            } else {
                AuditError::network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(AuditError::from_status(status));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| AuditError::parse(format!("chat response: {}", e)))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AuditError::parse("chat response has no choices"))?;
        debug!(provider = %self.label, chars = content.len(), "llm call completed");
        Ok(content)
    }

    fn name(&self) -> String {
        self.label.clone()
    }
}

impl std::fmt::Debug for HttpChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChatProvider")
            .field("label", &self.label)
            .field("url", &self.endpoint.url)
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn speaks_the_chat_wire_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "messages": [{"role": "system", "content": "be brief"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"ok\":true}"}}]
            })))
            .mount(&server)
            .await;

        let provider = HttpChatProvider::new(
            "primary",
            LlmEndpoint {
                url: server.uri(),
                api_key: Some("sk-test".to_string()),
            },
            "test-model",
        )
        .unwrap();

        let content = provider
            .complete(&ChatRequest::new("be brief", "hello"))
            .await
            .unwrap();
        assert_eq!(content, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn server_error_is_retryable_kind() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let provider = HttpChatProvider::new(
            "primary",
            LlmEndpoint {
                url: server.uri(),
                api_key: None,
            },
            "m",
        )
        .unwrap();
        let err = provider
            .complete(&ChatRequest::new("s", "u"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "http_5xx");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn empty_choices_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let provider = HttpChatProvider::new(
            "primary",
            LlmEndpoint {
                url: server.uri(),
                api_key: None,
            },
            "m",
        )
        .unwrap();
        let err = provider
            .complete(&ChatRequest::new("s", "u"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }
}
