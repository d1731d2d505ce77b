//! Messages API client with tool calling support
//!
//! The controller talks to the model through the [`ModelClient`] trait so a
//! scripted model can stand in for the network in tests. [`AnthropicClient`]
//! is the production implementation.

use async_trait::async_trait;
use thiserror::Error;

use super::messages::{ContentBlock, ModelRequest, ModelResponse};

/// Version header required by the Messages API
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Error type for model calls
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Model API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Empty response from model")]
    EmptyResponse,
}

/// Anything that can answer one model call
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier used for metrics and tracing
    fn model(&self) -> &str;

    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ChatError>;
}

/// Client for the Anthropic `/v1/messages` endpoint
#[derive(Clone)]
pub struct AnthropicClient {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `https://api.anthropic.com`
    /// * `api_key` - sent as `x-api-key`
    /// * `model` - model id used for every call
    /// * `max_tokens` - output token cap per call
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ChatError> {
        let endpoint = format!("{}/v1/messages", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": request.system,
            "messages": request.messages,
            "tools": request.tools,
        });

        let response = self
            .client
            .post(&endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ChatError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.is_empty() {
            return Err(ChatError::EmptyResponse);
        }

        let mut parsed: ModelResponse = serde_json::from_str(&text)?;
        parsed
            .content
            .retain(|block| !matches!(block, ContentBlock::Unsupported));
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::messages::{Message, ToolDefinition};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_complete_parses_tool_use() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "system": "be brief"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Computing."},
                    {"type": "tool_use", "id": "toolu_1", "name": "execute_python", "input": {"code": "print(2+2)"}}
                ],
                "stop_reason": "tool_use"
            })))
            .mount(&server)
            .await;

        let client = AnthropicClient::new(server.uri(), "test-key", "test-model", 1024);
        let messages = vec![Message::user("compute 2+2")];
        let tools = vec![ToolDefinition::execute_python()];
        let response = client
            .complete(ModelRequest {
                system: "be brief",
                messages: &messages,
                tools: &tools,
            })
            .await
            .unwrap();

        assert_eq!(response.content.len(), 2);
        assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
        match &response.content[1] {
            ContentBlock::ToolUse { id, input, .. } => {
                assert_eq!(id, "toolu_1");
                assert_eq!(input["code"], "print(2+2)");
            }
            other => panic!("expected tool_use, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_api_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = AnthropicClient::new(server.uri(), "k", "m", 16);
        let err = client
            .complete(ModelRequest {
                system: "",
                messages: &[],
                tools: &[],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Api { status: 429, .. }));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_unsupported_blocks_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "thinking", "thinking": "..."},
                    {"type": "text", "text": "done"}
                ]
            })))
            .mount(&server)
            .await;

        let client = AnthropicClient::new(format!("{}/", server.uri()), "k", "m", 16);
        let response = client
            .complete(ModelRequest {
                system: "",
                messages: &[],
                tools: &[],
            })
            .await
            .unwrap();
        assert_eq!(response.content, vec![ContentBlock::text("done")]);
    }
}
