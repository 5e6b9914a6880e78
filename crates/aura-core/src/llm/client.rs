//! LLM API HTTP Client
//!
//! Supports both Claude API and OpenAI-compatible APIs (OpenRouter, etc.)

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::config::{LlmConfig, LlmProvider, OracleRole};
use crate::error::{Error, Result};

use super::oracle::{DelegateOracle, OracleRequest};
use super::types::*;

/// LLM API client (supports Claude and OpenAI-compatible APIs)
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    provider: LlmProvider,
    max_tokens: u64,
}

impl LlmClient {
    /// Create a client using the configured default model
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Self::with_model(config, config.model.clone())
    }

    /// Create a client for one oracle role
    pub fn for_role(config: &LlmConfig, role: OracleRole) -> Result<Self> {
        Self::with_model(config, config.model_for(role).to_string())
    }

    fn with_model(config: &LlmConfig, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::Http)?;

        let base_url = match &config.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match config.provider {
                LlmProvider::Claude => "https://api.anthropic.com/v1".to_string(),
                LlmProvider::OpenAi => "https://openrouter.ai/api/v1".to_string(),
            },
        };

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model,
            base_url,
            provider: config.provider.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Override the endpoint (custom gateways, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Get the model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the provider type
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Send request to Claude API
    async fn send_claude_request(&self, request: &OracleRequest) -> Result<Message> {
        let url = format!("{}/messages", self.base_url);
        let body = MessagesRequest::from_history(
            &self.model,
            self.max_tokens,
            request.system.as_deref(),
            &request.history,
            &request.tools,
        );

        debug!("Sending request to Claude API: {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let text = Self::checked_body(response).await?;
        let parsed: MessagesResponse = serde_json::from_str(&text)
            .map_err(|e| Error::Other(format!("Failed to parse response: {} - {}", e, text)))?;

        info!(
            "Claude API response: stop_reason={:?}, tokens={}",
            parsed.stop_reason,
            parsed.usage.as_ref().map(|u| u.output_tokens).unwrap_or(0)
        );

        Ok(parsed.into_message())
    }

    /// Send request to OpenAI-compatible API
    async fn send_openai_request(&self, request: &OracleRequest) -> Result<Message> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest::from_history(
            &self.model,
            self.max_tokens,
            request.system.as_deref(),
            &request.history,
            &request.tools,
        );

        debug!("Sending request to OpenAI-compatible API: {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let text = Self::checked_body(response).await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| Error::Other(format!("Failed to parse response: {} - {}", e, text)))?;

        info!(
            "OpenAI API response: tokens={}",
            parsed.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0)
        );

        parsed
            .into_message()
            .ok_or_else(|| Error::OracleTransport("response contained no choices".to_string()))
    }

    /// Read the body, mapping rate limits and server errors to retryable
    /// transport errors and other failures to permanent ones
    async fn checked_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        warn!("LLM API error: {} - {}", status, body);
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(Error::OracleTransport(format!("{}: {}", status, body)))
        } else {
            Err(Error::Other(format!("LLM API rejected request: {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl DelegateOracle for LlmClient {
    async fn propose(&self, request: &OracleRequest) -> Result<Message> {
        match self.provider {
            LlmProvider::Claude => self.send_claude_request(request).await,
            LlmProvider::OpenAi => self.send_openai_request(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn openai_config(base_url: String) -> LlmConfig {
        LlmConfig {
            api_key: "sk-test".into(),
            provider: LlmProvider::OpenAi,
            base_url: Some(base_url),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_role_model_selection() {
        let mut config = LlmConfig::default();
        config.roles.orchestrator = Some("router-model".into());

        let client = LlmClient::for_role(&config, OracleRole::Orchestrator).unwrap();
        assert_eq!(client.model(), "router-model");

        let client = LlmClient::for_role(&config, OracleRole::SubAgent).unwrap();
        assert_eq!(client.model(), "claude-sonnet-4-20250514");
    }

    #[tokio::test]
    async fn test_openai_tool_call_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "ask_industrial_agent", "arguments": "{\"query\":\"leak penalty\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(&openai_config(server.uri())).unwrap();
        let msg = client
            .propose(&OracleRequest::new(vec![Message::user("leak penalty?")]))
            .await
            .unwrap();

        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].str_arg("query"), Some("leak penalty"));
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = LlmClient::new(&openai_config(server.uri())).unwrap();
        let err = client.propose(&OracleRequest::default()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = LlmClient::new(&openai_config(server.uri())).unwrap();
        let err = client.propose(&OracleRequest::default()).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
