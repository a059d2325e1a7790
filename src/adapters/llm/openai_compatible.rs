//! HTTP client for OpenAI-compatible chat completion endpoints.
//!
//! Serves both the task model and the reflection model. The instruction is
//! sent as the system message and the example input as the user message.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use super::retry::RetryPolicy;
use crate::domain::models::config::ModelEndpointConfig;
use crate::domain::ports::{ModelClient, ModelError};

/// Chat completion request body
#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client with retry on transient failures
pub struct OpenAiCompatibleClient {
    http_client: ReqwestClient,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: Option<f32>,
    timeout_secs: u64,
    retry_policy: RetryPolicy,
}

impl OpenAiCompatibleClient {
    /// Build a client from endpoint configuration.
    ///
    /// The API key is resolved now; a missing key is only an error when the
    /// endpoint rejects the request.
    pub fn from_config(config: &ModelEndpointConfig) -> Result<Self, ModelError> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ModelError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            retry_policy: RetryPolicy::from_config(config),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    async fn send_request(&self, prompt: &str, input: &str) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt,
                },
                ChatMessage {
                    role: "user",
                    content: input,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut builder = self.http_client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_transport(&e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(error_from_status(status, body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("failed to parse response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::InvalidResponse("response contained no message content".to_string()))
    }

    fn map_transport(&self, error: &reqwest::Error) -> ModelError {
        if error.is_timeout() {
            ModelError::Timeout(self.timeout_secs)
        } else if error.is_connect() {
            ModelError::Unavailable(error.to_string())
        } else {
            ModelError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str, input: &str) -> Result<String, ModelError> {
        let reply = self
            .retry_policy
            .execute(|| self.send_request(prompt, input))
            .await?;
        debug!(chars = reply.len(), "completion received");
        Ok(reply)
    }
}

/// Classify a non-success HTTP status.
fn error_from_status(status: StatusCode, body: String) -> ModelError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelError::Auth(body),
        StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimitExceeded(body),
        _ => ModelError::Api {
            status: status.as_u16(),
            message: body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_status() {
        assert!(matches!(
            error_from_status(StatusCode::UNAUTHORIZED, String::new()),
            ModelError::Auth(_)
        ));
        assert!(matches!(
            error_from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ModelError::RateLimitExceeded(_)
        ));
        let server = error_from_status(StatusCode::BAD_GATEWAY, "upstream".to_string());
        assert!(matches!(server, ModelError::Api { status: 502, .. }));
        assert!(server.is_transient());
        assert!(!error_from_status(StatusCode::BAD_REQUEST, String::new()).is_transient());
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = ModelEndpointConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..ModelEndpointConfig::default()
        };
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();
        assert_eq!(client.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(client.model_id(), "gpt-4o-mini");
    }

    #[test]
    fn test_request_serialization_skips_unset_temperature() {
        let request = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 16,
            temperature: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
