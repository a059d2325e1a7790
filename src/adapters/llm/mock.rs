//! Scripted model client for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::ports::{ModelClient, ModelError};

type Responder = Arc<dyn Fn(&str, &str) -> Result<String, ModelError> + Send + Sync>;

/// Mock response configuration.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Reply(String),
    Error(ModelError),
}

impl MockResponse {
    fn into_result(self) -> Result<String, ModelError> {
        match self {
            Self::Reply(text) => Ok(text),
            Self::Error(e) => Err(e),
        }
    }
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub prompt: String,
    pub input: String,
}

/// Model client answering from a script.
///
/// Resolution order per call: exact input match, responder function,
/// queued replies, then the default response.
pub struct ScriptedModelClient {
    id: String,
    by_input: HashMap<String, MockResponse>,
    responder: Option<Responder>,
    queue: Mutex<VecDeque<MockResponse>>,
    default_response: MockResponse,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModelClient {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            by_input: HashMap::new(),
            responder: None,
            queue: Mutex::new(VecDeque::new()),
            default_response: MockResponse::Error(ModelError::NotConfigured(
                "no scripted reply".to_string(),
            )),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with `f(prompt, input)`.
    pub fn from_fn<F>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, ModelError> + Send + Sync + 'static,
    {
        let mut client = Self::new(id);
        client.responder = Some(Arc::new(f));
        client
    }

    pub fn with_reply(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.by_input.insert(input.into(), MockResponse::Reply(output.into()));
        self
    }

    pub fn with_error(mut self, input: impl Into<String>, error: ModelError) -> Self {
        self.by_input.insert(input.into(), MockResponse::Error(error));
        self
    }

    /// Queue replies handed out in order to calls no other rule matched.
    pub fn with_queued(mut self, responses: impl IntoIterator<Item = MockResponse>) -> Self {
        self.queue.get_mut().extend(responses);
        self
    }

    pub fn with_default_reply(mut self, output: impl Into<String>) -> Self {
        self.default_response = MockResponse::Reply(output.into());
        self
    }

    pub fn with_default_error(mut self, error: ModelError) -> Self {
        self.default_response = MockResponse::Error(error);
        self
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    fn model_id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, prompt: &str, input: &str) -> Result<String, ModelError> {
        self.calls.lock().await.push(RecordedCall {
            prompt: prompt.to_string(),
            input: input.to_string(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(response) = self.by_input.get(input) {
            return response.clone().into_result();
        }
        if let Some(responder) = &self.responder {
            return responder(prompt, input);
        }
        if let Some(response) = self.queue.lock().await.pop_front() {
            return response.into_result();
        }
        self.default_response.clone().into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolution_order() {
        let client = ScriptedModelClient::new("mock")
            .with_reply("hello", "world")
            .with_queued([
                MockResponse::Reply("first".to_string()),
                MockResponse::Error(ModelError::Timeout(1)),
            ])
            .with_default_reply("fallback");

        assert_eq!(client.generate("p", "hello").await.unwrap(), "world");
        assert_eq!(client.generate("p", "x").await.unwrap(), "first");
        assert!(matches!(client.generate("p", "x").await, Err(ModelError::Timeout(1))));
        assert_eq!(client.generate("p", "x").await.unwrap(), "fallback");
        assert_eq!(client.call_count().await, 4);
    }

    #[tokio::test]
    async fn test_from_fn_sees_prompt_and_input() {
        let client = ScriptedModelClient::from_fn("echo", |prompt, input| Ok(format!("{prompt}|{input}")));
        assert_eq!(client.generate("sys", "user").await.unwrap(), "sys|user");
    }
}
