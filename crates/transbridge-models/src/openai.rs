//! OpenAI-compatible chat backend.
//!
//! Works with any endpoint that speaks the `/chat/completions` protocol
//! (OpenAI, DeepSeek, vLLM, LM Studio, ...). The configured URL is the full
//! completions endpoint.

use crate::retry::{RetryPolicy, send_with_retry};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use transbridge_abstraction::{BackendIdentity, Translator, TranslatorError};

const SYSTEM_PROMPT: &str = "You are a professional translator. Translate the text accurately while maintaining its original style and meaning.";

const DEFAULT_MAX_TOKENS: u32 = 2000;
const DEFAULT_TEMPERATURE: f32 = 0.3;

/// OpenAI-compatible translator implementation.
#[derive(Debug, Clone)]
pub struct OpenAITranslator {
    /// Provider, model and endpoint of this backend.
    identity: BackendIdentity,
    /// The API key for bearer authentication.
    api_key: String,
    /// Completion token limit.
    max_tokens: u32,
    /// Sampling temperature.
    temperature: f32,
    /// Retry policy for each call.
    retry: RetryPolicy,
    /// HTTP client carrying the per-call timeout.
    client: Client,
}

impl OpenAITranslator {
    /// Creates a new `OpenAITranslator`.
    ///
    /// # Arguments
    /// * `identity` - Provider, model and full completions URL
    /// * `api_key` - Bearer token (may be empty for unauthenticated local servers)
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    /// Returns a `TranslatorError` if the HTTP client cannot be created.
    pub fn new(
        identity: BackendIdentity,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TranslatorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranslatorError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            identity,
            api_key: api_key.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            retry: RetryPolicy::default(),
            client,
        })
    }

    /// Sets the completion token limit; zero keeps the default.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        if max_tokens > 0 {
            self.max_tokens = max_tokens;
        }
        self
    }

    /// Sets the sampling temperature; non-positive values keep the default.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        if temperature > 0.0 {
            self.temperature = temperature;
        }
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_request(&self, prompt: &str) -> OpenAIRequest {
        OpenAIRequest {
            model: self.identity.model.clone(),
            messages: vec![
                OpenAIMessage { role: "system".to_string(), content: Some(SYSTEM_PROMPT.to_string()) },
                OpenAIMessage { role: "user".to_string(), content: Some(prompt.to_string()) },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl Translator for OpenAITranslator {
    async fn translate(&self, prompt: &str) -> Result<String, TranslatorError> {
        debug!(
            backend = %self.identity,
            prompt_len = prompt.len(),
            "OpenAITranslator sending chat completion"
        );

        let request_body = self.build_request(prompt);

        let response = send_with_retry(&self.retry, &self.identity, || {
            let request = self.client.post(&self.identity.api_url).json(&request_body);
            if self.api_key.is_empty() { request } else { request.bearer_auth(&self.api_key) }
        })
        .await?;

        let openai_response: OpenAIResponse = response.json().await.map_err(|e| {
            error!(backend = %self.identity, error = %e, "Failed to parse chat completion response");
            TranslatorError::Serialization(format!("Failed to parse response: {}", e))
        })?;

        openai_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                error!(backend = %self.identity, "No content in chat completion response");
                TranslatorError::EmptyResult
            })
    }

    fn identity(&self) -> &BackendIdentity {
        &self.identity
    }
}

// OpenAI API request/response structures

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> OpenAITranslator {
        OpenAITranslator::new(
            BackendIdentity::new("openai", "gpt-4o-mini", "http://localhost/v1/chat/completions"),
            "test-key",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let t = translator().with_max_tokens(0).with_temperature(0.0);
        assert_eq!(t.max_tokens, DEFAULT_MAX_TOKENS);
        assert!((t.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(translator().with_max_tokens(512).build_request("Hola")).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Hola");
    }

    #[test]
    fn test_identity() {
        assert_eq!(translator().identity().to_string(), "openai/gpt-4o-mini");
    }
}
