//! Ollama chat backend.
//!
//! Posts non-streaming requests to an Ollama `/api/chat` endpoint (the full
//! URL is configured per provider).

use crate::retry::{RetryPolicy, send_with_retry};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use transbridge_abstraction::{BackendIdentity, Translator, TranslatorError};

/// Ollama translator implementation.
#[derive(Debug, Clone)]
pub struct OllamaTranslator {
    /// Provider, model and endpoint of this backend.
    identity: BackendIdentity,
    /// Optional bearer token for proxied deployments.
    api_key: Option<String>,
    /// Sampling temperature.
    temperature: Option<f32>,
    /// Maps to Ollama's `num_predict`.
    max_tokens: Option<u32>,
    /// Retry policy for each call.
    retry: RetryPolicy,
    /// HTTP client carrying the per-call timeout.
    client: Client,
}

impl OllamaTranslator {
    /// Creates a new `OllamaTranslator`.
    ///
    /// # Arguments
    /// * `identity` - Provider, model and full chat URL (e.g. "http://localhost:11434/api/chat")
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    /// Returns a `TranslatorError` if the HTTP client cannot be created.
    pub fn new(identity: BackendIdentity, timeout: Duration) -> Result<Self, TranslatorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranslatorError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            identity,
            api_key: None,
            temperature: None,
            max_tokens: None,
            retry: RetryPolicy::default(),
            client,
        })
    }

    /// Sets a bearer token; an empty key disables authorization.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.is_empty()).then_some(api_key);
        self
    }

    /// Sets generation options forwarded in the request `options` object.
    #[must_use]
    pub fn with_options(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build OllamaOptions from the configured generation settings
    fn build_options(&self) -> Option<OllamaOptions> {
        if self.temperature.is_none() && self.max_tokens.is_none() {
            return None;
        }
        Some(OllamaOptions { temperature: self.temperature, num_predict: self.max_tokens })
    }

    fn build_request(&self, prompt: &str) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.identity.model.clone(),
            messages: vec![OllamaMessage { role: "user".to_string(), content: prompt.to_string() }],
            stream: false,
            options: self.build_options(),
        }
    }

    fn log_failure_hint(&self, err: &TranslatorError) {
        let TranslatorError::Status { status, body } = err else {
            return;
        };
        let message = serde_json::from_str::<OllamaError>(body).map(|e| e.error).unwrap_or_default();
        if *status == 404 || (message.contains("model") && message.contains("not found")) {
            error!(
                backend = %self.identity,
                "Model '{}' not found. Pull it with 'ollama pull {}'.",
                self.identity.model,
                self.identity.model
            );
        } else if message.contains("out of memory") || message.contains("OOM") {
            error!(backend = %self.identity, "Insufficient memory to load model. Try a smaller variant.");
        }
    }
}

// Ollama API request/response structures
#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>, // max_tokens equivalent
}

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
}

#[derive(Deserialize)]
struct OllamaError {
    error: String,
}

#[async_trait]
impl Translator for OllamaTranslator {
    async fn translate(&self, prompt: &str) -> Result<String, TranslatorError> {
        debug!(
            backend = %self.identity,
            prompt_len = prompt.len(),
            "OllamaTranslator sending chat request"
        );

        let request_body = self.build_request(prompt);

        let response = send_with_retry(&self.retry, &self.identity, || {
            let request = self.client.post(&self.identity.api_url).json(&request_body);
            match &self.api_key {
                Some(key) => request.bearer_auth(key),
                None => request,
            }
        })
        .await
        .inspect_err(|e| self.log_failure_hint(e))?;

        let ollama_response: OllamaChatResponse = response.json().await.map_err(|e| {
            error!(backend = %self.identity, error = %e, "Failed to parse Ollama API response");
            TranslatorError::Serialization(format!("Failed to parse response: {}", e))
        })?;

        ollama_response
            .message
            .map(|m| m.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(TranslatorError::EmptyResult)
    }

    fn identity(&self) -> &BackendIdentity {
        &self.identity
    }
}
