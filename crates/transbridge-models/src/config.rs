//! Provider and model configuration consumed by the backend factory and registry.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_timeout_secs() -> u64 {
    30
}

fn default_weight() -> u32 {
    1
}

/// One configured provider endpoint and the models it serves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Provider name, used as the first half of every backend identity.
    pub provider: String,

    /// Backend kind tag (e.g., "openai", "ollama"). Defaults to `provider`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Full endpoint URL requests are posted to.
    pub api_url: String,

    /// Bearer token sent with every request (may be empty).
    #[serde(default)]
    pub api_key: String,

    /// Environment variable consulted when `api_key` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,

    /// Whether this provider supplies the default backend.
    #[serde(default)]
    pub is_default: bool,

    /// Models served by this provider, in declaration order.
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

impl ProviderConfig {
    /// Creates a provider with no models and default settings.
    #[must_use]
    pub fn new(provider: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind: None,
            api_url: api_url.into(),
            api_key: String::new(),
            api_key_env: None,
            timeout: default_timeout_secs(),
            is_default: false,
            models: Vec::new(),
        }
    }

    /// Sets the backend kind tag.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Marks this provider as the default one.
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Appends a model entry.
    #[must_use]
    pub fn with_model(mut self, model: ModelEntry) -> Self {
        self.models.push(model);
        self
    }

    /// The backend kind tag, falling back to the provider name.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.provider)
    }

    /// The API key, read from `api_key_env` when the inline key is empty.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    #[must_use]
    pub fn resolve_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_default()
    }

    /// The provider-wide request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// One model served by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelEntry {
    /// Model name sent to the endpoint.
    pub name: String,

    /// Relative weight for weighted selection (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Completion token limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Timeout in seconds overriding the provider's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl ModelEntry {
    /// Creates a model entry with weight 1 and no overrides.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: default_weight(),
            max_tokens: None,
            temperature: None,
            timeout: None,
        }
    }

    /// Sets the selection weight.
    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Effective timeout: the model override if present, else the provider's.
    #[must_use]
    pub fn effective_timeout(&self, provider: &ProviderConfig) -> Duration {
        self.timeout.map_or_else(|| provider.timeout(), Duration::from_secs)
    }
}
