//! Backend factory for creating translator instances from configuration.
//!
//! Backend kinds are registered by tag. The registry only asks the factory to
//! build a backend for a `(provider, model)` pair, so new kinds can be plugged
//! in with [`BackendFactory::register`] without touching registry construction.

use crate::config::{ModelEntry, ProviderConfig};
use crate::ollama::OllamaTranslator;
use crate::openai::OpenAITranslator;
use crate::MockTranslator;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use transbridge_abstraction::{BackendIdentity, Translator, TranslatorError};

/// Builds one backend for a model of a provider.
pub trait BackendBuilder: Send + Sync {
    /// Creates the backend.
    ///
    /// # Errors
    /// Returns a `TranslatorError` if the backend cannot be constructed.
    fn build(
        &self,
        provider: &ProviderConfig,
        model: &ModelEntry,
    ) -> Result<Arc<dyn Translator>, TranslatorError>;
}

impl<F> BackendBuilder for F
where
    F: Fn(&ProviderConfig, &ModelEntry) -> Result<Arc<dyn Translator>, TranslatorError>
        + Send
        + Sync,
{
    fn build(
        &self,
        provider: &ProviderConfig,
        model: &ModelEntry,
    ) -> Result<Arc<dyn Translator>, TranslatorError> {
        self(provider, model)
    }
}

/// Built-in backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Echoing mock backend for local development.
    Mock,
    /// OpenAI-compatible chat completions endpoint.
    OpenAI,
    /// Ollama chat endpoint.
    Ollama,
}

impl FromStr for BackendKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "openai" | "openai-compatible" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl BackendBuilder for BackendKind {
    fn build(
        &self,
        provider: &ProviderConfig,
        model: &ModelEntry,
    ) -> Result<Arc<dyn Translator>, TranslatorError> {
        let identity =
            BackendIdentity::new(&provider.provider, &model.name, &provider.api_url);
        let timeout = model.effective_timeout(provider);

        match self {
            Self::Mock => Ok(Arc::new(MockTranslator::new(identity))),
            Self::OpenAI => {
                let translator = OpenAITranslator::new(identity, provider.resolve_api_key(), timeout)?
                    .with_max_tokens(model.max_tokens.unwrap_or(0))
                    .with_temperature(model.temperature.unwrap_or(0.0));
                Ok(Arc::new(translator))
            }
            Self::Ollama => {
                let translator = OllamaTranslator::new(identity, timeout)?
                    .with_api_key(provider.resolve_api_key())
                    .with_options(model.temperature, model.max_tokens);
                Ok(Arc::new(translator))
            }
        }
    }
}

/// Errors that can occur when creating a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactoryError {
    /// No builder registered for this kind tag.
    #[error("unsupported provider kind: {0}")]
    UnknownKind(String),

    /// The builder rejected the configuration.
    #[error("failed to build backend: {0}")]
    Build(#[from] TranslatorError),
}

/// Factory mapping kind tags to backend builders.
pub struct BackendFactory {
    builders: HashMap<String, Arc<dyn BackendBuilder>>,
}

impl fmt::Debug for BackendFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendFactory").field("kinds", &self.kinds()).finish()
    }
}

impl Default for BackendFactory {
    /// A factory with the built-in kinds: `openai`, `openai-compatible`, `ollama`, `mock`.
    fn default() -> Self {
        let mut factory = Self::empty();
        factory
            .register("openai", BackendKind::OpenAI)
            .register("openai-compatible", BackendKind::OpenAI)
            .register("ollama", BackendKind::Ollama)
            .register("mock", BackendKind::Mock);
        factory
    }
}

impl BackendFactory {
    /// Creates a factory with no registered kinds.
    #[must_use]
    pub fn empty() -> Self {
        Self { builders: HashMap::new() }
    }

    /// Registers (or replaces) the builder for a kind tag. Tags are case-insensitive.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        builder: impl BackendBuilder + 'static,
    ) -> &mut Self {
        self.builders.insert(kind.into().to_lowercase(), Arc::new(builder));
        self
    }

    /// Registered kind tags, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.builders.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Creates the backend for `model` of `provider`.
    ///
    /// # Errors
    /// Returns `FactoryError::UnknownKind` if no builder is registered for the
    /// provider's kind, or `FactoryError::Build` if construction fails.
    pub fn create(
        &self,
        provider: &ProviderConfig,
        model: &ModelEntry,
    ) -> Result<Arc<dyn Translator>, FactoryError> {
        let kind = provider.kind().to_lowercase();
        debug!(
            kind = %kind,
            provider = %provider.provider,
            model = %model.name,
            "Creating backend instance"
        );

        let builder =
            self.builders.get(&kind).ok_or_else(|| FactoryError::UnknownKind(kind.clone()))?;
        builder.build(provider, model).map_err(FactoryError::Build)
    }
}
