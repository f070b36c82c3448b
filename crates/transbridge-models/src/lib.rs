//! Translation backends for Transbridge.
//!
//! This crate provides concrete implementations of the `Translator` trait and
//! the registry that selects between them.
//!
//! # Supported Backends
//!
//! - **OpenAI-compatible**: any `/chat/completions` endpoint (OpenAI, DeepSeek, vLLM, ...)
//! - **Ollama**: local models via the Ollama chat API
//! - **Mock**: echoing backend for testing and local development

pub mod config;
pub mod factory;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod retry;

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use transbridge_abstraction::{BackendIdentity, Translator, TranslatorError};

pub use config::{ModelEntry, ProviderConfig};
pub use factory::{BackendBuilder, BackendFactory, BackendKind, FactoryError};
pub use ollama::OllamaTranslator;
pub use openai::OpenAITranslator;
pub use registry::{ModelRegistry, RegistryError, WeightedBackend};
pub use retry::RetryPolicy;

/// A mock implementation of the `Translator` trait for testing and demonstration.
///
/// By default it echoes the prompt back. It counts calls and remembers the
/// last prompt so tests can assert on backend traffic.
#[derive(Debug)]
pub struct MockTranslator {
    identity: BackendIdentity,
    outcome: Result<Option<String>, TranslatorError>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockTranslator {
    /// Creates an echoing `MockTranslator`.
    #[must_use]
    pub fn new(identity: BackendIdentity) -> Self {
        Self { identity, outcome: Ok(None), calls: AtomicUsize::new(0), last_prompt: Mutex::new(None) }
    }

    /// Always answers with `response`.
    #[must_use]
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.outcome = Ok(Some(response.into()));
        self
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn failing(mut self, error: TranslatorError) -> Self {
        self.outcome = Err(error);
        self
    }

    /// Number of `translate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The prompt of the most recent call.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, prompt: &str) -> Result<String, TranslatorError> {
        debug!(backend = %self.identity, prompt_len = prompt.len(), "MockTranslator translating");

        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap_or_else(PoisonError::into_inner) = Some(prompt.to_string());

        match &self.outcome {
            Ok(Some(response)) => Ok(response.clone()),
            Ok(None) => Ok(prompt.to_string()),
            Err(e) => Err(e.clone()),
        }
    }

    fn identity(&self) -> &BackendIdentity {
        &self.identity
    }
}
