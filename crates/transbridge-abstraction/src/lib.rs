//! Backend abstraction layer for Transbridge.
//!
//! This crate defines the capability every translation backend exposes
//! (translate a rendered prompt, describe itself, release resources) and the
//! identity tuple used to key backends in the registry and in cache payloads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Represents an error that can occur when calling a translation backend.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslatorError {
    /// The request could not be delivered (connection refused, timeout, ...).
    #[error("Request Error: {0}")]
    Request(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("API error ({status}): {body}")]
    Status {
        /// The HTTP status code of the last attempt.
        status: u16,
        /// The drained response body of the last attempt.
        body: String,
    },

    /// The response was well formed but carried no translation.
    #[error("No translation result in response")]
    EmptyResult,

    /// The request or response body could not be (de)serialized.
    #[error("Serialization Error: {0}")]
    Serialization(String),

    /// Other unexpected errors.
    #[error("Other Backend Error: {0}")]
    Other(String),
}

impl TranslatorError {
    /// Whether another attempt against the same endpoint may succeed.
    ///
    /// Transport failures and non-success statuses are retryable; an empty or
    /// undecodable result is a semantic problem and is not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { .. })
    }
}

/// Uniquely identifies one configured backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackendIdentity {
    /// The provider name as configured (e.g., "openai", "ollama").
    pub provider: String,
    /// The model name served by the endpoint.
    pub model: String,
    /// The full endpoint URL requests are posted to.
    pub api_url: String,
}

impl BackendIdentity {
    /// Creates a new identity.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        Self { provider: provider.into(), model: model.into(), api_url: api_url.into() }
    }
}

impl fmt::Display for BackendIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// A backend able to turn a rendered prompt into a translation.
///
/// All backends must be `Send + Sync` so the registry can hand out shared
/// references to concurrent requests. Backends are built once and never
/// mutated afterwards.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Sends the rendered prompt to the backend and returns the translation.
    ///
    /// # Errors
    /// Returns a `TranslatorError` when every attempt failed or the backend
    /// produced no usable content.
    async fn translate(&self, prompt: &str) -> Result<String, TranslatorError>;

    /// Returns the identity of this backend.
    fn identity(&self) -> &BackendIdentity;

    /// Releases any resources held by the backend.
    ///
    /// # Errors
    /// Returns a `TranslatorError` if cleanup fails.
    async fn close(&self) -> Result<(), TranslatorError> {
        Ok(())
    }
}
