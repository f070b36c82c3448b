//! Translation orchestrator.
//!
//! Each call is independent: validate, consult the cache, pick a backend,
//! render the prompt, translate, write back, record telemetry. The registry,
//! cache and telemetry queue are shared read-only handles.

use crate::cache::{Cache, CacheEntry, CacheKey, Ttl};
use crate::prompt::PromptTemplate;
use crate::telemetry::{TranslationLogger, TranslationRecord};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use transbridge_abstraction::{BackendIdentity, Translator, TranslatorError};
use transbridge_models::{ModelRegistry, RegistryError};

/// Caller-facing translation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    /// Unusable configuration or prompt template.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No backend matches the requested provider/model pair.
    #[error("model {model} not found for provider {provider}")]
    NotFound {
        /// The requested provider.
        provider: String,
        /// The requested model.
        model: String,
    },

    /// The selected backend failed.
    #[error("translation failed with {backend}: {source}")]
    TranslationFailed {
        /// Backend that was called.
        backend: BackendIdentity,
        /// Failure reported by the backend.
        #[source]
        source: TranslatorError,
    },

    /// The caller cancelled the request.
    #[error("translation cancelled")]
    Cancelled,

    /// A worker task failed unexpectedly.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RegistryError> for TranslationError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Config(msg) => Self::Config(msg),
            RegistryError::NotFound { provider, model } => Self::NotFound { provider, model },
        }
    }
}

/// One translation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslateRequest {
    /// Requested provider; only honored together with `model`.
    pub provider: Option<String>,
    /// Requested model; only honored together with `provider`.
    pub model: Option<String>,
    /// Per-request prompt template; the service default is used when absent.
    pub prompt_template: Option<String>,
    /// Text to translate.
    pub text: String,
    /// Source language code; may be empty.
    pub source_lang: String,
    /// Target language code.
    pub target_lang: String,
}

impl TranslateRequest {
    /// Creates a request that lets the service choose the backend.
    pub fn new(text: impl Into<String>, source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            ..Self::default()
        }
    }

    /// Pins the request to a provider/model pair.
    #[must_use]
    pub fn with_backend(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.model = Some(model.into());
        self
    }

    /// Overrides the prompt template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    fn requested_backend(&self) -> Option<(&str, &str)> {
        let provider = self.provider.as_deref().filter(|p| !p.is_empty())?;
        let model = self.model.as_deref().filter(|m| !m.is_empty())?;
        Some((provider, model))
    }
}

/// Result of a successful translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationOutcome {
    /// The translated text.
    pub text: String,
    /// Whether the text came from the cache.
    pub cache_hit: bool,
    /// Backend that produced the text (for a cache hit, the one recorded in the entry).
    pub backend: BackendIdentity,
}

/// Cache-aside translation service over a backend registry.
pub struct TranslationService {
    registry: Arc<ModelRegistry>,
    cache: Option<Arc<dyn Cache>>,
    telemetry: Option<Arc<TranslationLogger>>,
    template: PromptTemplate,
}

impl std::fmt::Debug for TranslationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationService")
            .field("registry", &self.registry)
            .field("cache", &self.cache.as_ref().map(|c| c.name().to_string()))
            .field("telemetry", &self.telemetry.is_some())
            .field("template", &self.template)
            .finish()
    }
}

impl TranslationService {
    /// Creates a service without cache or telemetry, using the default template.
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry, cache: None, telemetry: None, template: PromptTemplate::default() }
    }

    /// Adds a cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Adds a telemetry queue.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<TranslationLogger>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Replaces the default prompt template.
    #[must_use]
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// The backend registry.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Translates one request.
    ///
    /// # Errors
    /// - `InvalidRequest` for empty text or target language
    /// - `Config` for a template without `{{input}}` (no backend is called)
    /// - `TranslationFailed` if the backend fails
    /// - `Cancelled` if `cancel` fires before the backend answers
    ///
    /// A cancellation during write-back skips the cache write but still
    /// returns the translation.
    pub async fn translate(
        &self,
        cancel: &CancellationToken,
        request: &TranslateRequest,
    ) -> Result<TranslationOutcome, TranslationError> {
        if request.text.is_empty() {
            return Err(TranslationError::InvalidRequest("text is required".to_string()));
        }
        if request.target_lang.is_empty() {
            return Err(TranslationError::InvalidRequest("target language is required".to_string()));
        }
        if cancel.is_cancelled() {
            return Err(TranslationError::Cancelled);
        }

        let started = Instant::now();
        let key = CacheKey::new(&request.source_lang, &request.target_lang, &request.text);

        if let Some(cache) = &self.cache {
            if let Some(entry) = self.lookup(cancel, cache.as_ref(), request, &key).await? {
                debug!(cache_key = %key, provider = %entry.provider, model = %entry.model, "Cache hit");
                let backend = BackendIdentity::new(entry.provider, entry.model, entry.api_url);
                self.record(request, &entry.translation, &backend, &key, true, started);
                return Ok(TranslationOutcome { text: entry.translation, cache_hit: true, backend });
            }
        }

        let backend = self.select_backend(request);
        let identity = backend.identity().clone();

        let template = match &request.prompt_template {
            Some(raw) => PromptTemplate::new(raw.as_str()).map_err(|e| TranslationError::Config(e.to_string()))?,
            None => self.template.clone(),
        };
        let prompt = template.render(&request.text, &request.source_lang, &request.target_lang);

        debug!(backend = %identity, cache_key = %key, "Calling backend");
        let translation = race(cancel, backend.translate(&prompt)).await?.map_err(|source| {
            warn!(backend = %identity, error = %source, "Backend translation failed");
            TranslationError::TranslationFailed { backend: identity.clone(), source }
        })?;

        if let Some(cache) = &self.cache {
            self.store(cancel, cache.as_ref(), &key, &translation, &identity).await;
        }

        self.record(request, &translation, &identity, &key, false, started);
        Ok(TranslationOutcome { text: translation, cache_hit: false, backend: identity })
    }

    /// Exact backend lookup.
    ///
    /// # Errors
    /// Returns `TranslationError::NotFound` if no backend matches.
    pub fn backend(&self, provider: &str, model: &str) -> Result<Arc<dyn Translator>, TranslationError> {
        Ok(self.registry.get_exact(provider, model)?)
    }

    /// Every configured backend in declaration order.
    pub fn list_models(&self) -> Vec<BackendIdentity> {
        self.registry.list_all()
    }

    /// Model names of one provider in declaration order.
    pub fn list_models_by_provider(&self, provider: &str) -> Vec<String> {
        self.registry.list_by_provider(provider)
    }

    /// Drains telemetry, closes the cache and releases every backend.
    pub async fn close(&self) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.close().await;
        }
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.close().await {
                warn!(error = %e, "Failed to close cache");
            }
        }
        if let Err(e) = self.registry.close().await {
            warn!(error = %e, "Failed to close backend");
        }
        info!("Translation service closed");
    }

    fn select_backend(&self, request: &TranslateRequest) -> Arc<dyn Translator> {
        match request.requested_backend() {
            Some((provider, model)) => self.registry.get_exact(provider, model).unwrap_or_else(|e| {
                warn!(provider, model, error = %e, "Requested model unavailable, falling back to default");
                self.registry.get_default()
            }),
            None => self.registry.get_weighted(),
        }
    }

    /// Reads the current key, then the legacy key. Cache failures are soft misses.
    async fn lookup(
        &self,
        cancel: &CancellationToken,
        cache: &dyn Cache,
        request: &TranslateRequest,
        key: &CacheKey,
    ) -> Result<Option<CacheEntry>, TranslationError> {
        if let Some(entry) = race(cancel, read_entry(cache, key)).await? {
            return Ok(Some(entry));
        }

        let legacy = CacheKey::legacy(&request.source_lang, &request.target_lang, &request.text);
        let Some(entry) = race(cancel, read_entry(cache, &legacy)).await? else {
            return Ok(None);
        };

        debug!(legacy_key = %legacy, cache_key = %key, "Legacy cache hit, rewriting under current key");
        if let Ok(raw) = entry.to_json() {
            if let Err(e) = race(cancel, cache.set(key.as_str(), &raw, Ttl::LayerDefault)).await? {
                warn!(cache_key = %key, error = %e, "Failed to migrate legacy cache entry");
            }
        }
        Ok(Some(entry))
    }

    async fn store(
        &self,
        cancel: &CancellationToken,
        cache: &dyn Cache,
        key: &CacheKey,
        translation: &str,
        backend: &BackendIdentity,
    ) {
        let entry = CacheEntry {
            translation: translation.to_string(),
            provider: backend.provider.clone(),
            api_url: backend.api_url.clone(),
            model: backend.model.clone(),
        };
        let raw = match entry.to_json() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Failed to encode cache entry");
                return;
            }
        };
        match race(cancel, cache.set(key.as_str(), &raw, Ttl::LayerDefault)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(cache_key = %key, error = %e, "Failed to cache translation"),
            Err(_) => debug!(cache_key = %key, "Request cancelled, cache write skipped"),
        }
    }

    fn record(
        &self,
        request: &TranslateRequest,
        translation: &str,
        backend: &BackendIdentity,
        key: &CacheKey,
        cache_hit: bool,
        started: Instant,
    ) {
        let Some(telemetry) = &self.telemetry else {
            return;
        };
        let record = TranslationRecord {
            timestamp: Utc::now(),
            source_text: request.text.clone(),
            target_text: translation.to_string(),
            source_lang: request.source_lang.clone(),
            target_lang: request.target_lang.clone(),
            api_url: backend.api_url.clone(),
            provider: backend.provider.clone(),
            model: backend.model.clone(),
            cache_key: key.to_string(),
            cache_hit,
            process_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        if let Err(e) = telemetry.log(record) {
            warn!(cache_key = %key, error = %e, "Failed to log translation");
        }
    }
}

async fn read_entry(cache: &dyn Cache, key: &CacheKey) -> Option<CacheEntry> {
    match cache.get(key.as_str()).await {
        Ok(Some(raw)) => match CacheEntry::from_json(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(cache_key = %key, error = %e, "Cache lookup failed");
            None
        }
    }
}

/// Runs `fut` unless `cancel` fires first.
async fn race<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, TranslationError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TranslationError::Cancelled),
        output = fut => Ok(output),
    }
}
