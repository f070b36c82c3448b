//! Gateway configuration file.
//!
//! The file is TOML:
//!
//! ```toml
//! [prompt]
//! template = "Translate from {{source_lang}} to {{target_lang}}:\n{{input}}"
//!
//! [[providers]]
//! provider = "openai"
//! api_url = "https://api.openai.com/v1/chat/completions"
//! api_key_env = "OPENAI_API_KEY"
//! is_default = true
//!
//! [[providers.models]]
//! name = "gpt-4o-mini"
//! weight = 3
//!
//! [cache]
//! enabled = true
//! types = ["memory", "redis"]
//!
//! [cache.memory]
//! ttl = "1h"
//! max_size = 10000
//! ```

mod ttl;

pub use ttl::{TtlSetting, parse_ttl};

use crate::batch::DEFAULT_CONCURRENCY;
use crate::cache::{
    Cache, CacheError, DEFAULT_MAX_SIZE, DEFAULT_REDIS_TTL, MemoryCache, RedisCache, RedisSettings, Retention,
    TieredCache,
};
use crate::prompt::{DEFAULT_TEMPLATE, PromptTemplate};
use crate::service::TranslationService;
use crate::telemetry::{DEFAULT_QUEUE_SIZE, TelemetryError, TranslationLogger};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use transbridge_models::{BackendFactory, ModelRegistry, ProviderConfig, RegistryError};

/// Default retention of the memory layer.
pub const DEFAULT_MEMORY_TTL: Duration = Duration::from_secs(3600);

/// Errors that can occur when loading or applying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Semantically invalid configuration.
    #[error("Configuration validation error: {0}")]
    Validation(String),

    /// The provider list could not be turned into a registry.
    #[error("Backend registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A cache layer could not be constructed.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The telemetry sink could not be opened.
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// `[prompt]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSection {
    /// Default prompt template.
    #[serde(default = "default_template")]
    pub template: String,
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

impl Default for PromptSection {
    fn default() -> Self {
        Self { template: default_template() }
    }
}

/// `[cache.memory]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySection {
    /// Default retention (empty: 1 hour).
    #[serde(default)]
    pub ttl: TtlSetting,
    /// Maximum entry count (zero or negative: 10000).
    #[serde(default)]
    pub max_size: i64,
}

/// `[cache.redis]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisSection {
    /// Full connection URL; overrides host/port/password/db.
    #[serde(default)]
    pub url: Option<String>,
    /// Server host.
    #[serde(default = "default_redis_host")]
    pub host: String,
    /// Server port.
    #[serde(default = "default_redis_port")]
    pub port: u16,
    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,
    /// Database index.
    #[serde(default)]
    pub db: i64,
    /// Default retention (empty: 24 hours).
    #[serde(default)]
    pub ttl: TtlSetting,
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            url: None,
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
            ttl: TtlSetting::default(),
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSection {
    /// Whether caching is enabled at all.
    #[serde(default)]
    pub enabled: bool,
    /// Layer kinds, fastest first (`"memory"`, `"redis"`). Empty means memory only.
    #[serde(default)]
    pub types: Vec<String>,
    /// Memory layer settings.
    #[serde(default)]
    pub memory: MemorySection,
    /// Redis layer settings.
    #[serde(default)]
    pub redis: RedisSection,
}

/// `[log]` section: per-request telemetry records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSection {
    /// Whether records are written.
    #[serde(default)]
    pub enabled: bool,
    /// JSON-lines output file.
    #[serde(default = "default_log_path")]
    pub file_path: String,
    /// Queue capacity; records beyond it are dropped.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

fn default_log_path() -> String {
    "translation.log".to_string()
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

impl Default for LogSection {
    fn default() -> Self {
        Self { enabled: false, file_path: default_log_path(), queue_size: default_queue_size() }
    }
}

/// `[batch]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSection {
    /// Maximum concurrent translations per batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl Default for BatchSection {
    fn default() -> Self {
        Self { concurrency: default_concurrency() }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Prompt settings.
    #[serde(default)]
    pub prompt: PromptSection,
    /// Providers in declaration order.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Cache settings.
    #[serde(default)]
    pub cache: CacheSection,
    /// Telemetry settings.
    #[serde(default)]
    pub log: LogSection,
    /// Batch settings.
    #[serde(default)]
    pub batch: BatchSection,
}

impl AppConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), providers = config.providers.len(), "Configuration loaded");
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    /// Returns an error if the text cannot be parsed or validated.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can be checked without I/O.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prompt_template()?;

        if self.providers.is_empty() {
            return Err(ConfigError::Validation("at least one provider must be configured".to_string()));
        }
        for provider in &self.providers {
            if provider.models.is_empty() {
                return Err(ConfigError::Validation(format!("provider '{}' has no models", provider.provider)));
            }
        }

        if self.cache.enabled {
            for kind in &self.cache.types {
                if !matches!(kind.as_str(), "memory" | "redis") {
                    return Err(ConfigError::Validation(format!("unsupported cache type: {}", kind)));
                }
            }
            self.memory_retention()?;
            self.redis_retention()?;
        }
        Ok(())
    }

    /// The validated default prompt template.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if the template lacks `{{input}}`.
    pub fn prompt_template(&self) -> Result<PromptTemplate, ConfigError> {
        PromptTemplate::new(self.prompt.template.as_str()).map_err(|e| ConfigError::Validation(e.to_string()))
    }

    fn memory_retention(&self) -> Result<Retention, ConfigError> {
        Ok(self.cache.memory.ttl.retention()?.unwrap_or(Retention::For(DEFAULT_MEMORY_TTL)))
    }

    fn redis_retention(&self) -> Result<Retention, ConfigError> {
        Ok(self.cache.redis.ttl.retention()?.unwrap_or(Retention::For(DEFAULT_REDIS_TTL)))
    }

    fn memory_max_size(&self) -> usize {
        usize::try_from(self.cache.memory.max_size).ok().filter(|n| *n > 0).unwrap_or(DEFAULT_MAX_SIZE)
    }

    /// Builds the configured cache chain. Must be called within a Tokio runtime.
    ///
    /// Returns `None` when caching is disabled.
    ///
    /// # Errors
    /// Returns an error for invalid TTLs or a malformed Redis URL.
    pub fn build_cache(&self) -> Result<Option<Arc<dyn Cache>>, ConfigError> {
        if !self.cache.enabled {
            return Ok(None);
        }

        let kinds: Vec<&str> = if self.cache.types.is_empty() {
            vec!["memory"]
        } else {
            self.cache.types.iter().map(String::as_str).collect()
        };

        let mut layers: Vec<Arc<dyn Cache>> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match kind {
                "memory" => {
                    layers.push(Arc::new(MemoryCache::new(self.memory_retention()?, self.memory_max_size())));
                }
                "redis" => {
                    let redis = &self.cache.redis;
                    let settings = RedisSettings {
                        url: redis.url.clone(),
                        host: redis.host.clone(),
                        port: redis.port,
                        password: redis.password.clone(),
                        db: redis.db,
                        retention: self.redis_retention()?,
                    };
                    layers.push(Arc::new(RedisCache::new(&settings)?));
                }
                other => return Err(ConfigError::Validation(format!("unsupported cache type: {}", other))),
            }
        }

        info!(layers = layers.len(), "Cache enabled");
        if layers.len() == 1 {
            return Ok(layers.pop());
        }
        Ok(Some(Arc::new(TieredCache::new(layers))))
    }

    /// Opens the telemetry sink, or returns `None` when disabled.
    ///
    /// # Errors
    /// Returns `ConfigError::Telemetry` if the log file cannot be opened.
    pub async fn build_telemetry(&self) -> Result<Option<Arc<TranslationLogger>>, ConfigError> {
        if !self.log.enabled {
            return Ok(None);
        }
        let logger = TranslationLogger::to_file(&self.log.file_path, self.log.queue_size).await?;
        Ok(Some(Arc::new(logger)))
    }

    /// Assembles the full translation service: registry, cache, telemetry and template.
    ///
    /// # Errors
    /// Returns the first construction error.
    pub async fn build_service(&self, factory: &BackendFactory) -> Result<TranslationService, ConfigError> {
        let registry = ModelRegistry::build(&self.providers, factory)?;
        let mut service = TranslationService::new(Arc::new(registry)).with_template(self.prompt_template()?);
        if let Some(cache) = self.build_cache()? {
            service = service.with_cache(cache);
        }
        if let Some(telemetry) = self.build_telemetry().await? {
            service = service.with_telemetry(telemetry);
        }
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[[providers]]
provider = "mock"
api_url = "mock://local"

[[providers.models]]
name = "echo"
"#;

    #[test]
    fn test_minimal_defaults() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.prompt.template, DEFAULT_TEMPLATE);
        assert_eq!(config.providers[0].models[0].weight, 1);
        assert_eq!(config.providers[0].timeout, 30);
        assert!(!config.cache.enabled);
        assert!(!config.log.enabled);
        assert_eq!(config.batch.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.memory_max_size(), DEFAULT_MAX_SIZE);
    }

    #[test]
    fn test_template_without_input_rejected() {
        let content = format!("[prompt]\ntemplate = \"Translate to {{{{target_lang}}}}\"\n{}", MINIMAL);
        let err = AppConfig::from_toml_str(&content).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("{{input}}")));
    }

    #[test]
    fn test_empty_providers_rejected() {
        assert!(matches!(AppConfig::from_toml_str(""), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_unknown_cache_type_rejected() {
        let content = format!("{}\n[cache]\nenabled = true\ntypes = [\"memcached\"]\n", MINIMAL);
        assert!(matches!(AppConfig::from_toml_str(&content), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_ttl_settings() {
        let content = format!(
            "{}\n[cache]\nenabled = true\n[cache.memory]\nttl = \"5m\"\n[cache.redis]\nttl = -1\n",
            MINIMAL
        );
        let config = AppConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.memory_retention().unwrap(), Retention::For(Duration::from_secs(300)));
        assert_eq!(config.redis_retention().unwrap(), Retention::Permanent);

        let defaults = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(defaults.memory_retention().unwrap(), Retention::For(DEFAULT_MEMORY_TTL));
        assert_eq!(defaults.redis_retention().unwrap(), Retention::For(DEFAULT_REDIS_TTL));
    }

    #[test]
    fn test_bad_ttl_rejected() {
        let content = format!("{}\n[cache]\nenabled = true\n[cache.memory]\nttl = \"3 fortnights\"\n", MINIMAL);
        assert!(matches!(AppConfig::from_toml_str(&content), Err(ConfigError::Validation(_))));
    }

    #[tokio::test]
    async fn test_build_cache_layers() {
        let disabled = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert!(disabled.build_cache().unwrap().is_none());

        let memory = AppConfig::from_toml_str(&format!("{}\n[cache]\nenabled = true\n", MINIMAL)).unwrap();
        assert_eq!(memory.build_cache().unwrap().unwrap().name(), "memory");

        let tiered = AppConfig::from_toml_str(&format!(
            "{}\n[cache]\nenabled = true\ntypes = [\"memory\", \"redis\"]\n",
            MINIMAL
        ))
        .unwrap();
        assert_eq!(tiered.build_cache().unwrap().unwrap().name(), "tiered");
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/transbridge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
