//! Transbridge Core - translation gateway over interchangeable LLM backends.
//!
//! This crate provides:
//! - [`TranslationService`]: validation, caching, backend selection and telemetry
//! - A layered cache ([`cache`]) with in-memory and Redis layers
//! - Prompt templating with language display names
//! - Bounded parallel batch translation
//! - TOML configuration that assembles the whole service
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//! use transbridge_core::{AppConfig, TranslateRequest};
//! use transbridge_models::BackendFactory;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load(Path::new("transbridge.toml"))?;
//!     let service = config.build_service(&BackendFactory::default()).await?;
//!     let request = TranslateRequest::new("Hello", "en", "fr");
//!     let outcome = service.translate(&CancellationToken::new(), &request).await?;
//!     println!("{}", outcome.text);
//!     service.close().await;
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cache;
pub mod config;
pub mod language;
pub mod prompt;
pub mod service;
pub mod telemetry;

pub use batch::BatchTranslator;
pub use cache::{Cache, CacheEntry, CacheError, CacheKey, MemoryCache, RedisCache, RedisSettings, Retention, TieredCache, Ttl};
pub use config::{AppConfig, ConfigError};
pub use prompt::{PromptTemplate, TemplateError};
pub use service::{TranslateRequest, TranslationError, TranslationOutcome, TranslationService};
pub use telemetry::{JsonLinesSink, TelemetryError, TelemetrySink, TranslationLogger, TranslationRecord};
