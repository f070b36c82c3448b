//! Translation cache subsystem.
//!
//! Every layer implements [`Cache`]. Layers are combined fastest-to-slowest by
//! [`TieredCache`]. Values are the JSON-encoded [`CacheEntry`] payload; keys are
//! [`CacheKey`]s derived from the language pair and source text.

mod memory;
mod redis_cache;
mod tiered;

pub use memory::{DEFAULT_MAX_SIZE, DEFAULT_SWEEP_INTERVAL, MemoryCache};
pub use redis_cache::{DEFAULT_REDIS_TTL, RedisCache, RedisSettings};
pub use tiered::TieredCache;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Namespace prefix of current cache keys.
pub const KEY_PREFIX: &str = "transbridge:v2:";

/// Namespace prefix written by earlier deployments, consulted once on a miss.
pub const LEGACY_KEY_PREFIX: &str = "transbridge:";

/// Errors raised by a cache layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The layer could not serve the operation (connection refused, protocol error, ...).
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The layer has been closed.
    #[error("cache is closed")]
    Closed,
}

/// Expiry directive attached to every cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Never expires.
    Permanent,
    /// Use the receiving layer's configured retention.
    LayerDefault,
    /// Expires after the given duration.
    Explicit(Duration),
}

impl Ttl {
    /// Builds a directive from signed seconds: negative is permanent, zero is
    /// the layer default, positive is an explicit duration.
    #[must_use]
    pub fn from_secs_signed(secs: i64) -> Self {
        match secs {
            s if s < 0 => Self::Permanent,
            0 => Self::LayerDefault,
            s => Self::Explicit(Duration::from_secs(s.unsigned_abs())),
        }
    }

    /// Resolves the directive against a layer's retention. `None` means no expiry.
    #[must_use]
    pub fn resolve(self, layer_default: Retention) -> Option<Duration> {
        match self {
            Self::Permanent => None,
            Self::LayerDefault => layer_default.duration(),
            Self::Explicit(d) => Some(d),
        }
    }
}

/// Default retention of a cache layer, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Entries written with the layer default never expire.
    Permanent,
    /// Entries written with the layer default expire after this duration.
    For(Duration),
}

impl Retention {
    /// The expiry duration, or `None` when permanent.
    #[must_use]
    pub const fn duration(self) -> Option<Duration> {
        match self {
            Self::Permanent => None,
            Self::For(d) => Some(d),
        }
    }
}

/// One cache layer.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Looks up a key. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores a value under the given expiry directive.
    async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), CacheError>;

    /// Removes every entry of this layer.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Releases background tasks and connections. Safe to call more than once.
    async fn close(&self) -> Result<(), CacheError>;

    /// Short layer name for logging.
    fn name(&self) -> &str;
}

/// Content-addressed cache key for a `(source_lang, target_lang, text)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// The key under the current namespace.
    #[must_use]
    pub fn new(source_lang: &str, target_lang: &str, text: &str) -> Self {
        Self::with_prefix(KEY_PREFIX, source_lang, target_lang, text)
    }

    /// The key earlier deployments wrote for the same triple: md5 hex under the legacy namespace.
    #[must_use]
    pub fn legacy(source_lang: &str, target_lang: &str, text: &str) -> Self {
        let digest = Md5::digest(Self::material(source_lang, target_lang, text).as_bytes());
        Self(format!("{}{:x}", LEGACY_KEY_PREFIX, digest))
    }

    fn with_prefix(prefix: &str, source_lang: &str, target_lang: &str, text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(Self::material(source_lang, target_lang, text).as_bytes());
        Self(format!("{}{:x}", prefix, hasher.finalize()))
    }

    fn material(source_lang: &str, target_lang: &str, text: &str) -> String {
        format!("{}:{}:{}", source_lang, target_lang, text)
    }

    /// The key as stored in the cache.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cached translation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The translated text.
    pub translation: String,
    /// Provider of the backend that produced it.
    pub provider: String,
    /// Endpoint of the backend that produced it.
    pub api_url: String,
    /// Model of the backend that produced it.
    pub model: String,
}

impl CacheEntry {
    /// Encodes the entry as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes an entry from JSON.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_from_signed_seconds() {
        assert_eq!(Ttl::from_secs_signed(-1), Ttl::Permanent);
        assert_eq!(Ttl::from_secs_signed(0), Ttl::LayerDefault);
        assert_eq!(Ttl::from_secs_signed(90), Ttl::Explicit(Duration::from_secs(90)));
    }

    #[test]
    fn test_ttl_resolution() {
        let hour = Retention::For(Duration::from_secs(3600));
        assert_eq!(Ttl::Permanent.resolve(hour), None);
        assert_eq!(Ttl::LayerDefault.resolve(hour), Some(Duration::from_secs(3600)));
        assert_eq!(Ttl::LayerDefault.resolve(Retention::Permanent), None);
        assert_eq!(
            Ttl::Explicit(Duration::from_secs(5)).resolve(Retention::Permanent),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = CacheKey::new("en", "fr", "Hello");
        let b = CacheKey::new("en", "fr", "Hello");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with(KEY_PREFIX));
        // "transbridge:v2:" + 64 hex chars
        assert_eq!(a.as_str().len(), KEY_PREFIX.len() + 64);
    }

    #[test]
    fn test_cache_key_distinguishes_triples() {
        let base = CacheKey::new("en", "fr", "Hello");
        assert_ne!(base, CacheKey::new("en", "de", "Hello"));
        assert_ne!(base, CacheKey::new("fr", "en", "Hello"));
        assert_ne!(base, CacheKey::new("en", "fr", "Hello!"));
    }

    #[test]
    fn test_legacy_key_matches_earlier_deployments() {
        assert_eq!(
            CacheKey::legacy("en", "fr", "Hello").as_str(),
            "transbridge:e1193294863cc5910af305b3c86ef98a"
        );
        assert_eq!(
            CacheKey::legacy("en", "es", "Thank you").as_str(),
            "transbridge:e346b18ad3cd860e9bbf598f1e07afdb"
        );
        assert_ne!(CacheKey::legacy("en", "fr", "Hello"), CacheKey::new("en", "fr", "Hello"));
    }

    #[test]
    fn test_entry_wire_format() {
        let entry = CacheEntry {
            translation: "Bonjour".to_string(),
            provider: "openai".to_string(),
            api_url: "http://x".to_string(),
            model: "gpt-4o".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&entry.to_json().unwrap()).unwrap();
        assert_eq!(value["translation"], "Bonjour");
        assert_eq!(value["provider"], "openai");
        assert_eq!(value["api_url"], "http://x");
        assert_eq!(value["model"], "gpt-4o");
        assert!(CacheEntry::from_json("{\"translation\": 1}").is_err());
    }
}
