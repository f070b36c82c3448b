//! Redis cache layer.
//!
//! Uses a `ConnectionManager` that is created on first use, so constructing the
//! layer never blocks startup on an unreachable server. Every failure maps to
//! [`CacheError::Unavailable`].

use super::{Cache, CacheError, Retention, Ttl};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Default retention of the Redis layer.
pub const DEFAULT_REDIS_TTL: Duration = Duration::from_secs(24 * 3600);

/// Connection settings for [`RedisCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    /// Full connection URL; takes precedence over host/port/password/db.
    pub url: Option<String>,
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Optional password.
    pub password: Option<String>,
    /// Database index.
    pub db: i64,
    /// Retention for writes with the layer-default directive.
    pub retention: Retention,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
            retention: Retention::For(DEFAULT_REDIS_TTL),
        }
    }
}

impl RedisSettings {
    /// The URL handed to the Redis client.
    pub fn connection_url(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return url.to_string();
        }
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Cache layer backed by a Redis server.
pub struct RedisCache {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    retention: Retention,
    closed: AtomicBool,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("connected", &self.connection.initialized())
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Creates the layer. Only the URL is validated here; the connection is
    /// established by the first operation.
    ///
    /// # Errors
    /// Returns `CacheError::Unavailable` if the connection URL is malformed.
    pub fn new(settings: &RedisSettings) -> Result<Self, CacheError> {
        let client = Client::open(settings.connection_url())
            .map_err(|e| CacheError::Unavailable(format!("invalid redis settings: {}", e)))?;

        info!(host = %settings.host, port = settings.port, db = settings.db, "Redis cache configured");

        Ok(Self {
            client,
            connection: OnceCell::new(),
            retention: settings.retention,
            closed: AtomicBool::new(false),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        let manager = self
            .connection
            .get_or_try_init(|| async {
                debug!("Opening redis connection");
                ConnectionManager::new(self.client.clone()).await.map_err(unavailable)
            })
            .await?;
        Ok(manager.clone())
    }
}

/// Arguments of the `SET` command for a resolved expiry.
///
/// `None` leaves the key without expiry; otherwise `PX` with at least one millisecond.
pub(crate) fn expiry_args(expiry: Option<Duration>) -> Option<(&'static str, u64)> {
    expiry.map(|d| ("PX", u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1)))
}

fn unavailable(e: redis::RedisError) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await.map_err(unavailable)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some((unit, amount)) = expiry_args(ttl.resolve(self.retention)) {
            cmd.arg(unit).arg(amount);
        }
        let () = cmd.query_async(&mut conn).await.map_err(unavailable)?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let () = redis::cmd("FLUSHDB").query_async(&mut conn).await.map_err(unavailable)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Redis cache closed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url() {
        let mut settings = RedisSettings::default();
        assert_eq!(settings.connection_url(), "redis://localhost:6379/0");

        settings.password = Some("secret".to_string());
        settings.db = 2;
        assert_eq!(settings.connection_url(), "redis://:secret@localhost:6379/2");

        settings.url = Some("redis://cache.internal:6380/1".to_string());
        assert_eq!(settings.connection_url(), "redis://cache.internal:6380/1");
    }

    #[test]
    fn test_expiry_args() {
        assert_eq!(expiry_args(None), None);
        assert_eq!(expiry_args(Some(Duration::from_secs(2))), Some(("PX", 2000)));
        assert_eq!(expiry_args(Some(Duration::from_micros(10))), Some(("PX", 1)));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let settings = RedisSettings { url: Some("not a url".to_string()), ..RedisSettings::default() };
        assert!(matches!(RedisCache::new(&settings), Err(CacheError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_closed_layer_rejects_operations() {
        let cache = RedisCache::new(&RedisSettings::default()).unwrap();
        cache.close().await.unwrap();
        assert_eq!(cache.get("k").await, Err(CacheError::Closed));
    }

    #[tokio::test]
    #[ignore = "Requires a running Redis server"]
    async fn test_round_trip_against_server() {
        let settings = RedisSettings { db: 15, ..RedisSettings::default() };
        let cache = RedisCache::new(&settings).unwrap();
        cache.clear().await.unwrap();

        cache.set("transbridge:test", "v", Ttl::Explicit(Duration::from_secs(30))).await.unwrap();
        assert_eq!(cache.get("transbridge:test").await.unwrap().as_deref(), Some("v"));

        cache.clear().await.unwrap();
        assert_eq!(cache.get("transbridge:test").await.unwrap(), None);
    }
}
