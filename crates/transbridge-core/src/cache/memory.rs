//! In-process cache layer with lazy expiry and a periodic sweep.

use super::{Cache, CacheError, Retention, Ttl};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default entry bound.
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// Interval of the background expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Counters exposed by [`MemoryCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryCacheStats {
    /// Lookups that returned a live entry.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries dropped to respect the size bound.
    pub evictions: u64,
    /// Entries removed by the background sweep.
    pub swept: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    swept: AtomicU64,
}

/// Concurrent key/value map with optional per-entry expiry.
///
/// Expired entries are removed lazily on `get` and by a background sweep that
/// runs every [`DEFAULT_SWEEP_INTERVAL`]. When the map is full, inserting a new
/// key evicts one arbitrary entry; the only guarantee is that the map never
/// holds more than `max_size` entries.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    retention: Retention,
    max_size: usize,
    counters: Arc<Counters>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryCache {
    /// Creates the cache and starts its sweep task.
    ///
    /// Must be called from within a Tokio runtime. A `max_size` of zero uses
    /// [`DEFAULT_MAX_SIZE`].
    pub fn new(retention: Retention, max_size: usize) -> Self {
        Self::with_sweep_interval(retention, max_size, DEFAULT_SWEEP_INTERVAL)
    }

    /// Creates the cache with a custom sweep interval.
    pub fn with_sweep_interval(retention: Retention, max_size: usize, sweep_interval: Duration) -> Self {
        let max_size = if max_size == 0 { DEFAULT_MAX_SIZE } else { max_size };
        let entries = Arc::new(RwLock::new(HashMap::new()));
        let counters = Arc::new(Counters::default());
        let shutdown = CancellationToken::new();

        let sweeper = tokio::spawn(sweep_loop(
            Arc::clone(&entries),
            Arc::clone(&counters),
            shutdown.clone(),
            sweep_interval,
        ));

        info!(?retention, max_size, "Memory cache initialized");

        Self {
            entries,
            retention,
            max_size,
            counters,
            closed: AtomicBool::new(false),
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Configured entry bound.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the map holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot of the hit/miss/eviction counters.
    pub fn stats(&self) -> MemoryCacheStats {
        MemoryCacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            swept: self.counters.swept.load(Ordering::Relaxed),
        }
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) { Err(CacheError::Closed) } else { Ok(()) }
    }

    fn miss(&self) -> Result<Option<String>, CacheError> {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }
}

async fn sweep_loop(
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let now = Instant::now();
                let mut map = entries.write().await;
                let before = map.len();
                map.retain(|_, entry| !entry.is_expired(now));
                let removed = before - map.len();
                if removed > 0 {
                    counters.swept.fetch_add(removed as u64, Ordering::Relaxed);
                    debug!(removed, remaining = map.len(), "Swept expired cache entries");
                }
            }
        }
    }
    debug!("Memory cache sweep stopped");
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.ensure_open()?;
        let now = Instant::now();

        {
            let map = self.entries.read().await;
            match map.get(key) {
                None => return self.miss(),
                Some(entry) if !entry.is_expired(now) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, a concurrent set may have refreshed it.
        let mut map = self.entries.write().await;
        match map.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.value.clone()))
            }
            Some(_) => {
                map.remove(key);
                self.miss()
            }
            None => self.miss(),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), CacheError> {
        self.ensure_open()?;
        let expires_at = ttl.resolve(self.retention).map(|d| Instant::now() + d);

        let mut map = self.entries.write().await;
        if !map.contains_key(key) && map.len() >= self.max_size {
            if let Some(victim) = map.keys().next().cloned() {
                map.remove(&victim);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(evicted = %victim, "Memory cache full, evicted entry");
            }
        }
        map.insert(key.to_string(), MemoryEntry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.ensure_open()?;
        self.entries.write().await.clear();
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.closed.store(true, Ordering::Release);
        self.shutdown.cancel();

        let handle = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Memory cache sweep task ended abnormally");
            }
            self.entries.write().await.clear();
            info!("Memory cache closed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
