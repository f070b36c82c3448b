//! Ordered composition of cache layers, fastest first.

use super::{Cache, CacheError, Ttl};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// A chain of cache layers ordered from fastest to slowest.
///
/// A hit in a slower layer is promoted into every faster layer using each
/// faster layer's own default retention. Writes, clears and closes reach every
/// layer; the last error is reported.
pub struct TieredCache {
    layers: Vec<Arc<dyn Cache>>,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.layers.iter().map(|l| l.name()).collect();
        f.debug_struct("TieredCache").field("layers", &names).finish()
    }
}

impl TieredCache {
    /// Builds the chain. `layers[0]` is consulted first.
    pub fn new(layers: Vec<Arc<dyn Cache>>) -> Self {
        Self { layers }
    }

    /// Runs `op` on every layer and keeps the last error.
    async fn for_each_layer<'a, F, Fut>(&'a self, op_name: &str, op: F) -> Result<(), CacheError>
    where
        F: Fn(&'a Arc<dyn Cache>) -> Fut,
        Fut: std::future::Future<Output = Result<(), CacheError>>,
    {
        let mut last_error = None;
        for layer in &self.layers {
            if let Err(e) = op(layer).await {
                warn!(layer = layer.name(), operation = op_name, error = %e, "Cache layer failed");
                last_error = Some(e);
            }
        }
        last_error.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl Cache for TieredCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut last = Ok(None);

        for (depth, layer) in self.layers.iter().enumerate() {
            match layer.get(key).await {
                Ok(Some(value)) => {
                    for faster in &self.layers[..depth] {
                        if let Err(e) = faster.set(key, &value, Ttl::LayerDefault).await {
                            warn!(layer = faster.name(), error = %e, "Cache promotion failed");
                        }
                    }
                    if depth > 0 {
                        debug!(from = layer.name(), promoted_into = depth, "Promoted cache hit");
                    }
                    return Ok(Some(value));
                }
                other => last = other,
            }
        }

        last
    }

    async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), CacheError> {
        self.for_each_layer("set", |layer| layer.set(key, value, ttl)).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.for_each_layer("clear", |layer| layer.clear()).await
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.for_each_layer("close", |layer| layer.close()).await
    }

    fn name(&self) -> &str {
        "tiered"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, Retention};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Layer that records writes and can be told to fail.
    #[derive(Default)]
    struct RecordingLayer {
        values: Mutex<HashMap<String, String>>,
        ttls: Mutex<Vec<Ttl>>,
        fail_with: Option<String>,
    }

    impl RecordingLayer {
        fn failing(msg: &str) -> Self {
            Self { fail_with: Some(msg.to_string()), ..Self::default() }
        }

        fn check(&self) -> Result<(), CacheError> {
            match &self.fail_with {
                Some(msg) => Err(CacheError::Unavailable(msg.clone())),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl Cache for RecordingLayer {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.check()?;
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), CacheError> {
            self.check()?;
            self.values.lock().unwrap().insert(key.to_string(), value.to_string());
            self.ttls.lock().unwrap().push(ttl);
            Ok(())
        }

        async fn clear(&self) -> Result<(), CacheError> {
            self.check()?;
            self.values.lock().unwrap().clear();
            Ok(())
        }

        async fn close(&self) -> Result<(), CacheError> {
            self.check()
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_promotion_into_faster_layers() {
        let fast = Arc::new(MemoryCache::new(Retention::Permanent, 10));
        let middle = Arc::new(RecordingLayer::default());
        let slow = Arc::new(RecordingLayer::default());
        slow.set("k", "v", Ttl::Permanent).await.unwrap();

        let tiered = TieredCache::new(vec![
            fast.clone() as Arc<dyn Cache>,
            middle.clone() as Arc<dyn Cache>,
            slow.clone() as Arc<dyn Cache>,
        ]);
        assert_eq!(tiered.get("k").await.unwrap().as_deref(), Some("v"));

        assert_eq!(fast.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(middle.values.lock().unwrap().get("k").map(String::as_str), Some("v"));
        // Promotion always uses the receiving layer's own retention.
        assert_eq!(*middle.ttls.lock().unwrap(), vec![Ttl::LayerDefault]);
    }

    #[tokio::test]
    async fn test_all_miss_returns_last_layer_result() {
        let tiered = TieredCache::new(vec![
            Arc::new(RecordingLayer::default()) as Arc<dyn Cache>,
            Arc::new(RecordingLayer::failing("down")),
        ]);
        assert_eq!(tiered.get("k").await, Err(CacheError::Unavailable("down".to_string())));

        let tiered = TieredCache::new(vec![
            Arc::new(RecordingLayer::failing("down")) as Arc<dyn Cache>,
            Arc::new(RecordingLayer::default()),
        ]);
        assert_eq!(tiered.get("k").await, Ok(None));
    }

    #[tokio::test]
    async fn test_failing_fast_layer_does_not_hide_slow_hit() {
        let slow = Arc::new(RecordingLayer::default());
        slow.set("k", "v", Ttl::Permanent).await.unwrap();
        let tiered = TieredCache::new(vec![Arc::new(RecordingLayer::failing("down")) as Arc<dyn Cache>, slow]);
        assert_eq!(tiered.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_set_attempts_every_layer_last_error_wins() {
        let ok = Arc::new(RecordingLayer::default());
        let tiered = TieredCache::new(vec![
            Arc::new(RecordingLayer::failing("first")) as Arc<dyn Cache>,
            ok.clone(),
            Arc::new(RecordingLayer::failing("last")),
        ]);

        let result = tiered.set("k", "v", Ttl::LayerDefault).await;

        assert_eq!(result, Err(CacheError::Unavailable("last".to_string())));
        assert_eq!(ok.values.lock().unwrap().get("k").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn test_clear_and_close_reach_every_layer() {
        let a = Arc::new(RecordingLayer::default());
        let b = Arc::new(RecordingLayer::default());
        a.set("k", "v", Ttl::Permanent).await.unwrap();
        b.set("k", "v", Ttl::Permanent).await.unwrap();

        let tiered = TieredCache::new(vec![a.clone() as Arc<dyn Cache>, b.clone()]);
        tiered.clear().await.unwrap();
        tiered.close().await.unwrap();

        assert!(a.values.lock().unwrap().is_empty());
        assert!(b.values.lock().unwrap().is_empty());
    }
}
