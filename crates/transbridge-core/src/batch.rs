//! Bounded parallel translation of many requests.

use crate::service::{TranslateRequest, TranslationError, TranslationOutcome, TranslationService};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Default number of concurrent translations per batch.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Fans a batch out as independent translations, at most `concurrency` at a time.
#[derive(Debug, Clone)]
pub struct BatchTranslator {
    service: Arc<TranslationService>,
    concurrency: usize,
}

impl BatchTranslator {
    /// Creates a batch translator. A `concurrency` of zero uses [`DEFAULT_CONCURRENCY`].
    pub fn new(service: Arc<TranslationService>, concurrency: usize) -> Self {
        let concurrency = if concurrency == 0 { DEFAULT_CONCURRENCY } else { concurrency };
        Self { service, concurrency }
    }

    /// Maximum number of in-flight translations.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Translates every request and returns the results in input order.
    ///
    /// One failing item never affects the others.
    pub async fn translate_all(
        &self,
        cancel: &CancellationToken,
        requests: Vec<TranslateRequest>,
    ) -> Vec<Result<TranslationOutcome, TranslationError>> {
        let started = Instant::now();
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        debug!(total_items = total, concurrency = self.concurrency, "Starting batch translation");

        let handles: Vec<_> = requests
            .into_iter()
            .enumerate()
            .map(|(index, request)| {
                let service = Arc::clone(&self.service);
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return Err(TranslationError::Cancelled);
                    };
                    let result = service.translate(&cancel, &request).await;
                    if let Err(e) = &result {
                        debug!(index, error = %e, "Batch item failed");
                    }
                    result
                })
            })
            .collect();

        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(index, joined)| {
                joined.unwrap_or_else(|e| {
                    error!(index, error = %e, "Batch task panicked");
                    Err(TranslationError::Internal(e.to_string()))
                })
            })
            .collect();

        debug!(
            total_items = total,
            succeeded = results.iter().filter(|r| r.is_ok()).count(),
            duration_ms = started.elapsed().as_millis(),
            "Batch translation finished"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use transbridge_abstraction::{BackendIdentity, Translator, TranslatorError};
    use transbridge_models::{ModelRegistry, WeightedBackend};

    /// Backend that tracks peak concurrency and finishes later items first.
    struct SlowEcho {
        identity: BackendIdentity,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Translator for SlowEcho {
        async fn translate(&self, prompt: &str) -> Result<String, TranslatorError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = 50u64.saturating_sub(prompt.len() as u64 * 5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if prompt.contains("fail") {
                return Err(TranslatorError::EmptyResult);
            }
            Ok(prompt.to_uppercase())
        }

        fn identity(&self) -> &BackendIdentity {
            &self.identity
        }
    }

    fn batch(concurrency: usize) -> (BatchTranslator, Arc<SlowEcho>) {
        let backend = Arc::new(SlowEcho {
            identity: BackendIdentity::new("mock", "slow", "mock://"),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let registry =
            ModelRegistry::from_backends(vec![WeightedBackend::new(backend.clone(), 1)], StdRng::seed_from_u64(9))
                .unwrap();
        let service = TranslationService::new(Arc::new(registry))
            .with_template(crate::prompt::PromptTemplate::new("{{input}}").unwrap());
        (BatchTranslator::new(Arc::new(service), concurrency), backend)
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let (batch, _) = batch(5);
        let texts = ["a", "bb", "ccc", "dddd", "eeeee", "ffffff"];
        let requests = texts.iter().map(|t| TranslateRequest::new(*t, "en", "fr")).collect();

        let results = batch.translate_all(&CancellationToken::new(), requests).await;

        let outputs: Vec<String> = results.into_iter().map(|r| r.unwrap().text).collect();
        assert_eq!(outputs, vec!["A", "BB", "CCC", "DDDD", "EEEEE", "FFFFFF"]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (batch, backend) = batch(2);
        let requests = (0..8).map(|i| TranslateRequest::new(format!("item{}", i), "en", "fr")).collect();

        batch.translate_all(&CancellationToken::new(), requests).await;

        assert!(backend.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failures_are_per_item() {
        let (batch, _) = batch(3);
        let requests = vec![
            TranslateRequest::new("ok", "en", "fr"),
            TranslateRequest::new("fail", "en", "fr"),
            TranslateRequest::new("", "en", "fr"),
        ];

        let results = batch.translate_all(&CancellationToken::new(), requests).await;

        assert_eq!(results[0].as_ref().unwrap().text, "OK");
        assert!(matches!(results[1], Err(TranslationError::TranslationFailed { .. })));
        assert!(matches!(results[2], Err(TranslationError::InvalidRequest(_))));
    }

    #[test]
    fn test_zero_concurrency_uses_default() {
        let (batch, _) = batch(0);
        assert_eq!(batch.concurrency(), DEFAULT_CONCURRENCY);
    }
}
