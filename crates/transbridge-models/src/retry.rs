//! Bounded retry with exponential backoff for backend HTTP calls.

use reqwest::{RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, warn};
use transbridge_abstraction::{BackendIdentity, TranslatorError};

/// Retry policy for a single backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt (default: 2).
    pub max_retries: u32,
    /// Delay before the first retry; doubles for every further retry (default: 200ms).
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay: Duration::from_millis(200) }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given retry count and base delay.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    /// Total number of attempts, including the first one.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay to wait after the failed attempt with index `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Sends the request produced by `build` until it succeeds or attempts run out.
///
/// Non-success responses have their body drained before the next attempt so
/// the connection goes back to the pool. Exhaustion returns the last
/// transport error or the last non-success status with its body.
pub(crate) async fn send_with_retry<F>(
    policy: &RetryPolicy,
    identity: &BackendIdentity,
    build: F,
) -> Result<Response, TranslatorError>
where
    F: Fn() -> RequestBuilder,
{
    let attempts = policy.max_attempts();
    let mut last_error = TranslatorError::Other("no attempt was made".to_string());

    for attempt in 0..attempts {
        let error = match build().send().await {
            Ok(response) if response.status().is_success() => {
                debug!(backend = %identity, attempt = attempt + 1, "Backend request succeeded");
                return Ok(response);
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                warn!(
                    backend = %identity,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    status,
                    "Backend returned error status"
                );
                TranslatorError::Status { status, body }
            }
            Err(e) => {
                warn!(
                    backend = %identity,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    error = %e,
                    "Backend request failed"
                );
                transport_error(&e, identity)
            }
        };

        if !error.is_retryable() {
            return Err(error);
        }
        last_error = error;

        if attempt + 1 < attempts {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }

    Err(last_error)
}

fn transport_error(e: &reqwest::Error, identity: &BackendIdentity) -> TranslatorError {
    if e.is_connect() {
        TranslatorError::Request(format!("Backend not reachable at {}: {}", identity.api_url, e))
    } else if e.is_timeout() {
        TranslatorError::Request(format!("Request to {} timed out: {}", identity.api_url, e))
    } else {
        TranslatorError::Request(format!("Network error: {}", e))
    }
}
