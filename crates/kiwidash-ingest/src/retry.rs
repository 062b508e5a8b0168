//! Retry policy for Kiwify API requests.
//!
//! [`RetryPolicy::run`] wraps a fallible async operation and retries it on
//! transient failures with exponential back-off and ±25 % jitter. The policy
//! is owned by the client and knows nothing about what is being fetched.

use std::future::Future;
use std::time::Duration;

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure. `0` disables retries.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            max_delay_ms: 60_000,
        }
    }
}

/// Returns `true` for errors worth retrying after a back-off delay.
///
/// **Retriable:** 429, HTTP 5xx, timeouts, connection failures.
///
/// **Not retriable:** other 4xx, rejected tokens, malformed bodies,
/// pagination guards, bad input.
pub(crate) fn is_retriable(err: &IngestError) -> bool {
    match err {
        IngestError::RateLimited { .. } => true,
        IngestError::UnexpectedStatus { status, .. } => *status >= 500,
        IngestError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        IngestError::Deserialize { .. }
        | IngestError::Unauthorized { .. }
        | IngestError::PaginationLimit { .. }
        | IngestError::InvalidRange { .. }
        | IngestError::InvalidBaseUrl { .. }
        | IngestError::Token(_) => false,
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay_ms`, with ±25 % jitter. A `Retry-After` hint is
    /// a floor on the result.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let computed = self
            .backoff_base_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(20));
        let capped = computed.min(self.max_delay_ms);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
        let floor = retry_after_secs.unwrap_or(0).saturating_mul(1000);
        Duration::from_millis(jittered.max(floor))
    }

    /// Runs `operation`, retrying transient failures up to `max_retries`
    /// times. Non-retriable errors return immediately.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or the first
    /// non-retriable error.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, IngestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IngestError>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !is_retriable(&err) || attempt >= self.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    let retry_after = match &err {
                        IngestError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
                        _ => None,
                    };
                    let delay = self.delay_for(attempt, retry_after);
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient Kiwify error, retrying after back-off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
