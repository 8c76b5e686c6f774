//! Exponential backoff with jitter.
//!
//! Retry is a cross-cutting concern: every sampler page fetch and every
//! resolver call wraps its store operation in [`with_retry`] instead of
//! carrying its own loop. Classification defaults to
//! [`StoreError::is_retryable`] and can be overridden per policy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Custom retryability classifier.
pub type RetryClassifier = Arc<dyn Fn(&StoreError) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Fractional jitter applied as `1 ± jitter`.
    pub jitter: f64,
    /// Honor a server-supplied retry-after when it exceeds the computed
    /// backoff.
    pub respect_retry_after: bool,
    pub classifier: Option<RetryClassifier>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: 0.2,
            respect_retry_after: true,
            classifier: None,
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter", &self.jitter)
            .field("respect_retry_after", &self.respect_retry_after)
            .field("classifier", &self.classifier.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl RetryPolicy {
    /// Backoff for a given attempt with an explicit jitter unit in
    /// `[0, 1)`. Pure, so the arithmetic is testable.
    pub fn backoff_delay(&self, attempt: u32, jitter_unit: f64) -> Duration {
        let exponent = attempt.min(31) as i32;
        let raw = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let factor = 1.0 - self.jitter + 2.0 * self.jitter * jitter_unit.clamp(0.0, 1.0);
        let jittered = raw * factor;
        let capped = jittered.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Effective sleep before the next attempt: jittered backoff, raised
    /// to the server's retry-after when present and larger.
    fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff_delay(attempt, rand::thread_rng().gen::<f64>());
        match retry_after {
            Some(hint) if self.respect_retry_after && hint > backoff => hint,
            _ => backoff,
        }
    }

    fn is_retryable(&self, err: &StoreError) -> bool {
        match &self.classifier {
            Some(classifier) => classifier(err),
            None => err.is_retryable(),
        }
    }
}

/// Run `op`, retrying retryable failures up to `policy.max_retries`.
/// The final failure preserves the original error.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation, attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if !policy.is_retryable(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt, err.retry_after());
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
