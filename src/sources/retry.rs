//! Retry policy and the retrying source decorator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::DataSource;
use crate::config::CacheConfig;
use crate::telemetry;
use crate::types::FetchOutcome;
use crate::{MuninnError, Result};

/// Exponential backoff for transient fetch failures.
///
/// ```rust
/// # use muninn::sources::RetryPolicy;
/// # use std::time::Duration;
/// let policy = RetryPolicy::new(3, Duration::from_millis(100));
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt. 0 = no retry.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::default()
        }
    }

    /// `max_retry_attempts` and `retry_backoff` from the cache config.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_retry_attempts, config.retry_backoff)
    }

    /// `initial_delay * 2^attempt`, capped at `max_delay` (attempt is 0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// Run `f`, retrying transient errors per `policy`.
///
/// Permanent errors are returned immediately.
pub(crate) async fn with_retry<F, Fut, T>(policy: &RetryPolicy, source_name: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                metrics::counter!(telemetry::RETRIES_TOTAL, "source" => source_name.to_owned())
                    .increment(1);
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    source = source_name,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Decorator that retries an inner source on transient failures.
///
/// An outcome with `success == false` counts as a transient
/// [`MuninnError::DataFetch`].
pub struct RetryingDataSource {
    inner: Arc<dyn DataSource>,
    policy: RetryPolicy,
}

impl RetryingDataSource {
    pub fn new(inner: Arc<dyn DataSource>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl DataSource for RetryingDataSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        with_retry(&self.policy, self.inner.name(), || async {
            let outcome = self.inner.fetch().await?;
            if outcome.success {
                Ok(outcome)
            } else {
                Err(MuninnError::DataFetch(
                    outcome
                        .error
                        .unwrap_or_else(|| "source reported failure".to_string()),
                ))
            }
        })
        .await
    }
}
