//! Builder for configuring orchestrator instances

use std::sync::Arc;

use super::{CacheOrchestrator, Inner};
use crate::cache::{CacheStateManager, MetricsCollector, RequestDeduplicator};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::invalidation::{InvalidationManager, NoopInvalidator, PageCacheInvalidator};
use crate::sources::{DataSource, RetryPolicy, RetryingDataSource};
use crate::{MuninnError, Result};

/// Builder for [`CacheOrchestrator`].
///
/// ```rust
/// # use std::sync::Arc;
/// # use muninn::{CacheConfig, CacheOrchestrator, Event};
/// # use muninn::sources::StaticDataSource;
/// let orchestrator = CacheOrchestrator::builder()
///     .config(CacheConfig::new())
///     .primary(Arc::new(StaticDataSource::new(vec![
///         Event::new("a", "Jam", "2025-06-21"),
///     ])))
///     .build()
///     .unwrap();
/// # drop(orchestrator);
/// ```
pub struct CacheOrchestratorBuilder {
    config: CacheConfig,
    clock: Option<Arc<dyn Clock>>,
    primary: Option<Arc<dyn DataSource>>,
    secondary: Option<Arc<dyn DataSource>>,
    invalidator: Option<Arc<dyn PageCacheInvalidator>>,
    retry: Option<RetryPolicy>,
}

impl CacheOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            clock: None,
            primary: None,
            secondary: None,
            invalidator: None,
            retry: None,
        }
    }

    /// Tunables; validated by [`build()`](Self::build).
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Time source (default: [`SystemClock`]).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// The upstream consulted on every miss. Required.
    pub fn primary(mut self, source: Arc<dyn DataSource>) -> Self {
        self.primary = Some(source);
        self
    }

    /// Local/store source used when the primary fails and no usable stale
    /// cache exists.
    pub fn secondary(mut self, source: Arc<dyn DataSource>) -> Self {
        self.secondary = Some(source);
        self
    }

    /// Page-cache purge backend (default: [`NoopInvalidator`]).
    pub fn invalidator(mut self, invalidator: Arc<dyn PageCacheInvalidator>) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    /// Override the retry policy derived from `max_retry_attempts` and
    /// `retry_backoff`.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Build the orchestrator.
    ///
    /// The primary source is wrapped in a [`RetryingDataSource`] unless the
    /// policy allows no retries.
    pub fn build(self) -> Result<CacheOrchestrator> {
        self.config.validate()?;
        let primary = self.primary.ok_or(MuninnError::NoSource)?;

        let policy = self
            .retry
            .unwrap_or_else(|| RetryPolicy::from_config(&self.config));
        let primary: Arc<dyn DataSource> = if policy.max_retries > 0 {
            Arc::new(RetryingDataSource::new(primary, policy))
        } else {
            primary
        };

        let config = Arc::new(self.config);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metrics = Arc::new(MetricsCollector::new(
            config.max_metrics_history,
            config.metrics_reset_interval,
            Arc::clone(&clock),
        ));
        let state = CacheStateManager::new(Arc::clone(&config), Arc::clone(&clock), Arc::clone(&metrics));
        let invalidator = self
            .invalidator
            .unwrap_or_else(|| Arc::new(NoopInvalidator));
        let invalidation = InvalidationManager::new(invalidator, &config);

        Ok(CacheOrchestrator {
            inner: Arc::new(Inner {
                dedup: RequestDeduplicator::new(config.deduplication_timeout),
                config,
                clock,
                state,
                metrics,
                invalidation,
                primary,
                secondary: self.secondary,
            }),
        })
    }
}

impl Default for CacheOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
