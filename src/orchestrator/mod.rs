//! The cache orchestrator: cache, sources, fallback and invalidation wired
//! together behind one handle.
//!
//! # Read path
//!
//! ```text
//! get_events(force)
//!     │  single-flight on "getEvents:<force>"
//!     ▼
//! fresh cache? ──yes──► hit
//!     │ no / forced
//!     ▼
//! primary.fetch() + validation ──ok──► update_cache, serve
//!     │ failed
//!     ▼
//! fallback tiers, first success wins:
//!   stale_cache ─► secondary ─► bootstrap ─► { success: false }
//! ```
//!
//! [`CacheOrchestrator`] is a cheap `Clone` handle; every clone shares the
//! same cache entry, single-flight table and metrics.

mod builder;
mod fallback;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

pub use builder::CacheOrchestratorBuilder;
pub use fallback::FALLBACK_TIERS;

use crate::cache::{
    CacheStateManager, CacheStatus, MetricsCollector, MetricsSnapshot, RequestDeduplicator,
};
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::invalidation::{EmergencyBustReport, InvalidationManager, InvalidationReport};
use crate::sources::DataSource;
use crate::types::{EventsResult, RefreshResult};

const FORCE_REFRESH_KEY: &str = "forceRefresh";
const CACHE_STATUS_KEY: &str = "cacheStatus";

fn events_key(force_refresh: bool) -> String {
    format!("getEvents:{force_refresh}")
}

fn revalidation_key(path: &str) -> String {
    format!("fullRevalidation:{path}")
}

pub(crate) struct Inner {
    pub(crate) config: Arc<CacheConfig>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) state: CacheStateManager,
    pub(crate) dedup: RequestDeduplicator,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) invalidation: InvalidationManager,
    pub(crate) primary: Arc<dyn DataSource>,
    pub(crate) secondary: Option<Arc<dyn DataSource>>,
}

/// Handle to the event cache.
#[derive(Clone)]
pub struct CacheOrchestrator {
    inner: Arc<Inner>,
}

impl CacheOrchestrator {
    pub fn builder() -> CacheOrchestratorBuilder {
        CacheOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Direct access to the cache entry.
    pub fn state(&self) -> &CacheStateManager {
        &self.inner.state
    }

    /// Serve the event list, fetching when the cache is stale or `force_refresh`.
    ///
    /// Never fails: degraded responses carry `fallback` and `error`, and only
    /// total exhaustion yields `success == false`.
    #[instrument(skip(self), fields(operation = "get_events"))]
    pub async fn get_events(&self, force_refresh: bool) -> EventsResult {
        Inner::get_events(&self.inner, force_refresh).await
    }

    /// Refetch from upstream and purge the page cache.
    #[instrument(skip(self), fields(operation = "force_refresh"))]
    pub async fn force_refresh(&self) -> RefreshResult {
        let inner = Arc::clone(&self.inner);
        self.inner
            .dedup
            .deduplicate(FORCE_REFRESH_KEY, move || async move {
                inner.run_force_refresh().await
            })
            .await
    }

    /// Purge the expanded page/tag set. Leaves the cache entry alone.
    #[instrument(skip(self), fields(operation = "emergency_cache_bust"))]
    pub async fn emergency_cache_bust(&self) -> EmergencyBustReport {
        self.inner.invalidation.emergency_cache_bust().await
    }

    /// Purge a single page.
    #[instrument(skip(self), fields(operation = "revalidate_path"))]
    pub async fn revalidate_path(&self, path: &str) -> InvalidationReport {
        let inner = Arc::clone(&self.inner);
        let owned = path.to_string();
        self.inner
            .dedup
            .deduplicate(&revalidation_key(path), move || async move {
                inner.invalidation.revalidate_path(&owned).await
            })
            .await
    }

    /// Operator view of the cache entry; seeds the cache once if it is empty.
    pub async fn get_cache_status(&self) -> CacheStatus {
        let inner = Arc::clone(&self.inner);
        self.inner
            .dedup
            .deduplicate(CACHE_STATUS_KEY, move || async move {
                if !inner.state.get_cache_status().has_data {
                    let seeded = Inner::get_events(&inner, false).await;
                    debug!(success = seeded.success, "seeded cache for status request");
                }
                inner.state.get_cache_status()
            })
            .await
    }

    pub fn get_cache_metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn reset_cache_metrics(&self) {
        self.inner.metrics.reset();
        info!("cache metrics reset");
    }

    /// Drop every single-flight entry. Returns how many were dropped.
    pub fn clear_pending_requests(&self) -> usize {
        self.inner.dedup.clear_all()
    }

    /// Operation keys currently in flight.
    pub fn pending_requests(&self) -> Vec<String> {
        self.inner.dedup.list_pending_keys()
    }

    /// Refresh in the background every `remote_refresh_interval`.
    ///
    /// The first refresh happens one interval after the call. Abort the
    /// returned handle to stop the loop.
    pub fn spawn_refresh_loop(&self) -> JoinHandle<()> {
        let orchestrator = self.clone();
        let period = self.inner.config.remote_refresh_interval;
        tokio::spawn(async move { orchestrator.refresh_loop(period).await })
    }

    async fn refresh_loop(self, period: Duration) {
        let Some(start) = tokio::time::Instant::now().checked_add(period) else {
            warn!(period_secs = period.as_secs(), "refresh interval out of range, loop not started");
            return;
        };
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let result = self.force_refresh().await;
            if result.success {
                debug!(events = result.event_count, "background refresh finished");
            } else {
                warn!(error = ?result.error, "background refresh failed");
            }
        }
    }
}

impl Inner {
    async fn get_events(this: &Arc<Self>, force_refresh: bool) -> EventsResult {
        let inner = Arc::clone(this);
        this.dedup
            .deduplicate(&events_key(force_refresh), move || async move {
                inner.load_events(force_refresh).await
            })
            .await
    }

    async fn run_force_refresh(self: Arc<Self>) -> RefreshResult {
        let snapshot = if self.state.is_bootstrapped() {
            None
        } else {
            self.state.get_cached_events_forced()
        };

        let result = Inner::get_events(&self, true).await;
        if !result.success {
            let error = result.error.unwrap_or_else(|| "unknown error".to_string());
            warn!(%error, "forced refresh failed");
            return RefreshResult {
                success: false,
                message: format!("Refresh failed: {error}"),
                event_count: 0,
                source: None,
                error: Some(error),
                invalidation: None,
            };
        }

        let invalidation = self
            .invalidation
            .smart_invalidation(
                &result.data,
                snapshot.as_deref().map(Vec::as_slice),
                &self.config.invalidation_paths,
            )
            .await;
        let source = result
            .source
            .map_or_else(|| "unknown".to_string(), |s| s.to_string());
        info!(events = result.len(), %source, invalidated = invalidation.invalidated, "forced refresh finished");

        RefreshResult {
            success: true,
            message: format!(
                "Refreshed {} events from {source}. {}",
                result.len(),
                invalidation.message
            ),
            event_count: result.len(),
            source: result.source,
            error: result.error,
            invalidation: Some(invalidation),
        }
    }
}
