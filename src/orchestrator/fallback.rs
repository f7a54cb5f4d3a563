//! Fetch path and fallback tiers.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::Inner;
use crate::cache::ValidityRefresh;
use crate::sources::DataSource;
use crate::telemetry;
use crate::types::{EventsResult, FallbackTier, FetchOutcome, validate_events};
use crate::{MuninnError, Result};

/// Tiers tried, in order, after the primary source fails.
pub const FALLBACK_TIERS: [FallbackTier; 3] = [
    FallbackTier::StaleCache,
    FallbackTier::Secondary,
    FallbackTier::Bootstrap,
];

impl Inner {
    pub(super) async fn load_events(&self, force_refresh: bool) -> EventsResult {
        self.state.check_memory();

        if !force_refresh && let Some(cached) = self.state.cached_snapshot() {
            self.metrics.record_hit();
            debug!(count = cached.events.len(), "cache hit");
            return EventsResult {
                success: true,
                data: cached.events,
                source: cached.source,
                cached: true,
                fallback: None,
                error: None,
                warnings: Vec::new(),
                last_updated: cached.last_fetch_time,
            };
        }

        self.metrics.record_miss();
        let cause = match self.fetch_validated(self.primary.as_ref()).await {
            Ok(outcome) => return self.serve_fresh(outcome, None),
            Err(e) => e,
        };

        self.metrics.record_error();
        let cause = cause.to_string();
        warn!(error = %cause, force_refresh, "primary source failed, falling back");

        for tier in FALLBACK_TIERS {
            match self.try_tier(tier, &cause).await {
                Ok(result) => {
                    metrics::counter!(telemetry::FALLBACKS_TOTAL, "tier" => tier.as_str())
                        .increment(1);
                    warn!(%tier, count = result.len(), "served from fallback tier");
                    return result;
                }
                Err(e) => debug!(%tier, error = %e, "fallback tier unavailable"),
            }
        }

        warn!(error = %cause, "all data sources exhausted");
        EventsResult::exhausted(format!("All data sources failed: {cause}"))
    }

    async fn try_tier(&self, tier: FallbackTier, cause: &str) -> Result<EventsResult> {
        match tier {
            FallbackTier::StaleCache => self.serve_stale(cause),
            FallbackTier::Secondary => {
                let secondary = self.secondary.as_ref().ok_or(MuninnError::NoSource)?;
                let outcome = self.fetch_validated(secondary.as_ref()).await?;
                let mut result = self.serve_fresh(outcome, Some(FallbackTier::Secondary));
                result.error = Some(cause.to_string());
                Ok(result)
            }
            FallbackTier::Bootstrap => self.serve_bootstrap(cause),
        }
    }

    /// Fetch from `source`, timing the call, and reject unusable payloads.
    async fn fetch_validated(&self, source: &dyn DataSource) -> Result<FetchOutcome> {
        let start = Instant::now();
        let fetched = source.fetch().await;
        let elapsed = start.elapsed();
        self.metrics.record_fetch_duration(elapsed);

        let checked = fetched.and_then(|outcome| {
            if !outcome.success {
                return Err(MuninnError::DataFetch(
                    outcome
                        .error
                        .unwrap_or_else(|| "source reported failure".to_string()),
                ));
            }
            let summary = validate_events(&outcome.events)?;
            if summary.malformed() > 0 {
                debug!(malformed = summary.malformed(), total = summary.total, "accepted payload with malformed events");
            }
            Ok(outcome)
        });

        let status = if checked.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::FETCHES_TOTAL,
            "source" => source.name().to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::FETCH_DURATION_SECONDS,
            "source" => source.name().to_owned(),
        )
        .record(elapsed.as_secs_f64());
        checked
    }

    /// Store a freshly fetched outcome and serve it. A memory rejection is
    /// reported as a warning; the fetched data is served regardless.
    fn serve_fresh(&self, outcome: FetchOutcome, fallback: Option<FallbackTier>) -> EventsResult {
        let FetchOutcome {
            events,
            source,
            error,
            mut warnings,
            ..
        } = outcome;
        let events = Arc::new(events);

        if let Err(e) = self.state.update_cache(Arc::clone(&events), source, error.as_deref()) {
            self.metrics.record_error();
            warn!(error = %e, "fetched data not cached");
            warnings.push(format!("Data not cached: {e}"));
        }

        EventsResult {
            success: true,
            data: events,
            source: Some(source),
            cached: false,
            fallback,
            error,
            warnings,
            last_updated: Some(self.clock.now()),
        }
    }

    fn serve_stale(&self, cause: &str) -> Result<EventsResult> {
        if self.state.is_bootstrapped() {
            return Err(MuninnError::DataFetch("cache holds only the placeholder".to_string()));
        }
        let cached = self
            .state
            .cached_snapshot_forced()
            .ok_or_else(|| MuninnError::DataFetch("nothing cached".to_string()))?;
        validate_events(&cached.events)?;
        let mut warnings = vec!["Serving cached data; the upstream is unavailable".to_string()];
        match self.state.refresh_cache_validity(Some(cause)) {
            ValidityRefresh::Reset => warnings.push(format!(
                "Cached data is older than {}s",
                self.config.max_cache_age.as_secs()
            )),
            ValidityRefresh::Extended { .. } | ValidityRefresh::Skipped => {}
        }

        Ok(EventsResult {
            success: true,
            data: cached.events,
            source: cached.source,
            cached: true,
            fallback: Some(FallbackTier::StaleCache),
            error: Some(cause.to_string()),
            warnings,
            last_updated: cached.last_fetch_time,
        })
    }

    fn serve_bootstrap(&self, cause: &str) -> Result<EventsResult> {
        if !self.config.bootstrap_mode {
            return Err(MuninnError::Configuration("bootstrap mode is disabled".to_string()));
        }
        self.state.bootstrap_cache_with_fallback(cause);
        if !self.state.is_bootstrapped() {
            return Err(MuninnError::DataFetch(
                "cache holds data that failed validation".to_string(),
            ));
        }
        let cached = self
            .state
            .cached_snapshot_forced()
            .ok_or_else(|| MuninnError::DataFetch("bootstrap placeholder missing".to_string()))?;

        Ok(EventsResult {
            success: true,
            data: cached.events,
            source: cached.source,
            cached: true,
            fallback: Some(FallbackTier::Bootstrap),
            error: Some(cause.to_string()),
            warnings: vec!["Serving placeholder data; no data source is available".to_string()],
            last_updated: None,
        })
    }
}
