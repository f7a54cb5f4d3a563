//! Telemetry metric name constants.
//!
//! Centralised metric names for muninn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! The in-process [`MetricsCollector`](crate::cache::MetricsCollector) keeps
//! its own counters for the administrative surface; these names are the
//! exporter-facing view of the same events.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `muninn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `source` — data source tag ("remote", "local", "store", "cached")
//! - `tier` — fallback tier ("stale_cache", "secondary", "bootstrap")
//! - `status` — outcome: "ok" or "error"

/// Total cache hits on the fast path.
pub const CACHE_HITS_TOTAL: &str = "muninn_cache_hits_total";

/// Total cache misses (including forced refreshes).
pub const CACHE_MISSES_TOTAL: &str = "muninn_cache_misses_total";

/// Total data source fetches.
///
/// Labels: `source`, `status` ("ok" | "error").
pub const FETCHES_TOTAL: &str = "muninn_fetches_total";

/// Data source fetch duration in seconds.
///
/// Labels: `source`.
pub const FETCH_DURATION_SECONDS: &str = "muninn_fetch_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `source`.
pub const RETRIES_TOTAL: &str = "muninn_retries_total";

/// Total responses served from a fallback tier.
///
/// Labels: `tier`.
pub const FALLBACKS_TOTAL: &str = "muninn_fallbacks_total";

/// Total cache updates rejected by the memory guard.
pub const MEMORY_REJECTIONS_TOTAL: &str = "muninn_memory_rejections_total";

/// Current estimated memory held by the cache, in bytes.
pub const MEMORY_USAGE_BYTES: &str = "muninn_memory_usage_bytes";

/// Total page-cache purge calls.
///
/// Labels: `scope` ("page" | "layout" | "tag"), `status`.
pub const PURGES_TOTAL: &str = "muninn_purges_total";

/// Total concurrent callers that joined an in-flight request instead of
/// starting their own.
pub const COALESCED_REQUESTS_TOTAL: &str = "muninn_coalesced_requests_total";
