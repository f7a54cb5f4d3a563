//! The single cache entry and the rules that govern it.
//!
//! [`CacheStateManager`] owns exactly one [`CacheEntry`]: the current event
//! list plus the timestamps needed to answer "is this still fresh?" and
//! "when did the upstream last work?". All mutations take the write lock
//! once, compute, and commit before releasing it, so readers always observe
//! a consistent entry.
//!
//! # Lifecycle
//!
//! ```text
//!            update_cache                 TTL elapses
//!   EMPTY ─────────────────► FRESH ─────────────────────► STALE
//!     │                        ▲                            │
//!     │ bootstrap              │ update_cache               │ refresh_cache_validity
//!     ▼                        │                            ▼
//!  BOOTSTRAPPED ───────────────┘              EXTENDED (age < max_cache_age)
//!                                             RESET    (age ≥ max_cache_age, degraded)
//!
//!   any state ── clear_cache ──► EMPTY
//! ```
//!
//! # Memory accounting
//!
//! The memory footprint of an event list is estimated as the length of its
//! JSON serialization times [`MEMORY_OVERHEAD_FACTOR`]. The estimate is a pure
//! function of the events, so the same list always costs the same.

use std::io;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::MetricsCollector;
use super::lock::{rw_read, rw_write};
use crate::clock::{self, Clock};
use crate::config::CacheConfig;
use crate::telemetry;
use crate::types::{DataSourceTag, Event};
use crate::{MuninnError, Result};

/// Multiplier applied to the serialized size to approximate in-memory size.
pub const MEMORY_OVERHEAD_FACTOR: usize = 2;

/// Id of the synthetic record installed by
/// [`CacheStateManager::bootstrap_cache_with_fallback()`].
pub const BOOTSTRAP_EVENT_ID: &str = "bootstrap-placeholder";

/// Estimated memory held by `events`, in bytes.
pub fn estimate_memory(events: &[Event]) -> usize {
    let mut counter = ByteCounter(0);
    match serde_json::to_writer(&mut counter, events) {
        Ok(()) => counter.0.saturating_mul(MEMORY_OVERHEAD_FACTOR),
        // Unmeasurable data is treated as too large to admit.
        Err(_) => usize::MAX,
    }
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct CacheEntry {
    events: Option<Arc<Vec<Event>>>,
    last_fetch_time: Option<DateTime<Utc>>,
    last_remote_fetch_time: Option<DateTime<Utc>>,
    last_remote_success_time: Option<DateTime<Utc>>,
    last_remote_error_message: Option<String>,
    data_source: Option<DataSourceTag>,
    memory_usage_bytes: usize,
    last_memory_check: Option<DateTime<Utc>>,
    degraded: bool,
    bootstrapped: bool,
}

impl CacheEntry {
    fn has_events(&self) -> bool {
        self.events.as_ref().is_some_and(|e| !e.is_empty())
    }

    fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_fetch_time.map(|t| clock::elapsed(t, now))
    }
}

/// Events together with the entry metadata they were stored with.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEvents {
    pub events: Arc<Vec<Event>>,
    pub source: Option<DataSourceTag>,
    pub last_fetch_time: Option<DateTime<Utc>>,
}

impl CachedEvents {
    fn from_entry(entry: &CacheEntry) -> Option<Self> {
        let events = entry.events.clone().filter(|e| !e.is_empty())?;
        Some(Self {
            events,
            source: entry.data_source,
            last_fetch_time: entry.last_fetch_time,
        })
    }
}

/// How [`CacheStateManager::refresh_cache_validity()`] treated the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityRefresh {
    /// Nothing cached; nothing to extend.
    Skipped,
    /// The fetch time moved forward; `age` is the apparent age afterwards.
    Extended { age: Duration },
    /// The data was older than `max_cache_age`; the timer restarted and the
    /// entry is flagged degraded.
    Reset,
}

/// Memory pressure reported by [`CacheStateManager::check_memory()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    Normal,
    /// Above the cleanup threshold.
    Elevated,
    /// Above the emergency threshold.
    Critical,
}

/// Read-only projection of the cache entry for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub has_data: bool,
    pub event_count: usize,
    pub data_source: Option<DataSourceTag>,
    pub is_valid: bool,
    pub is_bootstrapped: bool,
    /// Served past `max_cache_age` after the timer was reset.
    pub is_degraded: bool,
    pub cache_age_ms: Option<u64>,
    pub cache_duration_ms: u64,
    /// Time until the entry goes stale; zero when already stale.
    pub expires_in_ms: Option<u64>,
    /// Time until the background loop would next reach the upstream.
    pub next_refresh_in_ms: Option<u64>,
    pub last_fetch_time: Option<String>,
    pub last_remote_fetch_time: Option<String>,
    pub last_remote_success_time: Option<String>,
    pub last_remote_error: Option<String>,
    pub memory_usage_bytes: usize,
    pub memory_limit_bytes: usize,
    pub memory_utilization_percent: f64,
    pub last_memory_check: Option<String>,
}

/// Owner of the process's single cache entry.
pub struct CacheStateManager {
    entry: RwLock<CacheEntry>,
    config: Arc<CacheConfig>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
}

impl CacheStateManager {
    pub fn new(
        config: Arc<CacheConfig>,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            entry: RwLock::new(CacheEntry::default()),
            config,
            clock,
            metrics,
        }
    }

    /// Whether events are held and younger than `cache_duration`.
    ///
    /// The bootstrap placeholder is never valid, so its presence does not
    /// suppress upstream attempts.
    pub fn is_cache_valid(&self) -> bool {
        let entry = rw_read(&self.entry, "is_cache_valid");
        self.is_valid(&entry, self.clock.now())
    }

    /// Events, if fresh.
    pub fn get_cached_events(&self) -> Option<Arc<Vec<Event>>> {
        let entry = rw_read(&self.entry, "get_cached_events");
        if self.is_valid(&entry, self.clock.now()) {
            entry.events.clone()
        } else {
            None
        }
    }

    /// Events regardless of staleness.
    pub fn get_cached_events_forced(&self) -> Option<Arc<Vec<Event>>> {
        let entry = rw_read(&self.entry, "get_cached_events_forced");
        entry.events.clone().filter(|e| !e.is_empty())
    }

    /// Fresh events and their metadata, read under one lock.
    pub fn cached_snapshot(&self) -> Option<CachedEvents> {
        let entry = rw_read(&self.entry, "cached_snapshot");
        if self.is_valid(&entry, self.clock.now()) {
            CachedEvents::from_entry(&entry)
        } else {
            None
        }
    }

    /// Held events and their metadata regardless of staleness.
    pub fn cached_snapshot_forced(&self) -> Option<CachedEvents> {
        CachedEvents::from_entry(&rw_read(&self.entry, "cached_snapshot_forced"))
    }

    /// Origin of the data currently held.
    pub fn data_source(&self) -> Option<DataSourceTag> {
        rw_read(&self.entry, "data_source").data_source
    }

    pub fn last_fetch_time(&self) -> Option<DateTime<Utc>> {
        rw_read(&self.entry, "last_fetch_time").last_fetch_time
    }

    /// Whether the only thing held is the synthetic placeholder.
    pub fn is_bootstrapped(&self) -> bool {
        rw_read(&self.entry, "is_bootstrapped").bootstrapped
    }

    /// Replace the cached events.
    ///
    /// Rejects the update with [`MuninnError::MemoryLimitExceeded`] when the
    /// estimate stays above `emergency_threshold × max_memory_usage` after
    /// one cleanup cycle. A rejected update leaves the prior entry in place,
    /// even when the cleanup cycle would have dropped it.
    pub fn update_cache(
        &self,
        events: impl Into<Arc<Vec<Event>>>,
        source: DataSourceTag,
        error_message: Option<&str>,
    ) -> Result<()> {
        let events = events.into();
        let limit = self.config.emergency_limit();
        let mut estimated = estimate_memory(&events);
        let now = self.clock.now();
        let mut entry = rw_write(&self.entry, "update_cache");

        if estimated > limit {
            warn!(estimated, limit, "cache update over memory limit, running cleanup");
            let prior = (*entry).clone();
            self.cleanup_locked(&mut entry, now);
            estimated = estimate_memory(&events);
            if estimated > limit {
                *entry = prior;
                drop(entry);
                metrics::counter!(telemetry::MEMORY_REJECTIONS_TOTAL).increment(1);
                warn!(estimated, limit, "cache update rejected, prior entry kept");
                return Err(MuninnError::MemoryLimitExceeded { estimated, limit });
            }
        }

        let count = events.len();
        entry.events = Some(events);
        entry.last_fetch_time = Some(now);
        entry.data_source = Some(source);
        entry.memory_usage_bytes = estimated;
        entry.last_memory_check = Some(now);
        entry.degraded = false;
        entry.bootstrapped = false;
        if source == DataSourceTag::Remote {
            entry.last_remote_fetch_time = Some(now);
            match error_message {
                None => entry.last_remote_success_time = Some(now),
                Some(message) => entry.last_remote_error_message = Some(message.to_string()),
            }
        }
        drop(entry);

        metrics::gauge!(telemetry::MEMORY_USAGE_BYTES).set(estimated as f64);
        debug!(count, %source, bytes = estimated, "cache updated");
        Ok(())
    }

    /// Keep serving the held data after a failed refresh.
    ///
    /// Below `max_cache_age` the fetch time moves forward by
    /// `cache_extension_duration` (never past now); at or beyond it the timer
    /// restarts and the entry is flagged degraded. Either way the attempt and
    /// its error are recorded.
    pub fn refresh_cache_validity(&self, error_message: Option<&str>) -> ValidityRefresh {
        let now = self.clock.now();
        let mut entry = rw_write(&self.entry, "refresh_cache_validity");
        if !entry.has_events() {
            return ValidityRefresh::Skipped;
        }

        entry.last_remote_fetch_time = Some(now);
        if let Some(message) = error_message {
            entry.last_remote_error_message = Some(message.to_string());
        }

        let age = entry.age(now).unwrap_or(Duration::MAX);
        if age < self.config.max_cache_age {
            let fetched = entry.last_fetch_time.unwrap_or(now);
            let extended = fetched
                .checked_add_signed(clock::to_chrono(self.config.cache_extension_duration))
                .map_or(now, |t| t.min(now));
            entry.last_fetch_time = Some(extended);
            let age = clock::elapsed(extended, now);
            debug!(age_ms = age.as_millis() as u64, "extended stale cache");
            ValidityRefresh::Extended { age }
        } else {
            entry.last_fetch_time = Some(now);
            entry.degraded = true;
            warn!(
                age_secs = age.as_secs(),
                max_age_secs = self.config.max_cache_age.as_secs(),
                "serving very stale data, freshness timer reset"
            );
            ValidityRefresh::Reset
        }
    }

    /// Install a single unverified placeholder event if nothing is cached.
    ///
    /// Returns `true` when the placeholder was installed by this call.
    pub fn bootstrap_cache_with_fallback(&self, reason: &str) -> bool {
        let now = self.clock.now();
        let mut entry = rw_write(&self.entry, "bootstrap_cache_with_fallback");
        if entry.has_events() {
            return false;
        }

        let placeholder = bootstrap_event(reason, now);
        let events = vec![placeholder];
        entry.memory_usage_bytes = estimate_memory(&events);
        entry.events = Some(Arc::new(events));
        entry.data_source = Some(DataSourceTag::Local);
        entry.last_fetch_time = None;
        entry.last_memory_check = Some(now);
        entry.bootstrapped = true;
        entry.degraded = true;
        warn!(reason, "all data sources failed, installed bootstrap placeholder");
        true
    }

    /// Reset every field to its empty value.
    pub fn clear_cache(&self) {
        *rw_write(&self.entry, "clear_cache") = CacheEntry::default();
        metrics::gauge!(telemetry::MEMORY_USAGE_BYTES).set(0.0);
        info!("cache cleared");
    }

    /// Run one cleanup cycle.
    ///
    /// Drops the held entry if it alone is above the cleanup threshold;
    /// otherwise only re-measures it. Returns `true` if the entry was dropped.
    pub fn perform_cleanup(&self) -> bool {
        let now = self.clock.now();
        let mut entry = rw_write(&self.entry, "perform_cleanup");
        self.cleanup_locked(&mut entry, now)
    }

    fn cleanup_locked(&self, entry: &mut CacheEntry, now: DateTime<Utc>) -> bool {
        self.metrics.record_cleanup();
        let usage = entry.events.as_deref().map_or(0, |e| estimate_memory(e));
        if usage > self.config.cleanup_limit() {
            warn!(usage, limit = self.config.cleanup_limit(), "cleanup dropped oversized entry");
            *entry = CacheEntry::default();
            entry.last_memory_check = Some(now);
            return true;
        }
        entry.memory_usage_bytes = usage;
        entry.last_memory_check = Some(now);
        false
    }

    /// Periodic memory check, rate-limited by `memory_check_interval`.
    ///
    /// Returns `None` when the previous check is too recent.
    pub fn check_memory(&self) -> Option<MemoryPressure> {
        let now = self.clock.now();
        let usage = {
            let mut entry = rw_write(&self.entry, "check_memory");
            if let Some(last) = entry.last_memory_check
                && clock::elapsed(last, now) < self.config.memory_check_interval
            {
                return None;
            }
            let usage = entry.events.as_deref().map_or(0, |e| estimate_memory(e));
            entry.memory_usage_bytes = usage;
            entry.last_memory_check = Some(now);
            usage
        };

        metrics::gauge!(telemetry::MEMORY_USAGE_BYTES).set(usage as f64);
        if usage > self.config.emergency_limit() {
            self.perform_cleanup();
            Some(MemoryPressure::Critical)
        } else if usage > self.config.cleanup_limit() {
            warn!(usage, limit = self.config.cleanup_limit(), "cache memory usage elevated");
            Some(MemoryPressure::Elevated)
        } else {
            Some(MemoryPressure::Normal)
        }
    }

    /// Snapshot the entry for operators.
    pub fn get_cache_status(&self) -> CacheStatus {
        let now = self.clock.now();
        let entry = rw_read(&self.entry, "get_cache_status");
        let age = entry.age(now);
        let ttl = self.config.cache_duration;
        let refresh_anchor = entry.last_remote_fetch_time.or(entry.last_fetch_time);
        let limit = self.config.max_memory_usage;

        CacheStatus {
            has_data: entry.has_events(),
            event_count: entry.events.as_ref().map_or(0, |e| e.len()),
            data_source: entry.data_source,
            is_valid: self.is_valid(&entry, now),
            is_bootstrapped: entry.bootstrapped,
            is_degraded: entry.degraded,
            cache_age_ms: age.map(|a| a.as_millis() as u64),
            cache_duration_ms: ttl.as_millis() as u64,
            expires_in_ms: age.map(|a| ttl.saturating_sub(a).as_millis() as u64),
            next_refresh_in_ms: refresh_anchor.map(|t| {
                self.config
                    .remote_refresh_interval
                    .saturating_sub(clock::elapsed(t, now))
                    .as_millis() as u64
            }),
            last_fetch_time: entry.last_fetch_time.map(iso),
            last_remote_fetch_time: entry.last_remote_fetch_time.map(iso),
            last_remote_success_time: entry.last_remote_success_time.map(iso),
            last_remote_error: entry.last_remote_error_message.clone(),
            memory_usage_bytes: entry.memory_usage_bytes,
            memory_limit_bytes: limit,
            memory_utilization_percent: entry.memory_usage_bytes as f64 / limit as f64 * 100.0,
            last_memory_check: entry.last_memory_check.map(iso),
        }
    }

    fn is_valid(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry.has_events() && entry.age(now).is_some_and(|age| age < self.config.cache_duration)
    }
}

fn iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn bootstrap_event(reason: &str, now: DateTime<Utc>) -> Event {
    Event::new(
        BOOTSTRAP_EVENT_ID,
        "Event listings are temporarily unavailable",
        now.date_naive().to_string(),
    )
    .with_tags(["unverified"])
    .with_field("status", "unavailable")
    .with_field("verified", false)
    .with_field("bootstrap", json!({ "reason": reason, "created_at": iso(now) }))
}
