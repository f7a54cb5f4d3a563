//! Cache tunables and their resolution from the environment.
//!
//! [`CacheConfig`] holds every knob the cache engine reads. It can be built
//! programmatically (builder-style setters) or resolved from `MUNINN_*`
//! environment variables with [`CacheConfig::from_env()`]. Both paths end in
//! [`CacheConfig::validate()`], which rejects inconsistent thresholds.
//!
//! ```rust
//! # use muninn::CacheConfig;
//! # use std::time::Duration;
//! let config = CacheConfig::new()
//!     .cache_duration(Duration::from_secs(60))
//!     .max_memory_usage(8 * 1024 * 1024);
//! assert!(config.validate().is_ok());
//! ```
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `MUNINN_CACHE_DURATION_MS` | TTL of a fresh entry | 5 min |
//! | `MUNINN_REMOTE_REFRESH_INTERVAL_MS` | background refresh period | 10 min |
//! | `MUNINN_MAX_CACHE_AGE_MS` | age after which extension becomes a reset | 6 h |
//! | `MUNINN_CACHE_EXTENSION_MS` | freshness granted per failed refresh | 15 min |
//! | `MUNINN_MAX_MEMORY_BYTES` | memory budget for the entry | 50 MiB |
//! | `MUNINN_MEMORY_CHECK_INTERVAL_MS` | minimum gap between memory checks | 1 min |
//! | `MUNINN_CLEANUP_THRESHOLD` | fraction of budget that triggers cleanup | 0.8 |
//! | `MUNINN_EMERGENCY_THRESHOLD` | fraction of budget that rejects updates | 0.95 |
//! | `MUNINN_MAX_METRICS_HISTORY` | fetch durations kept | 1000 |
//! | `MUNINN_METRICS_RESET_INTERVAL_MS` | metrics window length | 24 h |
//! | `MUNINN_DEDUP_TIMEOUT_MS` | age at which a pending request is abandoned | 30 s |
//! | `MUNINN_MAX_RETRY_ATTEMPTS` | retries after the first upstream attempt | 3 |
//! | `MUNINN_RETRY_BACKOFF_MS` | base backoff between retries | 1 s |
//! | `MUNINN_BOOTSTRAP_MODE` | allow the synthetic placeholder tier | true |
//! | `MUNINN_VERBOSE_LOGGING` | debug-level logging in binaries | false |
//! | `MUNINN_ALWAYS_PURGE_ON_REFRESH` | purge on refresh even without changes | true |
//! | `MUNINN_INVALIDATION_PATHS` | comma-separated paths purged on refresh | `/,/events` |

use std::str::FromStr;
use std::time::Duration;

use crate::{MuninnError, Result};

/// Smallest memory budget accepted by [`CacheConfig::validate()`].
pub const MIN_MEMORY_USAGE: usize = 1024 * 1024;

/// Longest duration accepted for any tunable (one year).
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

const ENV_PREFIX: &str = "MUNINN_";

/// Configuration for the cache engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// How long a fetched event list is served without revalidation. Default: 5 min.
    pub cache_duration: Duration,
    /// Period of the background refresh loop. Default: 10 min.
    pub remote_refresh_interval: Duration,
    /// Age beyond which a failed refresh resets the timer instead of extending it. Default: 6 h.
    pub max_cache_age: Duration,
    /// Freshness granted to stale data on each failed refresh. Default: 15 min.
    pub cache_extension_duration: Duration,
    /// Memory budget for the cached event list, in bytes. Default: 50 MiB.
    pub max_memory_usage: usize,
    /// Minimum interval between periodic memory checks. Default: 1 min.
    pub memory_check_interval: Duration,
    /// Fraction of `max_memory_usage` above which a cleanup cycle runs. Default: 0.8.
    pub cleanup_threshold: f64,
    /// Fraction of `max_memory_usage` above which updates are rejected. Default: 0.95.
    pub emergency_threshold: f64,
    /// Number of fetch durations retained for metrics. Default: 1000.
    pub max_metrics_history: usize,
    /// Length of the metrics window before an automatic reset. Default: 24 h.
    pub metrics_reset_interval: Duration,
    /// Age at which a pending deduplicated request is considered abandoned. Default: 30 s.
    pub deduplication_timeout: Duration,
    /// Retries after the first upstream attempt. Default: 3.
    pub max_retry_attempts: u32,
    /// Base backoff between retries (doubles per attempt). Default: 1 s.
    pub retry_backoff: Duration,
    /// Whether the synthetic placeholder may be served when every source failed. Default: true.
    pub bootstrap_mode: bool,
    /// Debug-level logging in the binaries. Default: false.
    pub verbose_logging: bool,
    /// Purge the page cache on refresh even when no content changed. Default: true.
    pub always_purge_on_refresh: bool,
    /// Paths purged after a successful refresh. Default: `["/", "/events"]`.
    pub invalidation_paths: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_duration: Duration::from_secs(5 * 60),
            remote_refresh_interval: Duration::from_secs(10 * 60),
            max_cache_age: Duration::from_secs(6 * 3600),
            cache_extension_duration: Duration::from_secs(15 * 60),
            max_memory_usage: 50 * 1024 * 1024,
            memory_check_interval: Duration::from_secs(60),
            cleanup_threshold: 0.8,
            emergency_threshold: 0.95,
            max_metrics_history: 1000,
            metrics_reset_interval: Duration::from_secs(24 * 3600),
            deduplication_timeout: Duration::from_secs(30),
            max_retry_attempts: 3,
            retry_backoff: Duration::from_millis(1000),
            bootstrap_mode: true,
            verbose_logging: false,
            always_purge_on_refresh: true,
            invalidation_paths: vec!["/".to_string(), "/events".to_string()],
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the config from `MUNINN_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed values and
    /// inconsistent thresholds are rejected.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the config through an arbitrary key lookup.
    ///
    /// `lookup` receives full variable names (e.g. `MUNINN_CACHE_DURATION_MS`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = get("CACHE_DURATION_MS") {
            config.cache_duration = parse_millis("CACHE_DURATION_MS", &v)?;
        }
        if let Some(v) = get("REMOTE_REFRESH_INTERVAL_MS") {
            config.remote_refresh_interval = parse_millis("REMOTE_REFRESH_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("MAX_CACHE_AGE_MS") {
            config.max_cache_age = parse_millis("MAX_CACHE_AGE_MS", &v)?;
        }
        if let Some(v) = get("CACHE_EXTENSION_MS") {
            config.cache_extension_duration = parse_millis("CACHE_EXTENSION_MS", &v)?;
        }
        if let Some(v) = get("MAX_MEMORY_BYTES") {
            config.max_memory_usage = parse_value("MAX_MEMORY_BYTES", &v)?;
        }
        if let Some(v) = get("MEMORY_CHECK_INTERVAL_MS") {
            config.memory_check_interval = parse_millis("MEMORY_CHECK_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("CLEANUP_THRESHOLD") {
            config.cleanup_threshold = parse_value("CLEANUP_THRESHOLD", &v)?;
        }
        if let Some(v) = get("EMERGENCY_THRESHOLD") {
            config.emergency_threshold = parse_value("EMERGENCY_THRESHOLD", &v)?;
        }
        if let Some(v) = get("MAX_METRICS_HISTORY") {
            config.max_metrics_history = parse_value("MAX_METRICS_HISTORY", &v)?;
        }
        if let Some(v) = get("METRICS_RESET_INTERVAL_MS") {
            config.metrics_reset_interval = parse_millis("METRICS_RESET_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("DEDUP_TIMEOUT_MS") {
            config.deduplication_timeout = parse_millis("DEDUP_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("MAX_RETRY_ATTEMPTS") {
            config.max_retry_attempts = parse_value("MAX_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("RETRY_BACKOFF_MS") {
            config.retry_backoff = parse_millis("RETRY_BACKOFF_MS", &v)?;
        }
        if let Some(v) = get("BOOTSTRAP_MODE") {
            config.bootstrap_mode = parse_bool("BOOTSTRAP_MODE", &v)?;
        }
        if let Some(v) = get("VERBOSE_LOGGING") {
            config.verbose_logging = parse_bool("VERBOSE_LOGGING", &v)?;
        }
        if let Some(v) = get("ALWAYS_PURGE_ON_REFRESH") {
            config.always_purge_on_refresh = parse_bool("ALWAYS_PURGE_ON_REFRESH", &v)?;
        }
        if let Some(v) = get("INVALIDATION_PATHS") {
            config.invalidation_paths = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the cache engine relies on.
    pub fn validate(&self) -> Result<()> {
        if !(self.cleanup_threshold > 0.0
            && self.cleanup_threshold < self.emergency_threshold
            && self.emergency_threshold < 1.0)
        {
            return Err(MuninnError::Configuration(format!(
                "thresholds must satisfy 0 < cleanup ({}) < emergency ({}) < 1",
                self.cleanup_threshold, self.emergency_threshold
            )));
        }
        if self.max_memory_usage < MIN_MEMORY_USAGE {
            return Err(MuninnError::Configuration(format!(
                "max_memory_usage must be at least {MIN_MEMORY_USAGE} bytes, got {}",
                self.max_memory_usage
            )));
        }
        if self.cache_duration.is_zero() {
            return Err(MuninnError::Configuration(
                "cache_duration must be positive".to_string(),
            ));
        }
        if self.remote_refresh_interval.is_zero() {
            return Err(MuninnError::Configuration(
                "remote_refresh_interval must be positive".to_string(),
            ));
        }
        for (name, value) in self.durations() {
            if value > MAX_DURATION {
                return Err(MuninnError::Configuration(format!(
                    "{name} must be at most {}s, got {}s",
                    MAX_DURATION.as_secs(),
                    value.as_secs()
                )));
            }
        }
        Ok(())
    }

    fn durations(&self) -> [(&'static str, Duration); 8] {
        [
            ("cache_duration", self.cache_duration),
            ("remote_refresh_interval", self.remote_refresh_interval),
            ("max_cache_age", self.max_cache_age),
            ("cache_extension_duration", self.cache_extension_duration),
            ("memory_check_interval", self.memory_check_interval),
            ("metrics_reset_interval", self.metrics_reset_interval),
            ("deduplication_timeout", self.deduplication_timeout),
            ("retry_backoff", self.retry_backoff),
        ]
    }

    /// Byte size above which an update is rejected.
    pub fn emergency_limit(&self) -> usize {
        (self.max_memory_usage as f64 * self.emergency_threshold) as usize
    }

    /// Byte size above which the periodic memory check runs a cleanup cycle.
    pub fn cleanup_limit(&self) -> usize {
        (self.max_memory_usage as f64 * self.cleanup_threshold) as usize
    }

    /// Set the TTL of a fresh entry.
    pub fn cache_duration(mut self, ttl: Duration) -> Self {
        self.cache_duration = ttl;
        self
    }

    /// Set the background refresh period.
    pub fn remote_refresh_interval(mut self, interval: Duration) -> Self {
        self.remote_refresh_interval = interval;
        self
    }

    /// Set the age beyond which failed refreshes reset the timer.
    pub fn max_cache_age(mut self, age: Duration) -> Self {
        self.max_cache_age = age;
        self
    }

    /// Set the freshness granted per failed refresh.
    pub fn cache_extension_duration(mut self, extension: Duration) -> Self {
        self.cache_extension_duration = extension;
        self
    }

    /// Set the memory budget in bytes.
    pub fn max_memory_usage(mut self, bytes: usize) -> Self {
        self.max_memory_usage = bytes;
        self
    }

    /// Set the minimum interval between periodic memory checks.
    pub fn memory_check_interval(mut self, interval: Duration) -> Self {
        self.memory_check_interval = interval;
        self
    }

    /// Set cleanup and emergency thresholds (fractions of the memory budget).
    pub fn thresholds(mut self, cleanup: f64, emergency: f64) -> Self {
        self.cleanup_threshold = cleanup;
        self.emergency_threshold = emergency;
        self
    }

    /// Set the number of retained fetch durations.
    pub fn max_metrics_history(mut self, n: usize) -> Self {
        self.max_metrics_history = n;
        self
    }

    /// Set the metrics window length.
    pub fn metrics_reset_interval(mut self, interval: Duration) -> Self {
        self.metrics_reset_interval = interval;
        self
    }

    /// Set the age at which pending requests are abandoned.
    pub fn deduplication_timeout(mut self, timeout: Duration) -> Self {
        self.deduplication_timeout = timeout;
        self
    }

    /// Set the retry policy for upstream fetches.
    pub fn retries(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_retry_attempts = max_attempts;
        self.retry_backoff = backoff;
        self
    }

    /// Enable or disable the bootstrap placeholder tier.
    pub fn bootstrap_mode(mut self, enabled: bool) -> Self {
        self.bootstrap_mode = enabled;
        self
    }

    /// Enable or disable verbose logging.
    pub fn verbose_logging(mut self, enabled: bool) -> Self {
        self.verbose_logging = enabled;
        self
    }

    /// Purge on refresh even when content is unchanged.
    pub fn always_purge_on_refresh(mut self, enabled: bool) -> Self {
        self.always_purge_on_refresh = enabled;
        self
    }

    /// Set the paths purged after a successful refresh.
    pub fn invalidation_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidation_paths = paths.into_iter().map(Into::into).collect();
        self
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e| {
        MuninnError::Configuration(format!("invalid {ENV_PREFIX}{name} {raw:?}: {e}"))
    })
}

fn parse_millis(name: &str, raw: &str) -> Result<Duration> {
    parse_value::<u64>(name, raw).map(Duration::from_millis)
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(MuninnError::Configuration(format!(
            "invalid {ENV_PREFIX}{name} {raw:?}: expected a boolean"
        ))),
    }
}
