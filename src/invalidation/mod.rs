//! Change detection and external page-cache invalidation.
//!
//! The [`InvalidationManager`] decides *what* to purge; a
//! [`PageCacheInvalidator`] backend performs each purge. Purges are issued
//! concurrently and one failing target never stops the others: failures are
//! collected into the returned report.
//!
//! # Purge targets
//!
//! | call                       | pages            | layout | tags                          |
//! |----------------------------|------------------|--------|-------------------------------|
//! | `clear_all_caches(paths)`  | `paths`          | `/`    | [`EVENT_TAGS`]                |
//! | `emergency_cache_bust()`   | [`EMERGENCY_PATHS`] | `/` | [`EMERGENCY_TAGS`]            |
//! | `revalidate_path(path)`    | `path`           | —      | —                             |

pub mod canonical;
mod purger;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use canonical::{ChangeDetectionResult, canonicalize, detect_changes, event_hash, hash};
pub use purger::{DEFAULT_PURGE_TIMEOUT, HttpPurger, NoopInvalidator};

use crate::Result;
use crate::config::CacheConfig;
use crate::telemetry;
use crate::types::Event;

/// Root layout, purged on every full invalidation.
pub const LAYOUT_PATH: &str = "/";

/// Tags purged by [`InvalidationManager::clear_all_caches()`].
pub const EVENT_TAGS: &[&str] = &["events"];

/// Pages purged by [`InvalidationManager::emergency_cache_bust()`].
pub const EMERGENCY_PATHS: &[&str] = &["/", "/events", "/events/[id]", "/api/events"];

/// Tags purged by [`InvalidationManager::emergency_cache_bust()`].
pub const EMERGENCY_TAGS: &[&str] = &["events", "event-data", "event-list"];

/// What kind of page-cache entry a purge addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurgeScope {
    /// A single rendered page.
    Page,
    /// A layout and everything rendered beneath it.
    Layout,
    /// Every entry carrying a cache tag.
    Tag,
}

impl PurgeScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurgeScope::Page => "page",
            PurgeScope::Layout => "layout",
            PurgeScope::Tag => "tag",
        }
    }
}

impl fmt::Display for PurgeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend that purges an external page cache.
#[async_trait]
pub trait PageCacheInvalidator: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    async fn purge(&self, path: &str, scope: PurgeScope) -> Result<()>;
}

/// One purge that did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeFailure {
    pub target: String,
    pub scope: PurgeScope,
    pub message: String,
}

/// Outcome of a multi-target purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    /// `true` unless every target failed.
    pub success: bool,
    /// Targets purged, as `scope:target`.
    pub cleared_paths: Vec<String>,
    pub errors: Vec<PurgeFailure>,
}

/// Outcome of [`InvalidationManager::smart_invalidation()`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmartInvalidation {
    pub success: bool,
    /// Content differs from the previous snapshot (always `true` without one).
    pub data_changed: bool,
    /// A purge was issued and at least one target succeeded.
    pub invalidated: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_details: Option<ChangeDetectionResult>,
}

/// Outcome of [`InvalidationManager::emergency_cache_bust()`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmergencyBustReport {
    pub success: bool,
    pub operations: usize,
    pub succeeded: usize,
    pub cleared: Vec<String>,
    pub errors: Vec<PurgeFailure>,
    pub message: String,
}

/// Turns cache refreshes into page-cache purges.
pub struct InvalidationManager {
    invalidator: Arc<dyn PageCacheInvalidator>,
    always_purge: bool,
}

impl InvalidationManager {
    pub fn new(invalidator: Arc<dyn PageCacheInvalidator>, config: &CacheConfig) -> Self {
        Self {
            invalidator,
            always_purge: config.always_purge_on_refresh,
        }
    }

    /// Purge every page in `paths`, the root layout, and the event tags.
    pub async fn clear_all_caches(&self, paths: &[String]) -> InvalidationReport {
        let mut targets: Vec<(&str, PurgeScope)> =
            paths.iter().map(|p| (p.as_str(), PurgeScope::Page)).collect();
        targets.push((LAYOUT_PATH, PurgeScope::Layout));
        targets.extend(EVENT_TAGS.iter().map(|t| (*t, PurgeScope::Tag)));
        self.purge_all(&targets).await
    }

    /// Compare `new` against the `old` snapshot and purge.
    ///
    /// With `always_purge_on_refresh` the purge happens even when nothing
    /// changed; `invalidated` then reflects the purge outcome alone.
    pub async fn smart_invalidation(
        &self,
        new: &[Event],
        old: Option<&[Event]>,
        paths: &[String],
    ) -> SmartInvalidation {
        let change_details = old.map(|old| detect_changes(old, new));
        let data_changed = change_details.as_ref().is_none_or(|c| c.has_changes);
        let change_summary = match &change_details {
            Some(changes) => changes.summary(),
            None => "no previous snapshot".to_string(),
        };

        if !data_changed && !self.always_purge {
            info!("no content changes, purge skipped");
            return SmartInvalidation {
                success: true,
                data_changed,
                invalidated: false,
                message: "No changes detected; page cache left untouched".to_string(),
                change_details,
            };
        }

        let report = self.clear_all_caches(paths).await;
        let message = if report.success {
            format!(
                "Page cache purged ({change_summary}); {} targets cleared, {} failed",
                report.cleared_paths.len(),
                report.errors.len()
            )
        } else {
            format!("Page cache purge failed ({change_summary})")
        };
        info!(data_changed, invalidated = report.success, "smart invalidation finished");

        SmartInvalidation {
            success: report.success,
            data_changed,
            invalidated: report.success,
            message,
            change_details,
        }
    }

    /// Purge an expanded set of pages and tags. Never fails.
    pub async fn emergency_cache_bust(&self) -> EmergencyBustReport {
        warn!("emergency cache bust requested");
        let mut targets: Vec<(&str, PurgeScope)> =
            EMERGENCY_PATHS.iter().map(|p| (*p, PurgeScope::Page)).collect();
        targets.push((LAYOUT_PATH, PurgeScope::Layout));
        targets.extend(EMERGENCY_TAGS.iter().map(|t| (*t, PurgeScope::Tag)));

        let report = self.purge_all(&targets).await;
        let operations = targets.len();
        let succeeded = report.cleared_paths.len();
        EmergencyBustReport {
            success: report.success,
            operations,
            succeeded,
            message: format!("Emergency cache bust: {succeeded}/{operations} operations succeeded"),
            cleared: report.cleared_paths,
            errors: report.errors,
        }
    }

    /// Purge a single page.
    pub async fn revalidate_path(&self, path: &str) -> InvalidationReport {
        self.purge_all(&[(path, PurgeScope::Page)]).await
    }

    async fn purge_all(&self, targets: &[(&str, PurgeScope)]) -> InvalidationReport {
        let outcomes = join_all(
            targets
                .iter()
                .map(|(target, scope)| self.invalidator.purge(target, *scope)),
        )
        .await;

        let mut cleared_paths = Vec::new();
        let mut errors = Vec::new();
        for ((target, scope), outcome) in targets.iter().zip(outcomes) {
            let status = if outcome.is_ok() { "ok" } else { "error" };
            metrics::counter!(telemetry::PURGES_TOTAL,
                "scope" => scope.as_str(),
                "status" => status,
            )
            .increment(1);
            match outcome {
                Ok(()) => cleared_paths.push(format!("{scope}:{target}")),
                Err(e) => {
                    warn!(
                        backend = self.invalidator.name(),
                        target,
                        %scope,
                        error = %e,
                        "purge failed"
                    );
                    errors.push(PurgeFailure {
                        target: target.to_string(),
                        scope: *scope,
                        message: e.to_string(),
                    });
                }
            }
        }

        InvalidationReport {
            success: !cleared_paths.is_empty(),
            cleared_paths,
            errors,
        }
    }
}
