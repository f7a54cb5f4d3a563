//! Tests for the exporter-facing metrics.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::sync::Arc;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use muninn::clock::ManualClock;
use muninn::invalidation::{PageCacheInvalidator, PurgeScope};
use muninn::sources::{DataSource, RetryPolicy, StaticDataSource};
use muninn::telemetry;
use muninn::types::{DataSourceTag, Event, FetchOutcome};
use muninn::{CacheConfig, CacheOrchestrator, MuninnError, Result};

// ============================================================================
// Mocks
// ============================================================================

struct DownSource;

#[async_trait]
impl DataSource for DownSource {
    fn name(&self) -> &str {
        "down"
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        Err(MuninnError::Http("connection refused".to_string()))
    }
}

struct RejectingInvalidator;

#[async_trait]
impl PageCacheInvalidator for RejectingInvalidator {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn purge(&self, path: &str, _scope: PurgeScope) -> Result<()> {
        Err(MuninnError::Invalidation(format!("{path} refused")))
    }
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Sum counter values for `name` whose labels include `label = value`.
fn labelled_total(snapshot: &SnapshotVec, name: &str, label: &str, value: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter
                && key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label && l.value() == value)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

fn jam() -> Vec<Event> {
    vec![Event::new("a", "Jam", "2025-06-21")]
}

// ============================================================================
// Tests
// ============================================================================

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn miss_then_hit_records_cache_counters() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let orchestrator = CacheOrchestrator::builder()
                    .clock(Arc::new(ManualClock::default()))
                    .primary(Arc::new(
                        StaticDataSource::new(jam()).with_tag(DataSourceTag::Remote),
                    ))
                    .build()
                    .unwrap();
                orchestrator.get_events(false).await;
                orchestrator.get_events(false).await;
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 1);
    assert_eq!(
        labelled_total(&snapshot, telemetry::FETCHES_TOTAL, "status", "ok"),
        1
    );
    assert!(
        has_histogram(&snapshot, telemetry::FETCH_DURATION_SECONDS),
        "expected a duration histogram entry"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failing_upstream_records_fallback_tier() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let orchestrator = CacheOrchestrator::builder()
                    .clock(Arc::new(ManualClock::default()))
                    .primary(Arc::new(DownSource))
                    .secondary(Arc::new(StaticDataSource::new(jam())))
                    .retry(RetryPolicy::new(0, std::time::Duration::ZERO))
                    .build()
                    .unwrap();
                orchestrator.get_events(false).await
            })
        })
    });
    assert!(result.success);

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(
        labelled_total(&snapshot, telemetry::FETCHES_TOTAL, "status", "error"),
        1
    );
    assert_eq!(
        labelled_total(&snapshot, telemetry::FALLBACKS_TOTAL, "tier", "secondary"),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn purge_outcomes_are_counted_per_status() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let report = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let orchestrator = CacheOrchestrator::builder()
                    .config(CacheConfig::default())
                    .primary(Arc::new(StaticDataSource::new(jam())))
                    .invalidator(Arc::new(RejectingInvalidator))
                    .build()
                    .unwrap();
                orchestrator.emergency_cache_bust().await
            })
        })
    });
    assert!(!report.success);

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(
        labelled_total(&snapshot, telemetry::PURGES_TOTAL, "status", "error"),
        report.operations as u64
    );
    assert_eq!(
        labelled_total(&snapshot, telemetry::PURGES_TOTAL, "status", "ok"),
        0
    );
}
