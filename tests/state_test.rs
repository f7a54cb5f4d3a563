use std::sync::Arc;
use std::time::Duration;

use muninn::cache::{
    BOOTSTRAP_EVENT_ID, CacheStateManager, MemoryPressure, MetricsCollector, ValidityRefresh,
};
use muninn::clock::{Clock, ManualClock};
use muninn::types::{DataSourceTag, Event};
use muninn::{CacheConfig, MuninnError};

// ============================================================================
// Helpers
// ============================================================================

fn manager(config: CacheConfig) -> (CacheStateManager, ManualClock, Arc<MetricsCollector>) {
    let clock = ManualClock::default();
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let metrics = Arc::new(MetricsCollector::new(
        config.max_metrics_history,
        config.metrics_reset_interval,
        Arc::clone(&shared),
    ));
    let state = CacheStateManager::new(Arc::new(config), shared, Arc::clone(&metrics));
    (state, clock, metrics)
}

fn jam() -> Vec<Event> {
    vec![Event::new("a", "Jam", "2025-06-21")]
}

/// One event whose serialized form alone exceeds a 1 MiB budget once doubled.
fn oversized() -> Vec<Event> {
    vec![Event::new("big", "Huge", "2025-06-21").with_field("blob", "x".repeat(600_000))]
}

fn one_minute_ttl() -> CacheConfig {
    CacheConfig::default()
        .cache_duration(Duration::from_secs(60))
        .max_memory_usage(1024 * 1024)
}

// ============================================================================
// TTL
// ============================================================================

#[test]
fn fresh_entry_is_valid_until_ttl_elapses() {
    let (state, clock, _) = manager(one_minute_ttl());
    state.update_cache(jam(), DataSourceTag::Remote, None).unwrap();

    clock.advance(Duration::from_secs(30));
    assert!(state.is_cache_valid());
    assert_eq!(state.get_cached_events().unwrap().len(), 1);

    clock.advance(Duration::from_secs(40));
    assert!(!state.is_cache_valid());
    assert!(state.get_cached_events().is_none());
    assert_eq!(state.get_cached_events_forced().unwrap()[0].id, "a");
}

#[test]
fn empty_cache_is_never_valid() {
    let (state, _, _) = manager(one_minute_ttl());
    assert!(!state.is_cache_valid());
    assert!(state.get_cached_events_forced().is_none());
    assert!(state.data_source().is_none());
}

#[test]
fn status_reports_age_and_expiry() {
    let (state, clock, _) = manager(one_minute_ttl());
    state.update_cache(jam(), DataSourceTag::Remote, None).unwrap();
    clock.advance(Duration::from_secs(20));

    let status = state.get_cache_status();
    assert!(status.has_data);
    assert!(status.is_valid);
    assert_eq!(status.event_count, 1);
    assert_eq!(status.data_source, Some(DataSourceTag::Remote));
    assert_eq!(status.cache_age_ms, Some(20_000));
    assert_eq!(status.expires_in_ms, Some(40_000));
    assert_eq!(status.cache_duration_ms, 60_000);
    assert!(status.last_remote_success_time.is_some());
    assert!(status.memory_usage_bytes > 0);
    assert_eq!(status.memory_limit_bytes, 1024 * 1024);
}

#[test]
fn local_updates_do_not_touch_remote_timestamps() {
    let (state, _, _) = manager(one_minute_ttl());
    state.update_cache(jam(), DataSourceTag::Local, None).unwrap();

    let status = state.get_cache_status();
    assert_eq!(status.data_source, Some(DataSourceTag::Local));
    assert!(status.last_remote_fetch_time.is_none());
    assert!(status.last_remote_success_time.is_none());
}

// ============================================================================
// Validity refresh
// ============================================================================

#[test]
fn refresh_below_max_age_extends_the_timer() {
    let (state, clock, _) = manager(CacheConfig::default());
    state.update_cache(jam(), DataSourceTag::Remote, None).unwrap();
    let fetched = clock.now();
    clock.advance(Duration::from_secs(2 * 3600));

    let outcome = state.refresh_cache_validity(Some("upstream down"));
    assert_eq!(
        outcome,
        ValidityRefresh::Extended {
            age: Duration::from_secs(2 * 3600 - 15 * 60)
        }
    );
    assert_eq!(
        state.last_fetch_time(),
        Some(fetched + chrono::Duration::minutes(15))
    );

    let status = state.get_cache_status();
    assert!(!status.is_degraded);
    assert_eq!(status.last_remote_error.as_deref(), Some("upstream down"));
    assert_eq!(status.last_remote_fetch_time.as_deref(), Some("1970-01-01T02:00:00.000Z"));
}

#[test]
fn extension_never_moves_past_now() {
    let (state, clock, _) = manager(CacheConfig::default());
    state.update_cache(jam(), DataSourceTag::Remote, None).unwrap();
    clock.advance(Duration::from_secs(6 * 60));

    let outcome = state.refresh_cache_validity(None);
    assert_eq!(outcome, ValidityRefresh::Extended { age: Duration::ZERO });
    assert_eq!(state.last_fetch_time(), Some(clock.now()));
    assert!(state.is_cache_valid());
}

#[test]
fn refresh_beyond_max_age_resets_and_flags_degraded() {
    let (state, clock, _) = manager(CacheConfig::default());
    state.update_cache(jam(), DataSourceTag::Remote, None).unwrap();
    clock.advance(Duration::from_secs(7 * 3600));

    assert_eq!(state.refresh_cache_validity(Some("still down")), ValidityRefresh::Reset);
    assert_eq!(state.last_fetch_time(), Some(clock.now()));
    assert!(state.is_cache_valid());
    assert!(state.get_cache_status().is_degraded);

    // A real update clears the flag.
    state.update_cache(jam(), DataSourceTag::Remote, None).unwrap();
    assert!(!state.get_cache_status().is_degraded);
}

#[test]
fn refresh_on_empty_cache_is_skipped() {
    let (state, _, _) = manager(CacheConfig::default());
    assert_eq!(state.refresh_cache_validity(Some("down")), ValidityRefresh::Skipped);
    assert!(state.get_cache_status().last_remote_fetch_time.is_none());
}

// ============================================================================
// Memory guard
// ============================================================================

#[test]
fn oversized_update_is_rejected_and_prior_entry_kept() {
    let (state, _, metrics) = manager(one_minute_ttl());
    state.update_cache(jam(), DataSourceTag::Remote, None).unwrap();

    let err = state
        .update_cache(oversized(), DataSourceTag::Remote, None)
        .unwrap_err();
    assert!(matches!(err, MuninnError::MemoryLimitExceeded { .. }));

    let held = state.get_cached_events().unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].id, "a");
    assert_eq!(metrics.snapshot().cleanups, 1);
}

#[test]
fn rejected_update_keeps_prior_entry_above_cleanup_threshold() {
    let config = one_minute_ttl();
    let (cleanup, emergency) = (config.cleanup_limit(), config.emergency_limit());
    let (state, _, metrics) = manager(config);

    let large = vec![
        Event::new("mid", "Festival", "2025-08-01").with_field("blob", "x".repeat(450_000)),
    ];
    let estimate = muninn::cache::estimate_memory(&large);
    assert!(estimate > cleanup && estimate <= emergency);
    state.update_cache(large, DataSourceTag::Store, None).unwrap();

    let err = state
        .update_cache(oversized(), DataSourceTag::Remote, None)
        .unwrap_err();
    assert!(matches!(err, MuninnError::MemoryLimitExceeded { .. }));

    let held = state.cached_snapshot_forced().expect("prior entry should survive");
    assert_eq!(held.events[0].id, "mid");
    assert_eq!(held.source, Some(DataSourceTag::Store));
    assert!(state.is_cache_valid());
    assert_eq!(state.get_cache_status().memory_usage_bytes, estimate);
    assert_eq!(metrics.snapshot().cleanups, 1);
}

#[test]
fn cleanup_keeps_small_entries() {
    let (state, _, _) = manager(one_minute_ttl());
    state.update_cache(jam(), DataSourceTag::Remote, None).unwrap();
    assert!(!state.perform_cleanup());
    assert!(state.get_cached_events().is_some());
}

#[test]
fn memory_check_is_rate_limited() {
    let (state, clock, _) = manager(one_minute_ttl());
    state.update_cache(jam(), DataSourceTag::Remote, None).unwrap();

    assert_eq!(state.check_memory(), None);
    clock.advance(Duration::from_secs(61));
    assert_eq!(state.check_memory(), Some(MemoryPressure::Normal));
    assert_eq!(state.check_memory(), None);
}

// ============================================================================
// Bootstrap
// ============================================================================

#[test]
fn bootstrap_installs_placeholder_once() {
    let (state, _, _) = manager(CacheConfig::default());
    assert!(state.bootstrap_cache_with_fallback("all sources down"));
    assert!(!state.bootstrap_cache_with_fallback("again"));

    assert!(state.is_bootstrapped());
    let events = state.get_cached_events_forced().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, BOOTSTRAP_EVENT_ID);
    assert_eq!(events[0].extra["bootstrap"]["reason"], "all sources down");
}

#[test]
fn placeholder_is_never_fresh() {
    let (state, _, _) = manager(CacheConfig::default());
    state.bootstrap_cache_with_fallback("down");

    assert!(!state.is_cache_valid());
    assert!(state.get_cached_events().is_none());
    let status = state.get_cache_status();
    assert!(status.is_bootstrapped);
    assert!(status.is_degraded);
    assert!(status.last_fetch_time.is_none());
}

#[test]
fn bootstrap_does_not_replace_real_data() {
    let (state, clock, _) = manager(one_minute_ttl());
    state.update_cache(jam(), DataSourceTag::Remote, None).unwrap();
    clock.advance(Duration::from_secs(3600));

    assert!(!state.bootstrap_cache_with_fallback("down"));
    assert!(!state.is_bootstrapped());
    assert_eq!(state.get_cached_events_forced().unwrap()[0].id, "a");
}

#[test]
fn real_update_replaces_placeholder() {
    let (state, _, _) = manager(CacheConfig::default());
    state.bootstrap_cache_with_fallback("down");
    state.update_cache(jam(), DataSourceTag::Remote, None).unwrap();

    assert!(!state.is_bootstrapped());
    assert!(state.is_cache_valid());
}

#[test]
fn clear_cache_empties_everything() {
    let (state, _, _) = manager(CacheConfig::default());
    state.update_cache(jam(), DataSourceTag::Remote, Some("partial")).unwrap();
    state.clear_cache();

    let status = state.get_cache_status();
    assert!(!status.has_data);
    assert_eq!(status.event_count, 0);
    assert!(status.last_remote_error.is_none());
    assert!(status.data_source.is_none());
}

// ============================================================================
// Bounds and snapshots
// ============================================================================

#[test]
fn huge_extension_saturates_at_now() {
    let config = one_minute_ttl().cache_extension_duration(Duration::from_millis(u64::MAX));
    let (state, clock, _) = manager(config);
    state.update_cache(jam(), DataSourceTag::Remote, None).unwrap();
    clock.advance(Duration::from_secs(600));

    let outcome = state.refresh_cache_validity(Some("upstream down"));
    assert_eq!(outcome, ValidityRefresh::Extended { age: Duration::ZERO });
    assert_eq!(state.last_fetch_time(), Some(clock.now()));
}

#[test]
fn snapshot_carries_entry_metadata() {
    let (state, clock, _) = manager(one_minute_ttl());
    assert!(state.cached_snapshot().is_none());

    state.update_cache(jam(), DataSourceTag::Local, None).unwrap();
    let fresh = state.cached_snapshot().unwrap();
    assert_eq!(fresh.events.len(), 1);
    assert_eq!(fresh.source, Some(DataSourceTag::Local));
    assert_eq!(fresh.last_fetch_time, Some(clock.now()));

    clock.advance(Duration::from_secs(61));
    assert!(state.cached_snapshot().is_none());
    assert_eq!(state.cached_snapshot_forced().unwrap(), fresh);
}
