//! In-process cache counters with a bounded fetch-duration window.
//!
//! [`MetricsCollector`] backs the administrative `get_cache_metrics` call.
//! Every record is mirrored to the `metrics` facade (see
//! [`telemetry`](crate::telemetry)) so an installed exporter sees the same
//! events without polling the snapshot.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::lock::mutex_lock;
use crate::clock::{self, Clock};
use crate::telemetry;

/// Point-in-time copy of the collector's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub cleanups: u64,
    pub total_requests: u64,
    /// `hits / total_requests`, or 0 when nothing was requested yet.
    pub hit_rate: f64,
    /// Mean of the retained fetch durations, in milliseconds.
    pub average_fetch_ms: f64,
    /// Retained fetch durations, oldest first.
    pub fetch_durations_ms: Vec<u64>,
    pub window_started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Counters {
    hits: u64,
    misses: u64,
    errors: u64,
    cleanups: u64,
    total_requests: u64,
    fetch_durations: VecDeque<Duration>,
    window_started_at: DateTime<Utc>,
}

impl Counters {
    fn new(started: DateTime<Utc>) -> Self {
        Self {
            hits: 0,
            misses: 0,
            errors: 0,
            cleanups: 0,
            total_requests: 0,
            fetch_durations: VecDeque::new(),
            window_started_at: started,
        }
    }
}

/// Hit/miss/error/timing counters for the cache engine.
pub struct MetricsCollector {
    counters: Mutex<Counters>,
    max_history: usize,
    reset_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl MetricsCollector {
    /// Create a collector keeping at most `max_history` fetch durations and
    /// restarting its window every `reset_interval`.
    pub fn new(max_history: usize, reset_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let started = clock.now();
        Self {
            counters: Mutex::new(Counters::new(started)),
            max_history,
            reset_interval,
            clock,
        }
    }

    pub fn record_hit(&self) {
        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        self.update("record_hit", |c| {
            c.hits += 1;
            c.total_requests += 1;
        });
    }

    pub fn record_miss(&self) {
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        self.update("record_miss", |c| {
            c.misses += 1;
            c.total_requests += 1;
        });
    }

    pub fn record_error(&self) {
        self.update("record_error", |c| c.errors += 1);
    }

    pub fn record_cleanup(&self) {
        self.update("record_cleanup", |c| c.cleanups += 1);
    }

    /// Append a fetch duration, evicting the oldest once the window is full.
    pub fn record_fetch_duration(&self, duration: Duration) {
        let max = self.max_history;
        self.update("record_fetch_duration", |c| {
            if max == 0 {
                return;
            }
            while c.fetch_durations.len() >= max {
                c.fetch_durations.pop_front();
            }
            c.fetch_durations.push_back(duration);
        });
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut counters = mutex_lock(&self.counters, "metrics_snapshot");
        self.roll_window(&mut counters);

        let durations: Vec<u64> = counters
            .fetch_durations
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect();
        let average_fetch_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };
        let hit_rate = if counters.total_requests == 0 {
            0.0
        } else {
            counters.hits as f64 / counters.total_requests as f64
        };

        MetricsSnapshot {
            hits: counters.hits,
            misses: counters.misses,
            errors: counters.errors,
            cleanups: counters.cleanups,
            total_requests: counters.total_requests,
            hit_rate,
            average_fetch_ms,
            fetch_durations_ms: durations,
            window_started_at: counters.window_started_at,
        }
    }

    /// Zero every counter and restart the window clock.
    pub fn reset(&self) {
        let now = self.clock.now();
        *mutex_lock(&self.counters, "metrics_reset") = Counters::new(now);
    }

    fn update(&self, op: &'static str, f: impl FnOnce(&mut Counters)) {
        let mut counters = mutex_lock(&self.counters, op);
        self.roll_window(&mut counters);
        f(&mut counters);
    }

    fn roll_window(&self, counters: &mut Counters) {
        let now = self.clock.now();
        if clock::elapsed(counters.window_started_at, now) >= self.reset_interval {
            *counters = Counters::new(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn collector(max: usize, clock: &ManualClock) -> MetricsCollector {
        MetricsCollector::new(max, Duration::from_secs(3600), Arc::new(clock.clone()))
    }

    #[test]
    fn counts_hits_and_misses() {
        let clock = ManualClock::default();
        let m = collector(10, &clock);
        m.record_hit();
        m.record_hit();
        m.record_miss();
        m.record_error();
        let snap = m.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.total_requests, 3);
        assert!((snap.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn history_evicts_oldest_first() {
        let clock = ManualClock::default();
        let m = collector(3, &clock);
        for ms in [10, 20, 30, 40, 50] {
            m.record_fetch_duration(Duration::from_millis(ms));
        }
        let snap = m.snapshot();
        assert_eq!(snap.fetch_durations_ms, vec![30, 40, 50]);
        assert_eq!(snap.average_fetch_ms, 40.0);
    }

    #[test]
    fn zero_history_keeps_nothing() {
        let clock = ManualClock::default();
        let m = collector(0, &clock);
        m.record_fetch_duration(Duration::from_millis(5));
        assert!(m.snapshot().fetch_durations_ms.is_empty());
    }

    #[test]
    fn reset_zeroes_and_restarts_window() {
        let clock = ManualClock::default();
        let m = collector(10, &clock);
        m.record_hit();
        m.record_cleanup();
        clock.advance(Duration::from_secs(60));
        m.reset();
        let snap = m.snapshot();
        assert_eq!(snap.hits, 0);
        assert_eq!(snap.cleanups, 0);
        assert_eq!(snap.window_started_at, clock.now());
    }

    #[test]
    fn window_rolls_after_reset_interval() {
        let clock = ManualClock::default();
        let m = collector(10, &clock);
        m.record_miss();
        clock.advance(Duration::from_secs(3600));
        assert_eq!(m.snapshot().misses, 0);
    }
}
