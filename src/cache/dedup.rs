//! Single-flight execution keyed by operation identity.
//!
//! Concurrent callers of [`RequestDeduplicator::deduplicate()`] with the same
//! key share one underlying future: the operation runs once and every caller
//! receives a clone of its output. The entry is removed as soon as the
//! shared future resolves, before any caller sees the value.
//!
//! Different keys may carry different output types; each entry is stored
//! type-erased and recovered by downcast.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::lock::mutex_lock;
use crate::telemetry;

type PendingTable = Arc<Mutex<HashMap<String, PendingEntry>>>;

struct PendingEntry {
    generation: u64,
    started: Instant,
    future: Box<dyn Any + Send + Sync>,
}

/// Table of in-flight operations.
pub struct RequestDeduplicator {
    pending: PendingTable,
    timeout: Duration,
    generation: AtomicU64,
}

impl RequestDeduplicator {
    /// Entries older than `timeout` are considered abandoned and replaced by
    /// the next caller. A zero timeout never expires entries.
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
            generation: AtomicU64::new(0),
        }
    }

    /// Run `operation` unless an identical one is already in flight, in which
    /// case await that one instead.
    pub async fn deduplicate<T, F, Fut>(&self, key: &str, operation: F) -> T
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let shared = {
            let mut pending = mutex_lock(&self.pending, "dedup_register");
            let existing = pending.get(key).map(|entry| {
                let expired = !self.timeout.is_zero() && entry.started.elapsed() >= self.timeout;
                let shared = entry
                    .future
                    .downcast_ref::<Shared<BoxFuture<'static, T>>>()
                    .cloned();
                (shared, expired)
            });

            match existing {
                Some((Some(shared), false)) => {
                    metrics::counter!(telemetry::COALESCED_REQUESTS_TOTAL).increment(1);
                    debug!(key, "joining in-flight request");
                    shared
                }
                other => {
                    match other {
                        Some((Some(_), _)) => warn!(
                            key,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "replacing abandoned request"
                        ),
                        Some((None, _)) => {
                            warn!(key, "pending request has a different output type, replacing it")
                        }
                        None => {}
                    }
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let shared = self.track(key, generation, operation);
                    pending.insert(
                        key.to_string(),
                        PendingEntry {
                            generation,
                            started: Instant::now(),
                            future: Box::new(shared.clone()),
                        },
                    );
                    shared
                }
            }
        };

        shared.await
    }

    fn track<T, F, Fut>(&self, key: &str, generation: u64, operation: F) -> Shared<BoxFuture<'static, T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let table = Arc::clone(&self.pending);
        let key = key.to_string();
        async move {
            let output = operation().await;
            let mut pending = mutex_lock(&table, "dedup_complete");
            if pending.get(&key).is_some_and(|e| e.generation == generation) {
                pending.remove(&key);
            }
            output
        }
        .boxed()
        .shared()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        mutex_lock(&self.pending, "dedup_is_pending").contains_key(key)
    }

    /// Keys currently in flight, sorted.
    pub fn list_pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = mutex_lock(&self.pending, "dedup_list")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Forget every pending entry. Callers already awaiting keep their
    /// futures; new callers start fresh operations.
    pub fn clear_all(&self) -> usize {
        let mut pending = mutex_lock(&self.pending, "dedup_clear");
        let cleared = pending.len();
        pending.clear();
        if cleared > 0 {
            warn!(cleared, "cleared pending requests");
        }
        cleared
    }
}
