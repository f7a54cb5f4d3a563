//! Caching subsystem.
//!
//! - [`CacheStateManager`] — the single, memory-bounded, TTL-governed entry
//!   holding the current event list.
//! - [`RequestDeduplicator`] — single-flight gate collapsing concurrent
//!   identical operations into one.
//! - [`MetricsCollector`] — hit/miss/error counters with a bounded window of
//!   fetch durations.

pub mod dedup;
mod lock;
pub mod metrics;
pub mod state;

pub use dedup::RequestDeduplicator;
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use state::{
    BOOTSTRAP_EVENT_ID, CacheStateManager, CacheStatus, CachedEvents, MEMORY_OVERHEAD_FACTOR,
    MemoryPressure,
    ValidityRefresh, estimate_memory,
};
