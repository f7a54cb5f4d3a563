//! Muninn - memory-bounded event cache with fallback orchestration
//!
//! This crate serves an event list to readers while shielding them from the
//! latency and flakiness of the upstream that produces it. One
//! [`CacheOrchestrator`] owns a single TTL-governed cache entry, collapses
//! concurrent identical requests into one, walks a chain of fallback tiers
//! when the upstream fails, and purges an external page cache when a refresh
//! brings in new content.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use muninn::{CacheConfig, CacheOrchestrator};
//! use muninn::sources::{FileDataSource, HttpDataSource};
//!
//! #[tokio::main]
//! async fn main() -> muninn::Result<()> {
//!     let orchestrator = CacheOrchestrator::builder()
//!         .config(CacheConfig::from_env()?)
//!         .primary(Arc::new(HttpDataSource::new("https://example.org/events.json")?))
//!         .secondary(Arc::new(FileDataSource::new("/var/lib/muninn/events.json")))
//!         .build()?;
//!
//!     let result = orchestrator.get_events(false).await;
//!     println!("{} events (cached: {})", result.len(), result.cached);
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `server` — the `muninnd` gRPC daemon and the server half of the proto
//! - `client` — [`client::ServiceClient`] and the `muninn` CLI

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod orchestrator;
pub mod service;
pub mod sources;
pub mod telemetry;
pub mod types;

#[cfg(any(feature = "server", feature = "client"))]
pub mod server;

#[cfg(feature = "client")]
pub mod client;

// Re-export main types at crate root
pub use config::CacheConfig;
pub use error::{MuninnError, Result};
pub use orchestrator::{CacheOrchestrator, CacheOrchestratorBuilder};
pub use service::{AdminService, Authorizer, CacheService, StaticTokenAuthorizer};
pub use types::{
    DataSourceTag, Event, EventsResult, FallbackTier, FetchOutcome, RefreshResult,
};

/// Crate version, as published.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
