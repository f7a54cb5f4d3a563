//! Data sources the orchestrator pulls events from.
//!
//! A [`DataSource`] reports a [`FetchOutcome`] or an error. Sources compose:
//!
//! - [`RetryingDataSource`] retries transient failures of an inner source.
//! - [`FallbackSource`] walks a priority-ordered list and returns the first
//!   usable outcome, so a primary can be "remote, then store, then file"
//!   while the orchestrator only sees the final result.
//!
//! # Fallback semantics
//!
//! A chain falls through to the next source on errors classified by
//! [`MuninnError::is_fallback_trigger()`](crate::MuninnError::is_fallback_trigger)
//! and on outcomes with `success == false` or no events. Any other error
//! (configuration, authorization) stops the chain.

mod chain;
mod file;
mod http;
mod memory;
pub mod payload;
mod retry;

use async_trait::async_trait;

pub use chain::FallbackSource;
pub use file::{FileDataSource, default_snapshot_path};
pub use http::{DEFAULT_FETCH_TIMEOUT, HttpDataSource};
pub use memory::StaticDataSource;
pub use payload::{EventSnapshot, parse_events};
pub use retry::{RetryPolicy, RetryingDataSource};

use crate::Result;
use crate::types::FetchOutcome;

/// Something that can produce the current event list.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Source name for logging and metrics labels.
    fn name(&self) -> &str;

    /// Fetch the full event list.
    ///
    /// Timeouts are the source's own responsibility.
    async fn fetch(&self) -> Result<FetchOutcome>;
}
