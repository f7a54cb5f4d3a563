//! Public types for the Muninn API.

mod event;
mod response;
mod validation;

pub use event::{DataSourceTag, Event};
pub use response::{EventsResult, FallbackTier, FetchOutcome, RefreshResult};
pub use validation::{MIN_VALID_RATIO, ValidationSummary, validate_events};
