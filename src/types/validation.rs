//! Payload validation for fetched event lists.

use crate::types::Event;
use crate::{MuninnError, Result};

/// Share of records that must be well-formed for a payload to be accepted.
pub const MIN_VALID_RATIO: f64 = 0.8;

/// Counts produced by a successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSummary {
    pub valid: usize,
    pub total: usize,
}

impl ValidationSummary {
    /// Records that failed the id/name/date check but were tolerated.
    pub fn malformed(&self) -> usize {
        self.total - self.valid
    }
}

/// Accept `events` when at least [`MIN_VALID_RATIO`] of them carry a
/// non-empty id, name and date.
///
/// An empty list is rejected: upstreams that lose their data tend to answer
/// with `[]`, and serving stale events beats serving none.
pub fn validate_events(events: &[Event]) -> Result<ValidationSummary> {
    let total = events.len();
    let valid = events.iter().filter(|e| e.is_well_formed()).count();
    if total == 0 || (valid as f64) < (total as f64) * MIN_VALID_RATIO {
        return Err(MuninnError::Validation { valid, total });
    }
    Ok(ValidationSummary { valid, total })
}
