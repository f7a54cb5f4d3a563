//! Muninn error types

use std::time::Duration;

/// Muninn error types
#[derive(Debug, thiserror::Error)]
pub enum MuninnError {
    // Upstream/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("data fetch failed: {0}")]
    DataFetch(String),

    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    // Payload errors
    /// Fewer than the required share of records carry a non-empty id, name and date.
    #[error("validation failed: {valid} of {total} events are well-formed")]
    Validation { valid: usize, total: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Cache errors
    #[error("memory limit exceeded: estimated {estimated} bytes, limit {limit} bytes")]
    MemoryLimitExceeded { estimated: usize, limit: usize },

    #[error("cache invalidation failed: {0}")]
    Invalidation(String),

    // Configuration errors
    #[error("no data source configured")]
    NoSource,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl MuninnError {
    /// Whether this error should push the orchestrator onto the next fallback tier.
    ///
    /// Everything that describes "the upstream could not give us usable data"
    /// qualifies; local faults (configuration, authorization) do not.
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(
            self,
            MuninnError::Http(_)
                | MuninnError::Upstream { .. }
                | MuninnError::DataFetch(_)
                | MuninnError::Timeout(_)
                | MuninnError::Validation { .. }
                | MuninnError::Json(_)
                | MuninnError::Io(_)
                | MuninnError::NoSource
        )
    }

    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            MuninnError::Http(_) | MuninnError::Timeout(_) | MuninnError::DataFetch(_) => true,
            MuninnError::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for MuninnError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            MuninnError::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            MuninnError::Http(err.to_string())
        }
    }
}

/// Result type alias for Muninn operations
pub type Result<T> = std::result::Result<T, MuninnError>;
