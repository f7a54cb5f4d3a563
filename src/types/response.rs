//! Outcomes returned by data sources and by the orchestrator.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::invalidation::SmartInvalidation;
use crate::types::{DataSourceTag, Event};

/// What a [`DataSource`](crate::sources::DataSource) reports after a fetch.
///
/// `success` with an `error` is a partial success: the events are usable
/// but the source wants the problem recorded (e.g. it served its own
/// internal fallback).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub success: bool,
    pub events: Vec<Event>,
    pub source: DataSourceTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl FetchOutcome {
    /// A clean fetch.
    pub fn ok(events: Vec<Event>, source: DataSourceTag) -> Self {
        Self {
            success: true,
            events,
            source,
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Usable events accompanied by an error worth recording.
    pub fn partial(events: Vec<Event>, source: DataSourceTag, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::ok(events, source)
        }
    }

    /// The source answered but had nothing usable.
    pub fn failed(source: DataSourceTag, error: impl Into<String>) -> Self {
        Self {
            success: false,
            events: Vec::new(),
            source,
            error: Some(error.into()),
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Which fallback tier produced a degraded response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTier {
    /// Previously cached data, served past its TTL.
    StaleCache,
    /// The secondary local/store data source.
    Secondary,
    /// The synthetic placeholder record.
    Bootstrap,
}

impl FallbackTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackTier::StaleCache => "stale_cache",
            FallbackTier::Secondary => "secondary",
            FallbackTier::Bootstrap => "bootstrap",
        }
    }
}

impl fmt::Display for FallbackTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`CacheOrchestrator::get_events()`](crate::CacheOrchestrator::get_events).
///
/// Never an `Err`: degraded responses carry `error` and `fallback`, and
/// only total exhaustion yields `success == false`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventsResult {
    pub success: bool,
    pub data: Arc<Vec<Event>>,
    pub source: Option<DataSourceTag>,
    /// Served from the cache rather than from a fetch made for this request.
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl EventsResult {
    /// Every tier failed.
    pub fn exhausted(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Arc::new(Vec::new()),
            source: None,
            cached: false,
            fallback: None,
            error: Some(error.into()),
            warnings: Vec::new(),
            last_updated: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Result of [`CacheOrchestrator::force_refresh()`](crate::CacheOrchestrator::force_refresh).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshResult {
    pub success: bool,
    pub message: String,
    pub event_count: usize,
    pub source: Option<DataSourceTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidation: Option<SmartInvalidation>,
}
