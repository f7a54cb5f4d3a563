//! Conversions between muninn native types and protobuf types.
//!
//! Native → proto is used by the server for responses; proto → native by
//! the client when decoding them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::cache::{CacheStatus, MetricsSnapshot};
use crate::invalidation::{
    ChangeDetectionResult, EmergencyBustReport, InvalidationReport, PurgeFailure, PurgeScope,
    SmartInvalidation,
};
use crate::types::{DataSourceTag, Event, EventsResult, FallbackTier, RefreshResult};

use super::proto;

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

// =============================================================================
// Enums
// =============================================================================

pub(crate) fn source_to_proto(tag: Option<DataSourceTag>) -> i32 {
    let p = match tag {
        None => proto::DataSource::Unspecified,
        Some(DataSourceTag::Remote) => proto::DataSource::Remote,
        Some(DataSourceTag::Local) => proto::DataSource::Local,
        Some(DataSourceTag::Store) => proto::DataSource::Store,
        Some(DataSourceTag::Cached) => proto::DataSource::Cached,
    };
    p as i32
}

pub(crate) fn source_from_proto(value: i32) -> Option<DataSourceTag> {
    match proto::DataSource::try_from(value).unwrap_or(proto::DataSource::Unspecified) {
        proto::DataSource::Unspecified => None,
        proto::DataSource::Remote => Some(DataSourceTag::Remote),
        proto::DataSource::Local => Some(DataSourceTag::Local),
        proto::DataSource::Store => Some(DataSourceTag::Store),
        proto::DataSource::Cached => Some(DataSourceTag::Cached),
    }
}

fn tier_to_proto(tier: Option<FallbackTier>) -> i32 {
    let p = match tier {
        None => proto::FallbackTier::Unspecified,
        Some(FallbackTier::StaleCache) => proto::FallbackTier::StaleCache,
        Some(FallbackTier::Secondary) => proto::FallbackTier::Secondary,
        Some(FallbackTier::Bootstrap) => proto::FallbackTier::Bootstrap,
    };
    p as i32
}

fn tier_from_proto(value: i32) -> Option<FallbackTier> {
    match proto::FallbackTier::try_from(value).unwrap_or(proto::FallbackTier::Unspecified) {
        proto::FallbackTier::Unspecified => None,
        proto::FallbackTier::StaleCache => Some(FallbackTier::StaleCache),
        proto::FallbackTier::Secondary => Some(FallbackTier::Secondary),
        proto::FallbackTier::Bootstrap => Some(FallbackTier::Bootstrap),
    }
}

fn scope_to_proto(scope: PurgeScope) -> i32 {
    let p = match scope {
        PurgeScope::Page => proto::PurgeScope::Page,
        PurgeScope::Layout => proto::PurgeScope::Layout,
        PurgeScope::Tag => proto::PurgeScope::Tag,
    };
    p as i32
}

fn scope_from_proto(value: i32) -> PurgeScope {
    match proto::PurgeScope::try_from(value).unwrap_or(proto::PurgeScope::Unspecified) {
        proto::PurgeScope::Layout => PurgeScope::Layout,
        proto::PurgeScope::Tag => PurgeScope::Tag,
        proto::PurgeScope::Page | proto::PurgeScope::Unspecified => PurgeScope::Page,
    }
}

// =============================================================================
// Events
// =============================================================================

impl From<&Event> for proto::Event {
    fn from(e: &Event) -> Self {
        proto::Event {
            id: e.id.clone(),
            name: e.name.clone(),
            date: e.date.clone(),
            tags: e.tags.clone(),
            categories: e.categories.clone(),
            links: e.links.clone(),
            extra_json: if e.extra.is_empty() {
                String::new()
            } else {
                Value::Object(e.extra.clone()).to_string()
            },
        }
    }
}

impl From<proto::Event> for Event {
    fn from(p: proto::Event) -> Self {
        let extra = match serde_json::from_str::<Value>(&p.extra_json) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Event {
            id: p.id,
            name: p.name,
            date: p.date,
            tags: p.tags,
            categories: p.categories,
            links: p.links,
            extra,
        }
    }
}

impl From<EventsResult> for proto::EventsResponse {
    fn from(r: EventsResult) -> Self {
        proto::EventsResponse {
            success: r.success,
            events: r.data.iter().map(Into::into).collect(),
            source: source_to_proto(r.source),
            cached: r.cached,
            fallback: tier_to_proto(r.fallback),
            error: r.error,
            warnings: r.warnings,
            last_updated: r.last_updated.map(rfc3339),
        }
    }
}

impl From<proto::EventsResponse> for EventsResult {
    fn from(p: proto::EventsResponse) -> Self {
        EventsResult {
            success: p.success,
            data: std::sync::Arc::new(p.events.into_iter().map(Into::into).collect()),
            source: source_from_proto(p.source),
            cached: p.cached,
            fallback: tier_from_proto(p.fallback),
            error: p.error,
            warnings: p.warnings,
            last_updated: p.last_updated.as_deref().and_then(parse_rfc3339),
        }
    }
}

// =============================================================================
// Invalidation
// =============================================================================

impl From<PurgeFailure> for proto::PurgeFailure {
    fn from(f: PurgeFailure) -> Self {
        proto::PurgeFailure {
            target: f.target,
            scope: scope_to_proto(f.scope),
            message: f.message,
        }
    }
}

impl From<proto::PurgeFailure> for PurgeFailure {
    fn from(p: proto::PurgeFailure) -> Self {
        PurgeFailure {
            target: p.target,
            scope: scope_from_proto(p.scope),
            message: p.message,
        }
    }
}

impl From<ChangeDetectionResult> for proto::ChangeDetection {
    fn from(c: ChangeDetectionResult) -> Self {
        proto::ChangeDetection {
            has_changes: c.has_changes,
            count_changed: c.count_changed,
            added_names: c.added_names,
            removed_names: c.removed_names,
            modified_names: c.modified_names,
        }
    }
}

impl From<proto::ChangeDetection> for ChangeDetectionResult {
    fn from(p: proto::ChangeDetection) -> Self {
        ChangeDetectionResult {
            has_changes: p.has_changes,
            count_changed: p.count_changed,
            added_names: p.added_names,
            removed_names: p.removed_names,
            modified_names: p.modified_names,
        }
    }
}

impl From<SmartInvalidation> for proto::SmartInvalidation {
    fn from(s: SmartInvalidation) -> Self {
        proto::SmartInvalidation {
            success: s.success,
            data_changed: s.data_changed,
            invalidated: s.invalidated,
            message: s.message,
            change_details: s.change_details.map(Into::into),
        }
    }
}

impl From<proto::SmartInvalidation> for SmartInvalidation {
    fn from(p: proto::SmartInvalidation) -> Self {
        SmartInvalidation {
            success: p.success,
            data_changed: p.data_changed,
            invalidated: p.invalidated,
            message: p.message,
            change_details: p.change_details.map(Into::into),
        }
    }
}

impl From<InvalidationReport> for proto::InvalidationReport {
    fn from(r: InvalidationReport) -> Self {
        proto::InvalidationReport {
            success: r.success,
            cleared_paths: r.cleared_paths,
            errors: r.errors.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<proto::InvalidationReport> for InvalidationReport {
    fn from(p: proto::InvalidationReport) -> Self {
        InvalidationReport {
            success: p.success,
            cleared_paths: p.cleared_paths,
            errors: p.errors.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<EmergencyBustReport> for proto::EmergencyBustResponse {
    fn from(r: EmergencyBustReport) -> Self {
        proto::EmergencyBustResponse {
            success: r.success,
            operations: r.operations as u64,
            succeeded: r.succeeded as u64,
            cleared: r.cleared,
            errors: r.errors.into_iter().map(Into::into).collect(),
            message: r.message,
        }
    }
}

impl From<proto::EmergencyBustResponse> for EmergencyBustReport {
    fn from(p: proto::EmergencyBustResponse) -> Self {
        EmergencyBustReport {
            success: p.success,
            operations: p.operations as usize,
            succeeded: p.succeeded as usize,
            cleared: p.cleared,
            errors: p.errors.into_iter().map(Into::into).collect(),
            message: p.message,
        }
    }
}

impl From<RefreshResult> for proto::RefreshResponse {
    fn from(r: RefreshResult) -> Self {
        proto::RefreshResponse {
            success: r.success,
            message: r.message,
            event_count: r.event_count as u64,
            source: source_to_proto(r.source),
            error: r.error,
            invalidation: r.invalidation.map(Into::into),
        }
    }
}

impl From<proto::RefreshResponse> for RefreshResult {
    fn from(p: proto::RefreshResponse) -> Self {
        RefreshResult {
            success: p.success,
            message: p.message,
            event_count: p.event_count as usize,
            source: source_from_proto(p.source),
            error: p.error,
            invalidation: p.invalidation.map(Into::into),
        }
    }
}

// =============================================================================
// Status and metrics
// =============================================================================

impl From<CacheStatus> for proto::CacheStatusResponse {
    fn from(s: CacheStatus) -> Self {
        proto::CacheStatusResponse {
            has_data: s.has_data,
            event_count: s.event_count as u64,
            data_source: source_to_proto(s.data_source),
            is_valid: s.is_valid,
            is_bootstrapped: s.is_bootstrapped,
            is_degraded: s.is_degraded,
            cache_age_ms: s.cache_age_ms,
            cache_duration_ms: s.cache_duration_ms,
            expires_in_ms: s.expires_in_ms,
            next_refresh_in_ms: s.next_refresh_in_ms,
            last_fetch_time: s.last_fetch_time,
            last_remote_fetch_time: s.last_remote_fetch_time,
            last_remote_success_time: s.last_remote_success_time,
            last_remote_error: s.last_remote_error,
            memory_usage_bytes: s.memory_usage_bytes as u64,
            memory_limit_bytes: s.memory_limit_bytes as u64,
            memory_utilization_percent: s.memory_utilization_percent,
            last_memory_check: s.last_memory_check,
        }
    }
}

impl From<proto::CacheStatusResponse> for CacheStatus {
    fn from(p: proto::CacheStatusResponse) -> Self {
        CacheStatus {
            has_data: p.has_data,
            event_count: p.event_count as usize,
            data_source: source_from_proto(p.data_source),
            is_valid: p.is_valid,
            is_bootstrapped: p.is_bootstrapped,
            is_degraded: p.is_degraded,
            cache_age_ms: p.cache_age_ms,
            cache_duration_ms: p.cache_duration_ms,
            expires_in_ms: p.expires_in_ms,
            next_refresh_in_ms: p.next_refresh_in_ms,
            last_fetch_time: p.last_fetch_time,
            last_remote_fetch_time: p.last_remote_fetch_time,
            last_remote_success_time: p.last_remote_success_time,
            last_remote_error: p.last_remote_error,
            memory_usage_bytes: p.memory_usage_bytes as usize,
            memory_limit_bytes: p.memory_limit_bytes as usize,
            memory_utilization_percent: p.memory_utilization_percent,
            last_memory_check: p.last_memory_check,
        }
    }
}

impl From<MetricsSnapshot> for proto::MetricsResponse {
    fn from(m: MetricsSnapshot) -> Self {
        proto::MetricsResponse {
            hits: m.hits,
            misses: m.misses,
            errors: m.errors,
            cleanups: m.cleanups,
            total_requests: m.total_requests,
            hit_rate: m.hit_rate,
            average_fetch_ms: m.average_fetch_ms,
            fetch_durations_ms: m.fetch_durations_ms,
            window_started_at: rfc3339(m.window_started_at),
        }
    }
}

impl From<proto::MetricsResponse> for MetricsSnapshot {
    fn from(p: proto::MetricsResponse) -> Self {
        MetricsSnapshot {
            hits: p.hits,
            misses: p.misses,
            errors: p.errors,
            cleanups: p.cleanups,
            total_requests: p.total_requests,
            hit_rate: p.hit_rate,
            average_fetch_ms: p.average_fetch_ms,
            fetch_durations_ms: p.fetch_durations_ms,
            window_started_at: parse_rfc3339(&p.window_started_at).unwrap_or_default(),
        }
    }
}
