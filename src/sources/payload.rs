//! Wire formats for event lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Event;
use crate::{MuninnError, Result};

/// Highest snapshot format version this build understands.
pub const SNAPSHOT_VERSION: u32 = 1;

/// On-disk snapshot written by [`FileDataSource::save_snapshot()`](super::FileDataSource::save_snapshot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    pub events: Vec<Event>,
}

/// Accept a bare array, `{"events": [...]}`, or a versioned snapshot.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPayload {
    Bare(Vec<Event>),
    Wrapped {
        #[serde(default)]
        version: Option<u32>,
        events: Vec<Event>,
    },
}

/// Parse an event list payload.
pub fn parse_events(json: &str) -> Result<Vec<Event>> {
    let payload: RawPayload = serde_json::from_str(json)?;
    match payload {
        RawPayload::Bare(events) => Ok(events),
        RawPayload::Wrapped { version, events } => match version {
            Some(v) if v > SNAPSHOT_VERSION => Err(MuninnError::DataFetch(format!(
                "unsupported snapshot version {v} (max supported: {SNAPSHOT_VERSION})"
            ))),
            _ => Ok(events),
        },
    }
}
