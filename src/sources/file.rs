//! On-disk fallback snapshot.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::DataSource;
use super::payload::{EventSnapshot, SNAPSHOT_VERSION, parse_events};
use crate::types::{DataSourceTag, Event, FetchOutcome};
use crate::{MuninnError, Result};

/// Default snapshot location: `~/.cache/muninn/events.json`.
pub fn default_snapshot_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("muninn")
        .join("events.json")
}

/// Reads events from a JSON file.
#[derive(Debug, Clone)]
pub struct FileDataSource {
    path: PathBuf,
    tag: DataSourceTag,
}

impl FileDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tag: DataSourceTag::Local,
        }
    }

    /// Report outcomes under a different origin tag (e.g. `store`).
    pub fn with_tag(mut self, tag: DataSourceTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `events` as a versioned snapshot (atomic write via tmp + rename).
    pub async fn save_snapshot(&self, events: &[Event]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MuninnError::Configuration(format!(
                    "failed to create snapshot dir {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let snapshot = EventSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Some(Utc::now()),
            events: events.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        info!(path = %self.path.display(), count = events.len(), "saved event snapshot");
        Ok(())
    }
}

#[async_trait]
impl DataSource for FileDataSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MuninnError::DataFetch(format!(
                    "snapshot {} not found",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let events = parse_events(&content)?;
        debug!(path = %self.path.display(), count = events.len(), "loaded event snapshot");
        Ok(FetchOutcome::ok(events, self.tag))
    }
}
