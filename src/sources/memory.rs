use async_trait::async_trait;

use super::DataSource;
use crate::Result;
use crate::types::{DataSourceTag, Event, FetchOutcome};

/// Serves a fixed event list.
#[derive(Debug, Clone)]
pub struct StaticDataSource {
    name: String,
    events: Vec<Event>,
    tag: DataSourceTag,
}

impl StaticDataSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            name: "static".to_string(),
            events,
            tag: DataSourceTag::Local,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Report outcomes under a different origin tag.
    pub fn with_tag(mut self, tag: DataSourceTag) -> Self {
        self.tag = tag;
        self
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        Ok(FetchOutcome::ok(self.events.clone(), self.tag))
    }
}
