use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::DataSource;
use crate::types::FetchOutcome;
use crate::{MuninnError, Result};

/// Priority-ordered list of sources; the first usable outcome wins.
///
/// When a lower-priority source serves, the outcome carries the earlier
/// failure in `error` and one warning per skipped source.
pub struct FallbackSource {
    name: String,
    sources: Vec<Arc<dyn DataSource>>,
}

impl FallbackSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
        }
    }

    /// Append a source at the lowest priority.
    pub fn with_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl DataSource for FallbackSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        let mut skipped: Vec<String> = Vec::new();
        let mut last_err = None;

        for source in &self.sources {
            let failure = match source.fetch().await {
                Ok(outcome) if outcome.success && !outcome.events.is_empty() => {
                    if skipped.is_empty() {
                        return Ok(outcome);
                    }
                    debug!(chain = %self.name, source = source.name(), "served by fallback source");
                    let mut outcome = outcome;
                    if outcome.error.is_none() {
                        outcome.error = skipped.first().cloned();
                    }
                    outcome.warnings.extend(skipped);
                    return Ok(outcome);
                }
                Ok(outcome) => MuninnError::DataFetch(
                    outcome
                        .error
                        .unwrap_or_else(|| "source returned no events".to_string()),
                ),
                Err(e) if e.is_fallback_trigger() => e,
                Err(e) => return Err(e),
            };
            warn!(chain = %self.name, source = source.name(), error = %failure, "source failed, trying next");
            skipped.push(format!("{}: {failure}", source.name()));
            last_err = Some(failure);
        }

        Err(last_err.unwrap_or(MuninnError::NoSource))
    }
}
