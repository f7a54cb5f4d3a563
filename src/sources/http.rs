//! Primary upstream: a JSON event list over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::DataSource;
use super::payload::parse_events;
use crate::types::{DataSourceTag, FetchOutcome};
use crate::{MuninnError, Result};

/// Default request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Fetches events with a GET request.
///
/// Accepts a bare JSON array or an object with an `events` array. Non-2xx
/// responses become [`MuninnError::Upstream`]; 429 and 5xx are transient.
#[derive(Clone)]
pub struct HttpDataSource {
    http: Client,
    url: String,
    timeout: Duration,
    bearer_token: Option<String>,
}

impl HttpDataSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MuninnError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            timeout,
            bearer_token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        let mut request = self.http.get(&self.url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                MuninnError::Timeout(self.timeout)
            } else {
                MuninnError::Http(format!("GET {}: {e}", self.url))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MuninnError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let events = parse_events(&body)?;
        debug!(url = %self.url, count = events.len(), "fetched events");
        Ok(FetchOutcome::ok(events, DataSourceTag::Remote))
    }
}
