//! Page-cache purge backends.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{PageCacheInvalidator, PurgeScope};
use crate::{MuninnError, Result};

/// Default request timeout for the revalidation webhook.
pub const DEFAULT_PURGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct PurgeRequest<'a> {
    path: &'a str,
    scope: PurgeScope,
}

/// Purges by POSTing `{"path", "scope"}` to a revalidation webhook.
#[derive(Clone)]
pub struct HttpPurger {
    http: Client,
    url: String,
    secret: Option<String>,
}

impl HttpPurger {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_PURGE_TIMEOUT)
            .build()
            .map_err(|e| MuninnError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(url, secret, http))
    }

    /// Use a caller-provided client (shared connection pool, custom timeouts).
    pub fn with_http_client(url: impl Into<String>, secret: Option<String>, http: Client) -> Self {
        Self {
            http,
            url: url.into(),
            secret,
        }
    }
}

#[async_trait]
impl PageCacheInvalidator for HttpPurger {
    fn name(&self) -> &str {
        "http"
    }

    async fn purge(&self, path: &str, scope: PurgeScope) -> Result<()> {
        let mut request = self.http.post(&self.url).json(&PurgeRequest { path, scope });
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MuninnError::Invalidation(format!("{scope} {path}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MuninnError::Invalidation(format!(
                "{scope} {path}: webhook returned HTTP {status}: {body}"
            )));
        }
        debug!(path, %scope, "purged");
        Ok(())
    }
}

/// Accepts every purge without doing anything; for deployments without a
/// page cache in front.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

#[async_trait]
impl PageCacheInvalidator for NoopInvalidator {
    fn name(&self) -> &str {
        "noop"
    }

    async fn purge(&self, path: &str, scope: PurgeScope) -> Result<()> {
        debug!(path, %scope, "purge skipped, no page cache configured");
        Ok(())
    }
}
