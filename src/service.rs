//! Administrative service surface.
//!
//! [`CacheService`] is the method set exposed to operators. It is
//! implemented in-process by [`AdminService`] (an orchestrator guarded by an
//! [`Authorizer`]) and, with the `client` feature, over gRPC by
//! `client::ServiceClient`, so callers are agnostic to where the cache lives.
//!
//! Reading events is open; every other method requires a capability token.

use std::sync::Arc;

use async_trait::async_trait;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::cache::{CacheStatus, MetricsSnapshot};
use crate::invalidation::{EmergencyBustReport, InvalidationReport};
use crate::orchestrator::CacheOrchestrator;
use crate::types::{EventsResult, RefreshResult};
use crate::{MuninnError, Result};

/// The operator-facing method set.
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Serve the event list. Unauthenticated.
    async fn get_events(&self, force_refresh: bool) -> Result<EventsResult>;

    async fn force_refresh(&self, token: Option<&str>) -> Result<RefreshResult>;

    async fn emergency_cache_bust(&self, token: Option<&str>) -> Result<EmergencyBustReport>;

    async fn revalidate_path(&self, token: Option<&str>, path: &str) -> Result<InvalidationReport>;

    async fn get_cache_status(&self, token: Option<&str>) -> Result<CacheStatus>;

    async fn get_cache_metrics(&self, token: Option<&str>) -> Result<MetricsSnapshot>;

    async fn reset_cache_metrics(&self, token: Option<&str>) -> Result<()>;

    /// Returns how many pending entries were dropped.
    async fn clear_pending_requests(&self, token: Option<&str>) -> Result<usize>;
}

/// Capability check performed before every administrative call.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, token: Option<&str>) -> Result<()>;
}

/// Accepts exactly one bearer token, compared in constant time.
pub struct StaticTokenAuthorizer {
    token: String,
}

impl StaticTokenAuthorizer {
    /// Fails on an empty token: an empty secret would make every blank
    /// credential valid.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(MuninnError::Configuration(
                "admin token must not be empty".to_string(),
            ));
        }
        Ok(Self { token })
    }
}

impl Authorizer for StaticTokenAuthorizer {
    fn authorize(&self, token: Option<&str>) -> Result<()> {
        let presented = token.unwrap_or_default();
        if self.token.as_bytes().ct_eq(presented.as_bytes()).unwrap_u8() == 1 {
            Ok(())
        } else {
            warn!(token_present = token.is_some(), "rejected administrative call");
            Err(MuninnError::Unauthorized)
        }
    }
}

/// In-process [`CacheService`] over a [`CacheOrchestrator`].
pub struct AdminService {
    orchestrator: CacheOrchestrator,
    authorizer: Arc<dyn Authorizer>,
}

impl AdminService {
    pub fn new(orchestrator: CacheOrchestrator, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            orchestrator,
            authorizer,
        }
    }

    pub fn orchestrator(&self) -> &CacheOrchestrator {
        &self.orchestrator
    }
}

#[async_trait]
impl CacheService for AdminService {
    async fn get_events(&self, force_refresh: bool) -> Result<EventsResult> {
        Ok(self.orchestrator.get_events(force_refresh).await)
    }

    async fn force_refresh(&self, token: Option<&str>) -> Result<RefreshResult> {
        self.authorizer.authorize(token)?;
        Ok(self.orchestrator.force_refresh().await)
    }

    async fn emergency_cache_bust(&self, token: Option<&str>) -> Result<EmergencyBustReport> {
        self.authorizer.authorize(token)?;
        Ok(self.orchestrator.emergency_cache_bust().await)
    }

    async fn revalidate_path(&self, token: Option<&str>, path: &str) -> Result<InvalidationReport> {
        self.authorizer.authorize(token)?;
        Ok(self.orchestrator.revalidate_path(path).await)
    }

    async fn get_cache_status(&self, token: Option<&str>) -> Result<CacheStatus> {
        self.authorizer.authorize(token)?;
        Ok(self.orchestrator.get_cache_status().await)
    }

    async fn get_cache_metrics(&self, token: Option<&str>) -> Result<MetricsSnapshot> {
        self.authorizer.authorize(token)?;
        Ok(self.orchestrator.get_cache_metrics())
    }

    async fn reset_cache_metrics(&self, token: Option<&str>) -> Result<()> {
        self.authorizer.authorize(token)?;
        self.orchestrator.reset_cache_metrics();
        Ok(())
    }

    async fn clear_pending_requests(&self, token: Option<&str>) -> Result<usize> {
        self.authorizer.authorize(token)?;
        Ok(self.orchestrator.clear_pending_requests())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token_accepts_exact_match_only() {
        let auth = StaticTokenAuthorizer::new("s3cret").unwrap();
        assert!(auth.authorize(Some("s3cret")).is_ok());
        assert!(matches!(auth.authorize(Some("s3cre")), Err(MuninnError::Unauthorized)));
        assert!(matches!(auth.authorize(None), Err(MuninnError::Unauthorized)));
    }

    #[test]
    fn empty_token_is_a_configuration_error() {
        assert!(matches!(
            StaticTokenAuthorizer::new("  "),
            Err(MuninnError::Configuration(_))
        ));
    }
}
