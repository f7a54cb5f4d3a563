//! [`ServiceClient`] — [`CacheService`] implementation that connects to muninnd over gRPC.
//!
//! All proto ↔ native type conversions are centralized in [`crate::server::convert`].
//! The capability token is sent as `authorization: Bearer <token>` metadata on
//! every administrative call.

use async_trait::async_trait;
use tonic::metadata::MetadataValue;
use tonic::transport::Channel;

use crate::cache::{CacheStatus, MetricsSnapshot};
use crate::invalidation::{EmergencyBustReport, InvalidationReport};
use crate::server::proto;
use crate::server::proto::cache_service_client::CacheServiceClient;
use crate::{CacheService, EventsResult, MuninnError, RefreshResult, Result};

const AUTHORIZATION_HEADER: &str = "authorization";

/// A [`CacheService`] client that connects to a remote muninnd server.
#[derive(Clone)]
pub struct ServiceClient {
    inner: CacheServiceClient<Channel>,
    token: Option<String>,
}

impl ServiceClient {
    /// Connect to a muninnd server at the given address.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = ServiceClient::connect("http://127.0.0.1:9742").await?;
    /// ```
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let inner = CacheServiceClient::connect(addr.clone())
            .await
            .map_err(|e| MuninnError::DataFetch(format!("failed to connect to {addr}: {e}")))?;
        Ok(Self { inner, token: None })
    }

    /// Use `token` for calls that do not pass one explicitly.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Check server health. Returns `(healthy, version)`.
    pub async fn health(&self) -> Result<(bool, String)> {
        let response = self
            .inner
            .clone()
            .health(proto::HealthRequest {})
            .await
            .map_err(from_status)?;
        let health = response.into_inner();
        Ok((health.healthy, health.version))
    }

    /// Wrap `message`, attaching the explicit token or the default one.
    fn request<T>(&self, message: T, token: Option<&str>) -> Result<tonic::Request<T>> {
        let mut request = tonic::Request::new(message);
        if let Some(token) = token.or(self.token.as_deref()) {
            let value: MetadataValue<_> = format!("Bearer {token}")
                .parse()
                .map_err(|_| MuninnError::Unauthorized)?;
            request.metadata_mut().insert(AUTHORIZATION_HEADER, value);
        }
        Ok(request)
    }
}

/// Convert [`tonic::Status`] to [`MuninnError`].
fn from_status(status: tonic::Status) -> MuninnError {
    match status.code() {
        tonic::Code::Unauthenticated | tonic::Code::PermissionDenied => MuninnError::Unauthorized,
        tonic::Code::FailedPrecondition | tonic::Code::InvalidArgument => {
            MuninnError::Configuration(status.message().to_string())
        }
        tonic::Code::Unavailable => MuninnError::NoSource,
        _ => MuninnError::DataFetch(status.message().to_string()),
    }
}

// =============================================================================
// CacheService implementation
// =============================================================================

#[async_trait]
impl CacheService for ServiceClient {
    async fn get_events(&self, force_refresh: bool) -> Result<EventsResult> {
        let request = self.request(proto::GetEventsRequest { force_refresh }, None)?;
        let response = self
            .inner
            .clone()
            .get_events(request)
            .await
            .map_err(from_status)?;
        Ok(response.into_inner().into())
    }

    async fn force_refresh(&self, token: Option<&str>) -> Result<RefreshResult> {
        let request = self.request(proto::ForceRefreshRequest {}, token)?;
        let response = self
            .inner
            .clone()
            .force_refresh(request)
            .await
            .map_err(from_status)?;
        Ok(response.into_inner().into())
    }

    async fn emergency_cache_bust(&self, token: Option<&str>) -> Result<EmergencyBustReport> {
        let request = self.request(proto::EmergencyCacheBustRequest {}, token)?;
        let response = self
            .inner
            .clone()
            .emergency_cache_bust(request)
            .await
            .map_err(from_status)?;
        Ok(response.into_inner().into())
    }

    async fn revalidate_path(&self, token: Option<&str>, path: &str) -> Result<InvalidationReport> {
        let request = self.request(
            proto::RevalidatePathRequest {
                path: path.to_string(),
            },
            token,
        )?;
        let response = self
            .inner
            .clone()
            .revalidate_path(request)
            .await
            .map_err(from_status)?;
        Ok(response.into_inner().into())
    }

    async fn get_cache_status(&self, token: Option<&str>) -> Result<CacheStatus> {
        let request = self.request(proto::GetCacheStatusRequest {}, token)?;
        let response = self
            .inner
            .clone()
            .get_cache_status(request)
            .await
            .map_err(from_status)?;
        Ok(response.into_inner().into())
    }

    async fn get_cache_metrics(&self, token: Option<&str>) -> Result<MetricsSnapshot> {
        let request = self.request(proto::GetCacheMetricsRequest {}, token)?;
        let response = self
            .inner
            .clone()
            .get_cache_metrics(request)
            .await
            .map_err(from_status)?;
        Ok(response.into_inner().into())
    }

    async fn reset_cache_metrics(&self, token: Option<&str>) -> Result<()> {
        let request = self.request(proto::ResetCacheMetricsRequest {}, token)?;
        self.inner
            .clone()
            .reset_cache_metrics(request)
            .await
            .map_err(from_status)?;
        Ok(())
    }

    async fn clear_pending_requests(&self, token: Option<&str>) -> Result<usize> {
        let request = self.request(proto::ClearPendingRequestsRequest {}, token)?;
        let response = self
            .inner
            .clone()
            .clear_pending_requests(request)
            .await
            .map_err(from_status)?;
        Ok(response.into_inner().cleared as usize)
    }
}
