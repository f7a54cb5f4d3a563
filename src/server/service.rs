//! gRPC service implementation.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::debug;

use super::proto;
use super::proto::cache_service_server::CacheService as CacheServiceRpc;
use crate::{CacheService, MuninnError};

/// Metadata key carrying the capability token.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// gRPC service that exposes a [`CacheService`] implementation.
pub struct MuninnService<S: CacheService> {
    service: Arc<S>,
}

impl<S: CacheService> MuninnService<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

/// Extract the bearer token from request metadata.
fn bearer_token<T>(request: &Request<T>) -> Option<String> {
    let value = request.metadata().get(AUTHORIZATION_HEADER)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Convert [`MuninnError`] to a gRPC [`Status`].
fn to_status(err: MuninnError) -> Status {
    match err {
        MuninnError::Unauthorized => Status::unauthenticated(err.to_string()),
        MuninnError::Configuration(_) => Status::failed_precondition(err.to_string()),
        MuninnError::Validation { .. } => Status::invalid_argument(err.to_string()),
        MuninnError::MemoryLimitExceeded { .. } => Status::resource_exhausted(err.to_string()),
        MuninnError::Timeout(_) => Status::deadline_exceeded(err.to_string()),
        MuninnError::NoSource => Status::unavailable(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

#[tonic::async_trait]
impl<S: CacheService + 'static> CacheServiceRpc for MuninnService<S> {
    async fn health(
        &self,
        _request: Request<proto::HealthRequest>,
    ) -> Result<Response<proto::HealthResponse>, Status> {
        Ok(Response::new(proto::HealthResponse {
            healthy: true,
            version: crate::PKG_VERSION.to_string(),
        }))
    }

    async fn get_events(
        &self,
        request: Request<proto::GetEventsRequest>,
    ) -> Result<Response<proto::EventsResponse>, Status> {
        let force_refresh = request.into_inner().force_refresh;
        debug!(force_refresh, "get_events");
        let result = self
            .service
            .get_events(force_refresh)
            .await
            .map_err(to_status)?;
        Ok(Response::new(result.into()))
    }

    async fn force_refresh(
        &self,
        request: Request<proto::ForceRefreshRequest>,
    ) -> Result<Response<proto::RefreshResponse>, Status> {
        let token = bearer_token(&request);
        let result = self
            .service
            .force_refresh(token.as_deref())
            .await
            .map_err(to_status)?;
        Ok(Response::new(result.into()))
    }

    async fn emergency_cache_bust(
        &self,
        request: Request<proto::EmergencyCacheBustRequest>,
    ) -> Result<Response<proto::EmergencyBustResponse>, Status> {
        let token = bearer_token(&request);
        let report = self
            .service
            .emergency_cache_bust(token.as_deref())
            .await
            .map_err(to_status)?;
        Ok(Response::new(report.into()))
    }

    async fn revalidate_path(
        &self,
        request: Request<proto::RevalidatePathRequest>,
    ) -> Result<Response<proto::InvalidationReport>, Status> {
        let token = bearer_token(&request);
        let path = request.into_inner().path;
        if path.trim().is_empty() {
            return Err(Status::invalid_argument("path must not be empty"));
        }
        let report = self
            .service
            .revalidate_path(token.as_deref(), &path)
            .await
            .map_err(to_status)?;
        Ok(Response::new(report.into()))
    }

    async fn get_cache_status(
        &self,
        request: Request<proto::GetCacheStatusRequest>,
    ) -> Result<Response<proto::CacheStatusResponse>, Status> {
        let token = bearer_token(&request);
        let status = self
            .service
            .get_cache_status(token.as_deref())
            .await
            .map_err(to_status)?;
        Ok(Response::new(status.into()))
    }

    async fn get_cache_metrics(
        &self,
        request: Request<proto::GetCacheMetricsRequest>,
    ) -> Result<Response<proto::MetricsResponse>, Status> {
        let token = bearer_token(&request);
        let snapshot = self
            .service
            .get_cache_metrics(token.as_deref())
            .await
            .map_err(to_status)?;
        Ok(Response::new(snapshot.into()))
    }

    async fn reset_cache_metrics(
        &self,
        request: Request<proto::ResetCacheMetricsRequest>,
    ) -> Result<Response<proto::ResetCacheMetricsResponse>, Status> {
        let token = bearer_token(&request);
        self.service
            .reset_cache_metrics(token.as_deref())
            .await
            .map_err(to_status)?;
        Ok(Response::new(proto::ResetCacheMetricsResponse {}))
    }

    async fn clear_pending_requests(
        &self,
        request: Request<proto::ClearPendingRequestsRequest>,
    ) -> Result<Response<proto::ClearPendingRequestsResponse>, Status> {
        let token = bearer_token(&request);
        let cleared = self
            .service
            .clear_pending_requests(token.as_deref())
            .await
            .map_err(to_status)?;
        Ok(Response::new(proto::ClearPendingRequestsResponse {
            cleared: cleared as u64,
        }))
    }
}
