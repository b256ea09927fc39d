//! RPC service implementation.

use super::{Ingest, TrustedSubnet};
use crate::core::config::REAL_IP_HEADER;
use crate::core::{Metric, PromLightError};
use crate::rpc::{self, MetricsServer, MetricsService};
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// `metrics.Metrics` backed by an [`Ingest`].
pub struct GrpcMetricsService {
    ingest: Arc<Ingest>,
    trusted: Option<TrustedSubnet>,
}

/// Wrap the ingestion core into a tonic service.
pub fn create_service(ingest: Arc<Ingest>, trusted: Option<TrustedSubnet>) -> MetricsServer<GrpcMetricsService> {
    MetricsServer::new(GrpcMetricsService { ingest, trusted })
}

impl GrpcMetricsService {
    fn check<T>(&self, request: &Request<T>) -> Result<(), Status> {
        let Some(trusted) = self.trusted else {
            return Ok(());
        };
        let real_ip = request
            .metadata()
            .get(REAL_IP_HEADER)
            .and_then(|v| v.to_str().ok());
        trusted
            .check(real_ip, request.remote_addr())
            .map_err(to_status)
    }
}

/// Map a crate error onto an RPC status.
pub fn to_status(err: PromLightError) -> Status {
    let msg = err.to_string();
    let category = err.category();
    match err {
        PromLightError::NotFound { .. } => Status::not_found(msg),
        PromLightError::Untrusted(_) => Status::permission_denied(msg),
        PromLightError::UnknownKind(_)
        | PromLightError::InvalidValue(_)
        | PromLightError::InvalidSignature(_) => Status::invalid_argument(msg),
        PromLightError::Grpc(status) => status,
        _ => {
            tracing::error!(category, "RPC request failed: {}", msg);
            Status::internal(msg)
        },
    }
}

#[tonic::async_trait]
impl MetricsService for GrpcMetricsService {
    async fn update_metric(
        &self,
        request: Request<rpc::UpdateMetricRequest>,
    ) -> Result<Response<rpc::UpdateMetricResponse>, Status> {
        self.check(&request)?;
        let metric = request
            .into_inner()
            .metric
            .ok_or_else(|| Status::invalid_argument("metric is required"))?;
        let metric = Metric::try_from(metric).map_err(to_status)?;

        self.ingest.update(&metric).await.map_err(to_status)?;
        Ok(Response::new(rpc::UpdateMetricResponse {}))
    }

    async fn update_metrics_batch(
        &self,
        request: Request<rpc::UpdateMetricsBatchRequest>,
    ) -> Result<Response<rpc::UpdateMetricsBatchResponse>, Status> {
        self.check(&request)?;
        let metrics = request
            .into_inner()
            .metrics
            .into_iter()
            .map(Metric::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(to_status)?;

        self.ingest.update_batch(&metrics).await.map_err(to_status)?;
        Ok(Response::new(rpc::UpdateMetricsBatchResponse {}))
    }

    async fn get_metric(
        &self,
        request: Request<rpc::GetMetricRequest>,
    ) -> Result<Response<rpc::GetMetricResponse>, Status> {
        self.check(&request)?;
        let query = request.into_inner();
        let kind = rpc::kind_from_i32(query.r#type).map_err(to_status)?;

        let metric = self
            .ingest
            .value_metric(kind, &query.name)
            .await
            .map_err(to_status)?;
        Ok(Response::new(rpc::GetMetricResponse {
            metric: Some(rpc::Metric::from(&metric)),
        }))
    }
}
