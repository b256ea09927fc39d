//! Typed RPC transport.

use super::MetricsClient;
use crate::core::config::REAL_IP_HEADER;
use crate::core::{Metric, PromLightError, Result};
use crate::rpc::{self, RpcClient};
use std::net::IpAddr;
use std::time::Duration;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};

/// Calls `UpdateMetric` / `UpdateMetricsBatch` on the server.
pub struct GrpcClient {
    client: RpcClient<Channel>,
    uri: String,
    real_ip: Option<MetadataValue<tonic::metadata::Ascii>>,
}

impl GrpcClient {
    /// Prepare a channel to `address`. The connection is made on first use.
    pub fn new(address: &str, timeout: Duration, real_ip: Option<IpAddr>) -> Result<Self> {
        let uri = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let channel = Endpoint::from_shared(uri.clone())
            .map_err(|e| PromLightError::config(format!("invalid server address {}: {}", address, e)))?
            .timeout(timeout)
            .connect_timeout(timeout)
            .connect_lazy();

        let real_ip = real_ip.and_then(|ip| ip.to_string().parse().ok());

        Ok(Self {
            client: RpcClient::new(channel),
            uri,
            real_ip,
        })
    }

    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        if let Some(ip) = &self.real_ip {
            request.metadata_mut().insert(REAL_IP_HEADER, ip.clone());
        }
        request
    }
}

#[async_trait::async_trait]
impl MetricsClient for GrpcClient {
    async fn send_metric(&self, metric: &Metric) -> Result<()> {
        let request = self.request(rpc::UpdateMetricRequest {
            metric: Some(rpc::Metric::from(metric)),
        });
        self.client.clone().update_metric(request).await?;
        Ok(())
    }

    async fn send_batch(&self, metrics: &[Metric]) -> Result<()> {
        let request = self.request(rpc::UpdateMetricsBatchRequest {
            metrics: rpc::batch_to_rpc(metrics),
        });
        self.client.clone().update_metrics_batch(request).await?;
        Ok(())
    }

    async fn shut_down(&self) -> Result<()> {
        // The channel closes once the last clone is dropped.
        tracing::debug!("Releasing RPC channel to {}", self.uri);
        Ok(())
    }
}
