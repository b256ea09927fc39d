//! Agent-side transports.
//!
//! One [`MetricsClient`] is built at start up from the configured protocol and
//! used by the report loop for the agent's whole lifetime.

use crate::core::{AgentConfig, Metric, Protocol, Result};
use crate::crypto::RsaPublicKey;
use std::net::{IpAddr, SocketAddr};

pub mod grpc;
pub mod http;

pub use grpc::GrpcClient;
pub use http::HttpClient;

/// Pushes metrics to the server.
///
/// Any non-success answer is returned as an error. Clients never retry, the
/// next report tick resends the full snapshot.
#[async_trait::async_trait]
pub trait MetricsClient: Send + Sync {
    /// Send a single (already signed) metric
    async fn send_metric(&self, metric: &Metric) -> Result<()>;

    /// Send a whole snapshot as one request
    async fn send_batch(&self, metrics: &[Metric]) -> Result<()>;

    /// Release transport resources
    async fn shut_down(&self) -> Result<()>;
}

/// Build the client for the configured protocol.
pub async fn new_client(
    config: &AgentConfig,
    public_key: Option<RsaPublicKey>,
) -> Result<Box<dyn MetricsClient>> {
    let real_ip = detect_local_ip(&config.address).await;

    match config.protocol {
        Protocol::Http => {
            let client = HttpClient::new(&config.address, config.report_timeout, real_ip, public_key)?;
            Ok(Box::new(client))
        },
        Protocol::Grpc => {
            if public_key.is_some() {
                tracing::warn!("Payload encryption is not applied over grpc, ignoring crypto key");
            }
            let client = GrpcClient::new(&config.address, config.report_timeout, real_ip)?;
            Ok(Box::new(client))
        },
    }
}

/// Address of the local interface that routes to `server`.
///
/// Connecting a UDP socket sends nothing, it only asks the OS to pick a route.
/// Returns `None` (with a warning) if that fails.
pub async fn detect_local_ip(server: &str) -> Option<IpAddr> {
    let target = server
        .trim_start_matches("http://")
        .trim_start_matches("https://");

    let result: std::io::Result<SocketAddr> = async {
        let target = tokio::net::lookup_host(target)
            .await?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no address"))?;
        let bind: SocketAddr = if target.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = tokio::net::UdpSocket::bind(bind).await?;
        socket.connect(target).await?;
        socket.local_addr()
    }
    .await;

    match result {
        Ok(addr) => Some(addr.ip()),
        Err(e) => {
            tracing::warn!("Failed to detect local address for {}: {}", server, e);
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detect_loopback() {
        let ip = detect_local_ip("127.0.0.1:8080").await;
        assert_eq!(ip, Some(IpAddr::from([127, 0, 0, 1])));
    }

    #[tokio::test]
    async fn test_detect_unresolvable() {
        assert!(detect_local_ip("not a host").await.is_none());
    }

    #[tokio::test]
    async fn test_new_client_per_protocol() {
        let config = AgentConfig {
            address: "127.0.0.1:1".to_string(),
            ..AgentConfig::default()
        };
        assert!(new_client(&config, None).await.is_ok());

        let config = AgentConfig {
            protocol: Protocol::Grpc,
            ..config
        };
        // Construction never dials.
        assert!(new_client(&config, None).await.is_ok());
    }
}
