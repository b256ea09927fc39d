//! JSON over HTTP transport.

use super::MetricsClient;
use crate::core::config::REAL_IP_HEADER;
use crate::core::{Metric, PromLightError, Result};
use crate::crypto::{self, RsaPublicKey};
use std::net::IpAddr;
use std::time::Duration;

const JSON: &str = "application/json";
const ENCRYPTED: &str = "application/octet-stream";

/// Posts metrics to `/update/` and `/updates/`.
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    real_ip: Option<IpAddr>,
    key: Option<RsaPublicKey>,
}

impl HttpClient {
    /// Create a client for `address` (`host:port`, optionally with scheme).
    pub fn new(
        address: &str,
        timeout: Duration,
        real_ip: Option<IpAddr>,
        key: Option<RsaPublicKey>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PromLightError::network(format!("failed to build http client: {}", e)))?;

        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };

        Ok(Self {
            client,
            base_url,
            real_ip,
            key,
        })
    }

    async fn post(&self, endpoint: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        if let Some(ip) = self.real_ip {
            request = request.header(REAL_IP_HEADER, ip.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PromLightError::network(format!("POST {} failed: {}", url, e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(PromLightError::BadStatus {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MetricsClient for HttpClient {
    async fn send_metric(&self, metric: &Metric) -> Result<()> {
        let body = serde_json::to_vec(metric)?;
        self.post("/update/", body, JSON).await
    }

    async fn send_batch(&self, metrics: &[Metric]) -> Result<()> {
        let body = serde_json::to_vec(metrics)?;
        match &self.key {
            Some(key) => {
                let encrypted = crypto::encrypt(key, &body)?;
                self.post("/updates/", encrypted, ENCRYPTED).await
            },
            None => self.post("/updates/", body, JSON).await,
        }
    }

    async fn shut_down(&self) -> Result<()> {
        Ok(())
    }
}
