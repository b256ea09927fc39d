//! Server-side ingestion.
//!
//! [`MetricsReceiver`] serves either the HTTP routes or the RPC service on top
//! of one shared [`Ingest`] core, so both transports apply the same
//! decrypt, parse, verify and store sequence.

pub mod grpc;
pub mod http;
pub mod subnet;

pub use subnet::TrustedSubnet;

use crate::core::types::parse_value;
use crate::core::{Metric, MetricKind, MetricValue, Protocol, PromLightError, Result, ServerConfig};
use crate::crypto::{self, RsaPrivateKey, Signer};
use crate::storage::{self, MetricsStorage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Transport-independent request handling.
pub struct Ingest {
    storage: Arc<dyn MetricsStorage>,
    signer: Signer,
    private_key: Option<RsaPrivateKey>,
}

impl Ingest {
    /// Core over `storage`. Without a private key, batch bodies are read as plain JSON.
    pub fn new(storage: Arc<dyn MetricsStorage>, signer: Signer, private_key: Option<RsaPrivateKey>) -> Self {
        Self {
            storage,
            signer,
            private_key,
        }
    }

    /// Backing store
    pub fn storage(&self) -> &Arc<dyn MetricsStorage> {
        &self.storage
    }

    /// Verify and apply one metric.
    pub async fn update(&self, metric: &Metric) -> Result<()> {
        metric.payload()?;
        self.signer.verify(metric)?;
        self.storage.set_metric(metric).await
    }

    /// Apply a path-encoded, unsigned update.
    pub async fn update_path(&self, kind: &str, name: &str, raw: &str) -> Result<()> {
        let kind: MetricKind = kind.parse()?;
        match parse_value(kind, raw)? {
            MetricValue::Gauge(value) => self.storage.set_gauge(name, value).await,
            MetricValue::Counter(delta) => self.storage.inc_counter(name, delta).await,
        }
    }

    /// Decrypt (when a private key is held) and parse a batch body, then apply it.
    pub async fn update_batch_raw(&self, body: &[u8]) -> Result<usize> {
        let plain;
        let body = match &self.private_key {
            Some(key) => {
                plain = crypto::decrypt(key, body)?;
                plain.as_slice()
            },
            None => body,
        };

        let metrics: Vec<Metric> = serde_json::from_slice(body)?;
        self.update_batch(&metrics).await
    }

    /// Verify a whole batch and apply it. Nothing is stored if any element fails.
    pub async fn update_batch(&self, metrics: &[Metric]) -> Result<usize> {
        for metric in metrics {
            metric.payload()?;
        }
        self.signer.verify_batch(metrics)?;
        self.storage.set_metrics(metrics).await?;
        tracing::debug!("Stored batch of {} metrics", metrics.len());
        Ok(metrics.len())
    }

    /// Current value of a metric.
    pub async fn value(&self, kind: MetricKind, name: &str) -> Result<MetricValue> {
        Ok(match kind {
            MetricKind::Gauge => MetricValue::Gauge(self.storage.get_gauge(name).await?),
            MetricKind::Counter => MetricValue::Counter(self.storage.get_counter(name).await?),
        })
    }

    /// Current value of a metric as a signed record.
    pub async fn value_metric(&self, kind: MetricKind, name: &str) -> Result<Metric> {
        let mut metric = Metric::from_value(name, self.value(kind, name).await?);
        self.signer.sign(&mut metric)?;
        Ok(metric)
    }

    /// Every stored metric
    pub async fn all(&self) -> Result<Vec<Metric>> {
        self.storage.get_all_metrics().await
    }

    /// Storage health
    pub async fn ping(&self) -> Result<()> {
        self.storage.ping().await
    }
}

/// Metrics collector server.
pub struct MetricsReceiver {
    config: ServerConfig,
    ingest: Arc<Ingest>,
    trusted: Option<TrustedSubnet>,
}

impl MetricsReceiver {
    /// Assemble a receiver around an existing store.
    pub fn new(config: ServerConfig, storage: Arc<dyn MetricsStorage>, private_key: Option<RsaPrivateKey>) -> Self {
        let signer = Signer::new(config.key());
        let trusted = config.trusted_subnet.map(TrustedSubnet::new);
        Self {
            ingest: Arc::new(Ingest::new(storage, signer, private_key)),
            trusted,
            config,
        }
    }

    /// Build storage and keys from configuration. Fails if the store cannot be
    /// opened or the key cannot be read.
    pub async fn from_config(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let storage = storage::from_config(&config).await?;
        let private_key = crypto::load_private_key(config.crypto_key.as_deref()).await?;
        if private_key.is_some() {
            tracing::info!("Batch decryption enabled");
        }
        Ok(Self::new(config, storage, private_key))
    }

    /// Shared ingestion core
    pub fn ingest(&self) -> &Arc<Ingest> {
        &self.ingest
    }

    /// HTTP router for this receiver
    pub fn router(&self) -> axum::Router {
        http::create_router(Arc::clone(&self.ingest), self.trusted)
    }

    /// Serve the configured protocol until `cancel` fires, then shut the store down.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let served = match self.config.protocol {
            Protocol::Http => {
                let listener = tokio::net::TcpListener::bind(&self.config.address)
                    .await
                    .map_err(|e| {
                        PromLightError::network(format!(
                            "Failed to bind HTTP server to {}: {}",
                            self.config.address, e
                        ))
                    })?;
                self.serve_http(listener, cancel).await
            },
            Protocol::Grpc => {
                let addr = resolve(&self.config.address).await?;
                self.serve_grpc(addr, cancel).await
            },
        };

        tracing::info!("Shutting down storage");
        let stopped = self.ingest.storage().shut_down().await;
        served.and(stopped)
    }

    /// Serve the HTTP routes on `listener`.
    pub async fn serve_http(&self, listener: tokio::net::TcpListener, cancel: CancellationToken) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!("HTTP server listening on {}", addr);

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| PromLightError::protocol(format!("HTTP server error: {}", e)))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve the RPC service on `addr`.
    pub async fn serve_grpc(&self, addr: SocketAddr, cancel: CancellationToken) -> Result<()> {
        tracing::info!("GRPC server binding to {}", addr);

        let service = grpc::create_service(Arc::clone(&self.ingest), self.trusted);
        tonic::transport::Server::builder()
            .add_service(service)
            .serve_with_shutdown(addr, async move { cancel.cancelled().await })
            .await
            .map_err(|e| PromLightError::protocol(format!("GRPC server error on {}: {}", addr, e)))?;

        tracing::info!("GRPC server stopped");
        Ok(())
    }
}

async fn resolve(address: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(address)
        .await
        .map_err(|e| PromLightError::network(format!("cannot resolve {}: {}", address, e)))?
        .next()
        .ok_or_else(|| PromLightError::network(format!("{} resolved to no address", address)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn ingest(key: Option<&str>) -> Ingest {
        Ingest::new(Arc::new(MemoryStorage::new()), Signer::new(key), None)
    }

    #[tokio::test]
    async fn test_update_path() {
        let ingest = ingest(None);
        ingest.update_path("gauge", "Alloc", "123.5").await.unwrap();
        ingest.update_path("counter", "PollCount", "1").await.unwrap();
        ingest.update_path("counter", "PollCount", "1").await.unwrap();

        assert_eq!(
            ingest.value(MetricKind::Gauge, "Alloc").await.unwrap().to_string(),
            "123.500"
        );
        assert_eq!(
            ingest.value(MetricKind::Counter, "PollCount").await.unwrap(),
            MetricValue::Counter(2)
        );
    }

    #[tokio::test]
    async fn test_update_path_errors() {
        let ingest = ingest(None);
        assert!(matches!(
            ingest.update_path("unknown", "x", "1").await,
            Err(PromLightError::UnknownKind(_))
        ));
        assert!(matches!(
            ingest.update_path("counter", "x", "1.5").await,
            Err(PromLightError::InvalidValue(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_signature_rejects_whole_batch() {
        let signer = Signer::new(Some("secret"));
        let ingest = ingest(Some("secret"));

        let mut batch = vec![Metric::gauge("Alloc", 1.0), Metric::counter("PollCount", 1)];
        signer.sign_batch(&mut batch).unwrap();
        batch[1].delta = Some(100);

        let err = ingest.update_batch(&batch).await.unwrap_err();
        assert!(matches!(err, PromLightError::InvalidSignature(_)));
        assert!(ingest.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_signed_batch_accepted() {
        let signer = Signer::new(Some("secret"));
        let ingest = ingest(Some("secret"));

        let mut batch = vec![Metric::gauge("Alloc", 1.0), Metric::counter("PollCount", 3)];
        signer.sign_batch(&mut batch).unwrap();
        let body = serde_json::to_vec(&batch).unwrap();

        assert_eq!(ingest.update_batch_raw(&body).await.unwrap(), 2);
        assert_eq!(ingest.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_encrypted_batch() {
        let private = crate::crypto::rsa::tests::test_key().clone();
        let public = private.to_public_key();
        let ingest = Ingest::new(Arc::new(MemoryStorage::new()), Signer::new(None), Some(private));

        let body = serde_json::to_vec(&vec![Metric::counter("PollCount", 4)]).unwrap();
        let encrypted = crypto::encrypt(&public, &body).unwrap();
        ingest.update_batch_raw(&encrypted).await.unwrap();
        assert_eq!(
            ingest.value(MetricKind::Counter, "PollCount").await.unwrap(),
            MetricValue::Counter(4)
        );

        // Plain JSON is not accepted once a private key is configured.
        assert!(matches!(
            ingest.update_batch_raw(&body).await,
            Err(PromLightError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_with_missing_payload_stores_nothing() {
        let ingest = ingest(None);
        let mut broken = Metric::counter("Broken", 1);
        broken.delta = None;

        let result = ingest.update_batch(&[Metric::gauge("Alloc", 1.0), broken]).await;
        assert!(matches!(result, Err(PromLightError::InvalidValue(_))));
        assert!(ingest.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_value_metric_is_signed() {
        let signer = Signer::new(Some("secret"));
        let ingest = ingest(Some("secret"));

        let mut metric = Metric::gauge("Alloc", 2.0);
        signer.sign(&mut metric).unwrap();
        ingest.update(&metric).await.unwrap();

        let answer = ingest.value_metric(MetricKind::Gauge, "Alloc").await.unwrap();
        assert!(answer.hash.is_some());
        assert!(signer.verify(&answer).is_ok());
    }
}
