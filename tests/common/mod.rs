//! Common test utilities and fixtures.

#![allow(dead_code)]

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use prom_light::core::ServerConfig;
use prom_light::crypto::{RsaPrivateKey, Signer};
use prom_light::receiver::MetricsReceiver;
use prom_light::storage::{MemoryStorage, MetricsStorage};
use prom_light::Metric;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;

/// Builder for a receiver backed by memory storage.
pub struct TestReceiverBuilder {
    config: ServerConfig,
    private_key: Option<RsaPrivateKey>,
}

impl TestReceiverBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig {
                address: "127.0.0.1:0".to_string(),
                store_file: None,
                ..ServerConfig::default()
            },
            private_key: None,
        }
    }

    pub fn hash_key(mut self, key: &str) -> Self {
        self.config.hash_key = Some(key.to_string());
        self
    }

    pub fn trusted_subnet(mut self, cidr: &str) -> Self {
        self.config.trusted_subnet = Some(cidr.parse().unwrap());
        self
    }

    pub fn private_key(mut self, key: RsaPrivateKey) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn build(self) -> (MetricsReceiver, Arc<dyn MetricsStorage>) {
        let storage: Arc<dyn MetricsStorage> = Arc::new(MemoryStorage::new());
        let receiver = MetricsReceiver::new(self.config, Arc::clone(&storage), self.private_key);
        (receiver, storage)
    }
}

impl Default for TestReceiverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Response of a single in-process request.
pub struct TestResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Drive one request through the router without a socket.
pub async fn send(router: &axum::Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    TestResponse {
        status,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

pub fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn signed(mut metric: Metric, key: &str) -> Metric {
    Signer::new(Some(key)).sign(&mut metric).unwrap();
    metric
}

/// One key pair per test binary.
pub fn rsa_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
}

/// Write the key pair as PKCS#1 PEM files, returns (private, public) paths.
pub fn write_key_files(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};

    let private = rsa_key();
    let private_path = dir.join("server.pem");
    let public_path = dir.join("agent.pem");

    std::fs::write(&private_path, private.to_pkcs1_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
    std::fs::write(
        &public_path,
        private.to_public_key().to_pkcs1_pem(LineEnding::LF).unwrap(),
    )
    .unwrap();
    (private_path, public_path)
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..40 {
        if check().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    false
}

/// Behaviour every backend shares. Expects an empty store.
pub async fn check_storage_contract(storage: &dyn MetricsStorage) {
    use prom_light::PromLightError;

    storage.set_gauge("Alloc", 1.5).await.unwrap();
    storage.set_gauge("Alloc", 2.5).await.unwrap();
    assert_eq!(storage.get_gauge("Alloc").await.unwrap(), 2.5);

    storage.inc_counter("PollCount", 3).await.unwrap();
    storage.inc_counter("PollCount", 4).await.unwrap();
    assert_eq!(storage.get_counter("PollCount").await.unwrap(), 7);

    // Same name, other kind: independent entries.
    storage.inc_counter("Alloc", 1).await.unwrap();
    assert_eq!(storage.get_gauge("Alloc").await.unwrap(), 2.5);
    assert_eq!(storage.get_counter("Alloc").await.unwrap(), 1);

    assert!(matches!(
        storage.get_gauge("Missing").await,
        Err(PromLightError::NotFound { .. })
    ));
    assert!(matches!(
        storage.get_counter("Missing").await,
        Err(PromLightError::NotFound { .. })
    ));

    storage
        .set_metrics(&[Metric::counter("PollCount", 1), Metric::gauge("Heap", 9.0)])
        .await
        .unwrap();
    assert_eq!(storage.get_counter("PollCount").await.unwrap(), 8);

    let mut all = storage.get_all_metrics().await.unwrap();
    all.sort_by(|a, b| (a.id.as_str(), a.kind.as_str()).cmp(&(b.id.as_str(), b.kind.as_str())));
    assert_eq!(
        all,
        vec![
            Metric::counter("Alloc", 1),
            Metric::gauge("Alloc", 2.5),
            Metric::gauge("Heap", 9.0),
            Metric::counter("PollCount", 8),
        ]
    );

    storage.ping().await.unwrap();
    storage.clean_up().await.unwrap();
    assert!(storage.get_all_metrics().await.unwrap().is_empty());
}
