//! File-backed storage.
//!
//! Wraps [`MemoryStorage`] and mirrors its snapshot into a JSON file, either
//! after every mutation (store interval of zero) or from a background timer.
//!
//! Lock order: the memory lock is taken and released to produce a snapshot,
//! only then is the file lock taken for the write. The two are never held
//! together.

use super::{MemoryStorage, MetricsStorage};
use crate::core::{Metric, MetricValue, PromLightError, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Durability mode of a [`FileStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Every mutating call rewrites the file before returning.
    Synchronous,
    /// A background task rewrites the file every interval.
    Periodic(Duration),
}

impl SyncMode {
    /// Zero selects synchronous writes.
    pub fn from_interval(interval: Duration) -> Self {
        if interval.is_zero() {
            SyncMode::Synchronous
        } else {
            SyncMode::Periodic(interval)
        }
    }
}

struct FileInner {
    memory: MemoryStorage,
    path: PathBuf,
    /// Guards the file and holds the version of the last snapshot written.
    file_lock: tokio::sync::Mutex<Option<u64>>,
}

impl FileInner {
    async fn store_data(&self) -> Result<()> {
        let (version, metrics) = self.memory.versioned_snapshot();
        let data = serde_json::to_vec(&metrics)
            .map_err(|e| PromLightError::serialization(format!("failed to encode snapshot: {}", e)))?;

        let mut written = self.file_lock.lock().await;
        if written.is_some_and(|last| last > version) {
            // A concurrent writer already persisted a newer state. The same
            // version is written again, the file may have changed underneath.
            return Ok(());
        }

        tokio::fs::write(&self.path, &data).await?;
        *written = Some(version);
        tracing::debug!("Stored {} metrics to {:?}", metrics.len(), self.path);
        Ok(())
    }

    async fn restore_data(&self) -> Result<usize> {
        let _guard = self.file_lock.lock().await;
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(0);
        }

        let metrics: Vec<Metric> = serde_json::from_slice(&raw).map_err(|e| {
            PromLightError::serialization(format!("failed to decode {:?}: {}", self.path, e))
        })?;

        for metric in &metrics {
            match metric.payload()? {
                MetricValue::Gauge(value) => self.memory.set_gauge(&metric.id, value).await?,
                MetricValue::Counter(delta) => self.memory.inc_counter(&metric.id, delta).await?,
            }
        }

        Ok(metrics.len())
    }

    /// Called after every mutation.
    async fn after_write(&self, mode: SyncMode) {
        if mode != SyncMode::Synchronous {
            return;
        }
        if let Err(e) = self.store_data().await {
            tracing::error!("Failed to store data to {:?}: {}", self.path, e);
        }
    }
}

/// Memory storage with a durable JSON snapshot.
pub struct FileStorage {
    inner: Arc<FileInner>,
    mode: SyncMode,
    cancel: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl FileStorage {
    /// Open (creating if needed) the store file, optionally replay it, and start
    /// the background flusher in periodic mode.
    ///
    /// Fails if the file cannot be opened or its content cannot be restored.
    pub async fn new(path: impl AsRef<Path>, store_interval: Duration, restore: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Fail fast before any metric is accepted.
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| PromLightError::storage(format!("failed to open {:?}: {}", path, e)))?;

        let inner = Arc::new(FileInner {
            memory: MemoryStorage::new(),
            path,
            file_lock: tokio::sync::Mutex::new(None),
        });

        if restore {
            let restored = inner.restore_data().await?;
            tracing::info!("Restored {} metrics from {:?}", restored, inner.path);
        }

        let mode = SyncMode::from_interval(store_interval);
        let cancel = CancellationToken::new();
        let flusher = match mode {
            SyncMode::Synchronous => None,
            SyncMode::Periodic(interval) => {
                Some(spawn_flusher(Arc::clone(&inner), interval, cancel.clone()))
            },
        };

        Ok(Self {
            inner,
            mode,
            cancel,
            flusher: Mutex::new(flusher),
        })
    }

    /// Write the current snapshot to the file.
    pub async fn store_data(&self) -> Result<()> {
        self.inner.store_data().await
    }

    /// Replay the file into memory, returning the number of records applied.
    pub async fn restore_data(&self) -> Result<usize> {
        self.inner.restore_data().await
    }

    /// Durability mode in effect.
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

fn spawn_flusher(inner: Arc<FileInner>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = inner.store_data().await {
                        tracing::error!("Failed to store data to {:?}: {}", inner.path, e);
                    }
                }
            }
        }
        tracing::debug!("File flusher for {:?} stopped", inner.path);
    })
}

#[async_trait::async_trait]
impl MetricsStorage for FileStorage {
    async fn set_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.inner.memory.set_gauge(name, value).await?;
        self.inner.after_write(self.mode).await;
        Ok(())
    }

    async fn inc_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.inner.memory.inc_counter(name, delta).await?;
        self.inner.after_write(self.mode).await;
        Ok(())
    }

    async fn set_metrics(&self, metrics: &[Metric]) -> Result<()> {
        let result = self.inner.memory.set_metrics(metrics).await;
        // Valid elements were applied even if one failed.
        self.inner.after_write(self.mode).await;
        result
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        self.inner.memory.get_gauge(name).await
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        self.inner.memory.get_counter(name).await
    }

    async fn get_all_metrics(&self) -> Result<Vec<Metric>> {
        self.inner.memory.get_all_metrics().await
    }

    async fn ping(&self) -> Result<()> {
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)
            .await?;
        Ok(())
    }

    async fn shut_down(&self) -> Result<()> {
        self.cancel.cancel();
        let flusher = self.flusher.lock().take();
        if let Some(handle) = flusher {
            if let Err(e) = handle.await {
                tracing::warn!("File flusher ended abnormally: {}", e);
            }
        }
        self.inner.store_data().await
    }

    async fn migrate(&self) -> Result<()> {
        Ok(())
    }

    async fn clean_up(&self) -> Result<()> {
        self.inner.memory.clean_up().await?;
        self.inner.after_write(self.mode).await;
        Ok(())
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
