//! Metric storage.
//!
//! Three interchangeable backends behind [`MetricsStorage`]:
//! - [`MemoryStorage`] keeps everything in process memory
//! - [`FileStorage`] adds a JSON snapshot file on top of memory
//! - [`PostgresStorage`] keeps one row per metric in PostgreSQL

use crate::core::{Result, ServerConfig};
use std::sync::Arc;

pub mod backend;
pub mod file;
pub mod memory;
pub mod postgres;

pub use backend::MetricsStorage;
pub use file::{FileStorage, SyncMode};
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

/// Build the storage backend selected by the server configuration.
///
/// A database DSN wins over a store file, a store file wins over memory.
pub async fn from_config(config: &ServerConfig) -> Result<Arc<dyn MetricsStorage>> {
    if let Some(dsn) = config.database_dsn() {
        let storage = PostgresStorage::connect(dsn, config.db_conn_timeout).await?;
        storage.migrate().await?;
        tracing::info!("Using database storage");
        return Ok(Arc::new(storage));
    }

    if let Some(path) = config.store_file() {
        let storage = FileStorage::new(path, config.store_interval, config.restore).await?;
        tracing::info!(
            "Using file storage at {:?} ({:?})",
            path,
            storage.mode()
        );
        return Ok(Arc::new(storage));
    }

    tracing::info!("Using in-memory storage");
    Ok(Arc::new(MemoryStorage::new()))
}
