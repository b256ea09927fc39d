//! Relational storage on PostgreSQL.
//!
//! One row per `(name, type)` pair. Kind is stored as text, the value as `float8`;
//! counters are widened on write and truncated back on read.

use super::MetricsStorage;
use crate::core::types::finite_gauge;
use crate::core::{Metric, MetricKind, MetricValue, PromLightError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS metrics (
    id serial PRIMARY KEY,
    name varchar(255) NOT NULL,
    type varchar(255) NOT NULL,
    value float8 NOT NULL,
    UNIQUE (name, type)
)";

const UPSERT_GAUGE: &str = "INSERT INTO metrics (name, type, value) VALUES ($1, $2, $3)
    ON CONFLICT (name, type) DO UPDATE SET value = excluded.value";

const UPSERT_COUNTER: &str = "INSERT INTO metrics (name, type, value) VALUES ($1, $2, $3)
    ON CONFLICT (name, type) DO UPDATE SET value = metrics.value + excluded.value";

const SELECT_ONE: &str = "SELECT value FROM metrics WHERE name = $1 AND type = $2";

const SELECT_ALL: &str = "SELECT name, type, value FROM metrics ORDER BY id";

/// PostgreSQL-backed metric storage.
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to `dsn`, waiting at most `timeout` for the first connection.
    pub async fn connect(dsn: &str, timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(timeout)
            .connect(dsn)
            .await
            .map_err(|e| PromLightError::connection(format!("failed to connect to database: {}", e)))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn select_value(&self, name: &str, kind: MetricKind) -> Result<Option<f64>> {
        let row = sqlx::query(SELECT_ONE)
            .bind(name)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.try_get::<f64, _>("value"))
            .transpose()
            .map_err(PromLightError::from)
    }
}

fn upsert_query(name: &str, value: MetricValue) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
    let (sql, kind, stored) = match value {
        MetricValue::Gauge(v) => (UPSERT_GAUGE, MetricKind::Gauge, v),
        #[allow(clippy::cast_precision_loss)]
        MetricValue::Counter(d) => (UPSERT_COUNTER, MetricKind::Counter, d as f64),
    };
    sqlx::query(sql).bind(name).bind(kind.as_str()).bind(stored)
}

#[async_trait::async_trait]
impl MetricsStorage for PostgresStorage {
    async fn set_gauge(&self, name: &str, value: f64) -> Result<()> {
        upsert_query(name, finite_gauge(name, value)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn inc_counter(&self, name: &str, delta: i64) -> Result<()> {
        upsert_query(name, MetricValue::Counter(delta))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_metrics(&self, metrics: &[Metric]) -> Result<()> {
        // Reject the whole batch before touching the database.
        let values = metrics
            .iter()
            .map(|metric| metric.payload().map(|value| (metric.id.as_str(), value)))
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;
        for (name, value) in values {
            // Dropping the transaction on error rolls it back.
            upsert_query(name, value).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        self.select_value(name, MetricKind::Gauge)
            .await?
            .ok_or_else(|| PromLightError::not_found(MetricKind::Gauge, name))
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn get_counter(&self, name: &str) -> Result<i64> {
        self.select_value(name, MetricKind::Counter)
            .await?
            .map(|value| value as i64)
            .ok_or_else(|| PromLightError::not_found(MetricKind::Counter, name))
    }

    async fn get_all_metrics(&self) -> Result<Vec<Metric>> {
        let rows = sqlx::query(SELECT_ALL).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<Metric> {
                let name: String = row.try_get("name")?;
                let kind: String = row.try_get("type")?;
                let value: f64 = row.try_get("value")?;

                match kind.parse::<MetricKind>() {
                    Ok(MetricKind::Gauge) => Ok(Metric::gauge(name, value)),
                    #[allow(clippy::cast_possible_truncation)]
                    Ok(MetricKind::Counter) => Ok(Metric::counter(name, value as i64)),
                    Err(_) => Err(PromLightError::serialization(format!(
                        "metric {} has unknown type {:?}",
                        name, kind
                    ))),
                }
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| PromLightError::connection(format!("database unreachable: {}", e)))?;
        Ok(())
    }

    async fn shut_down(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn clean_up(&self) -> Result<()> {
        sqlx::query("DELETE FROM metrics").execute(&self.pool).await?;
        Ok(())
    }
}
