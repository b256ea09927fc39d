//! Storage contract shared by every backend.

use crate::core::{Metric, MetricValue, Result};

/// Trait for metric storage implementations.
///
/// Gauges are last-write-wins, counters add the written delta to whatever is
/// stored. `(name, kind)` is the key: a gauge and a counter with the same name
/// are unrelated entries.
#[async_trait::async_trait]
pub trait MetricsStorage: Send + Sync {
    /// Overwrite a gauge.
    async fn set_gauge(&self, name: &str, value: f64) -> Result<()>;

    /// Add `delta` to a counter, creating it at zero first.
    async fn inc_counter(&self, name: &str, delta: i64) -> Result<()>;

    /// Apply one metric according to its kind.
    async fn set_metric(&self, metric: &Metric) -> Result<()> {
        match metric.payload()? {
            MetricValue::Gauge(value) => self.set_gauge(&metric.id, value).await,
            MetricValue::Counter(delta) => self.inc_counter(&metric.id, delta).await,
        }
    }

    /// Apply a batch of metrics.
    async fn set_metrics(&self, metrics: &[Metric]) -> Result<()>;

    /// Get the current value of a gauge.
    async fn get_gauge(&self, name: &str) -> Result<f64>;

    /// Get the accumulated value of a counter.
    async fn get_counter(&self, name: &str) -> Result<i64>;

    /// Point-in-time copy of every stored metric.
    async fn get_all_metrics(&self) -> Result<Vec<Metric>>;

    /// Check that the backing medium is reachable.
    async fn ping(&self) -> Result<()>;

    /// Release resources, flushing pending durable state.
    async fn shut_down(&self) -> Result<()>;

    /// Prepare schema or structure. Idempotent.
    async fn migrate(&self) -> Result<()>;

    /// Remove every stored metric.
    async fn clean_up(&self) -> Result<()>;
}
