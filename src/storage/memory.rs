//! In-memory storage backend.
//!
//! Two name-keyed maps behind a single mutex. Every operation, snapshots
//! included, takes the same lock, so a snapshot never observes half of a
//! batch.

use super::MetricsStorage;
use crate::core::types::finite_gauge;
use crate::core::{Metric, MetricKind, MetricValue, PromLightError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct MemoryState {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
    /// Bumped on every mutation.
    version: u64,
}

impl MemoryState {
    fn apply(&mut self, name: &str, value: MetricValue) {
        match value {
            MetricValue::Gauge(v) => {
                self.gauges.insert(name.to_string(), v);
            },
            MetricValue::Counter(delta) => {
                let current = self.counters.entry(name.to_string()).or_insert(0);
                *current = current.saturating_add(delta);
            },
        }
        self.version = self.version.wrapping_add(1);
    }

    fn snapshot(&self) -> Vec<Metric> {
        let mut metrics = Vec::with_capacity(self.gauges.len() + self.counters.len());
        metrics.extend(self.gauges.iter().map(|(name, value)| Metric::gauge(name.as_str(), *value)));
        metrics.extend(
            self.counters
                .iter()
                .map(|(name, delta)| Metric::counter(name.as_str(), *delta)),
        );
        metrics.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.id.cmp(&b.id)));
        metrics
    }
}

/// Linearizable in-memory metric storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot together with the mutation counter it reflects.
    pub(crate) fn versioned_snapshot(&self) -> (u64, Vec<Metric>) {
        let state = self.state.lock();
        (state.version, state.snapshot())
    }

    /// Number of stored entries across both kinds.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.gauges.len() + state.counters.len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl MetricsStorage for MemoryStorage {
    async fn set_gauge(&self, name: &str, value: f64) -> Result<()> {
        let value = finite_gauge(name, value)?;
        self.state.lock().apply(name, value);
        Ok(())
    }

    async fn inc_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.state.lock().apply(name, MetricValue::Counter(delta));
        Ok(())
    }

    async fn set_metrics(&self, metrics: &[Metric]) -> Result<()> {
        let mut first_error = None;
        let mut state = self.state.lock();

        // Elements are independent: a bad one is reported, the rest still land.
        for metric in metrics {
            match metric.payload() {
                Ok(value) => state.apply(&metric.id, value),
                Err(e) => {
                    first_error.get_or_insert(e);
                },
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        self.state
            .lock()
            .gauges
            .get(name)
            .copied()
            .ok_or_else(|| PromLightError::not_found(MetricKind::Gauge, name))
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        self.state
            .lock()
            .counters
            .get(name)
            .copied()
            .ok_or_else(|| PromLightError::not_found(MetricKind::Counter, name))
    }

    async fn get_all_metrics(&self) -> Result<Vec<Metric>> {
        Ok(self.state.lock().snapshot())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn shut_down(&self) -> Result<()> {
        Ok(())
    }

    async fn migrate(&self) -> Result<()> {
        Ok(())
    }

    async fn clean_up(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.gauges.clear();
        state.counters.clear();
        state.version = state.version.wrapping_add(1);
        Ok(())
    }
}
