//! Metric producers sampled by the agent's poll loop.

use crate::core::{Metric, Result};

pub mod process;
pub mod system;

pub use process::ProcessPoller;
pub use system::SystemPoller;

/// A source of metrics.
///
/// Implementations sample something on demand and hold no state the pipeline
/// depends on. A failed poll only drops that poller's batch for the tick.
#[async_trait::async_trait]
pub trait Poller: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Take one sample
    async fn poll(&self) -> Result<Vec<Metric>>;
}

/// Pollers the agent runs when none are supplied.
pub fn default_pollers() -> Vec<Box<dyn Poller>> {
    vec![Box::new(ProcessPoller::new()), Box::new(SystemPoller::new())]
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn bytes(value: u64) -> f64 {
    value as f64
}
