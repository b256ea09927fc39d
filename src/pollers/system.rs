//! Host-wide memory and CPU statistics.

use super::{bytes, Poller};
use crate::core::{Metric, Result};
use parking_lot::Mutex;
use sysinfo::System;

/// Samples host memory and per-core CPU utilization.
///
/// CPU usage is computed between two refreshes, so the first poll after
/// construction reports zero for every core.
pub struct SystemPoller {
    system: Mutex<System>,
}

impl SystemPoller {
    /// Create a poller with an empty system view.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemPoller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Poller for SystemPoller {
    fn name(&self) -> &str {
        "system"
    }

    async fn poll(&self) -> Result<Vec<Metric>> {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_cpu_usage();

        let cpus = system.cpus();
        let mut metrics = Vec::with_capacity(4 + cpus.len());
        metrics.push(Metric::gauge("TotalMemory", bytes(system.total_memory())));
        metrics.push(Metric::gauge("FreeMemory", bytes(system.free_memory())));
        metrics.push(Metric::gauge("AvailableMemory", bytes(system.available_memory())));
        metrics.push(Metric::gauge("UsedMemory", bytes(system.used_memory())));

        for (index, cpu) in cpus.iter().enumerate() {
            metrics.push(Metric::gauge(
                format!("CPUutilization{}", index + 1),
                f64::from(cpu.cpu_usage()),
            ));
        }

        Ok(metrics)
    }
}
