//! Statistics of the agent's own process.

use super::{bytes, Poller};
use crate::core::{Metric, PromLightError, Result};
use parking_lot::Mutex;
use rand::Rng;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Samples memory, CPU and I/O of the running process.
///
/// Also emits `RandomValue` and a `PollCount` counter delta of one, so the
/// server can tell how many polls the agent performed.
pub struct ProcessPoller {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ProcessPoller {
    /// Poller bound to the current process. Process stats are skipped if the pid is unavailable.
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Cannot determine own pid, process stats disabled: {}", e);
                None
            },
        };

        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for ProcessPoller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Poller for ProcessPoller {
    fn name(&self) -> &str {
        "process"
    }

    async fn poll(&self) -> Result<Vec<Metric>> {
        let pid = self
            .pid
            .ok_or_else(|| PromLightError::invalid_value("own process id is unknown"))?;

        let mut metrics = Vec::with_capacity(8);
        {
            let mut system = self.system.lock();
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            let process = system
                .process(pid)
                .ok_or_else(|| PromLightError::invalid_value(format!("process {} not found", pid)))?;

            let disk = process.disk_usage();
            metrics.push(Metric::gauge("ResidentMemory", bytes(process.memory())));
            metrics.push(Metric::gauge("VirtualMemory", bytes(process.virtual_memory())));
            metrics.push(Metric::gauge("ProcessCpuUsage", f64::from(process.cpu_usage())));
            metrics.push(Metric::gauge("ProcessRunTime", bytes(process.run_time())));
            metrics.push(Metric::gauge("DiskReadBytes", bytes(disk.total_read_bytes)));
            metrics.push(Metric::gauge("DiskWrittenBytes", bytes(disk.total_written_bytes)));
        }

        let random: u32 = rand::thread_rng().gen_range(0..100);
        metrics.push(Metric::gauge("RandomValue", f64::from(random)));
        metrics.push(Metric::counter("PollCount", 1));

        Ok(metrics)
    }
}
