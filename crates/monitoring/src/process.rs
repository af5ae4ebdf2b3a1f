//! Process identity and resource sampling.

use sysinfo::Networks;
use sysinfo::Pid;
use sysinfo::System;

use crate::metric::Metric;

/// Whether this platform exposes the process statistics the sampler reads.
pub fn is_supported() -> bool {
    sysinfo::IS_SUPPORTED_SYSTEM
}

/// Identity of the hosting process, used for the default backend tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDetails {
    pub hostname: String,
    pub process_name: String,
    pub pid: u32,
}

impl ProcessDetails {
    pub fn current() -> Self {
        let hostname = System::host_name().unwrap_or_else(|| {
            tracing::warn!("could not determine hostname");
            "unknown".to_string()
        });
        let process_name = std::env::current_exe()
            .ok()
            .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            hostname,
            process_name,
            pid: std::process::id(),
        }
    }
}

/// Produces snapshots of process and network statistics.
///
/// Every call is a fresh snapshot; nothing is streamed.
pub trait ResourceSampler: Send {
    /// Memory usage, CPU percentage and elapsed time of this process.
    fn process_metrics(&mut self) -> Vec<Metric>;

    /// Bytes received and transmitted, one pair per network interface.
    fn network_metrics(&mut self) -> Vec<Metric>;
}

pub struct SysinfoSampler {
    system: System,
    networks: Networks,
    pid: Pid,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            networks: Networks::new_with_refreshed_list(),
            pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SysinfoSampler {
    fn process_metrics(&mut self) -> Vec<Metric> {
        self.system.refresh_memory();
        if !self.system.refresh_process(self.pid) {
            tracing::warn!(pid = %self.pid, "process statistics unavailable");
            return Vec::new();
        }
        let Some(process) = self.system.process(self.pid) else {
            return Vec::new();
        };

        let total_memory = self.system.total_memory();
        let memory_percentage = if total_memory > 0 {
            process.memory() as f64 * 100.0 / total_memory as f64
        } else {
            0.0
        };

        vec![
            Metric::new(memory_percentage, "pmem"),
            Metric::new(f64::from(process.cpu_usage()), "pcpu"),
            Metric::new(process.run_time(), "etime"),
        ]
    }

    fn network_metrics(&mut self) -> Vec<Metric> {
        self.networks.refresh();

        let mut interfaces: Vec<_> = self.networks.iter().collect();
        interfaces.sort_by(|a, b| a.0.cmp(b.0));

        let mut metrics = Vec::with_capacity(interfaces.len() * 2);
        for (interface, data) in interfaces {
            metrics.push(
                Metric::new(data.total_received(), "bytesReceived")
                    .with_tag("interface", interface.as_str()),
            );
            metrics.push(
                Metric::new(data.total_transmitted(), "bytesTransmitted")
                    .with_tag("interface", interface.as_str()),
            );
        }
        metrics
    }
}
