//! Host resource snapshot for the performance panel.

use serde::Serialize;
use sysinfo::System;
use tracing::debug;

/// CPU and memory utilization of the machine running the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HostMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl HostMetrics {
    /// Memory percentage from used/total bytes
    pub fn memory_ratio(used: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        }
    }

    /// Take a snapshot.
    ///
    /// CPU usage needs two refreshes apart, so this waits for sysinfo's
    /// minimum update interval.
    pub async fn sample() -> Option<Self> {
        let mut system = System::new();
        system.refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        system.refresh_cpu_usage();
        system.refresh_memory();

        if system.total_memory() == 0 {
            debug!("sysinfo reported no memory, host metrics unavailable");
            return None;
        }

        let metrics = Self {
            cpu_percent: f64::from(system.global_cpu_usage()),
            memory_percent: Self::memory_ratio(system.used_memory(), system.total_memory()),
        };
        debug!("Host metrics: {:?}", metrics);
        Some(metrics)
    }
}
