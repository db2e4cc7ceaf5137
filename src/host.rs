//! Host statistics provider.
//!
//! Metric sources never talk to the OS directly; they go through
//! [`HostStats`], which hands back raw counters. [`SystemHost`] is the real
//! provider, tests substitute their own.

mod procfs;
mod system;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task;

use crate::error::ProviderError;

pub use procfs::{parse_diskstats, parse_net_dev, parse_stat};
pub use system::SystemHost;

/// Cumulative time spent in each state, in clock ticks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuTimes {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
}

impl CpuTimes {
    pub fn total(&self) -> f64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub label: String,
    pub celsius: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryUsage {
    pub total: u64,
    pub used: u64,
    pub swap_total: u64,
    pub swap_used: u64,
}

impl MemoryUsage {
    pub fn used_percent(&self) -> f64 {
        percent(self.used, self.total)
    }

    pub fn swap_used_percent(&self) -> f64 {
        percent(self.swap_used, self.swap_total)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Space usage of one mounted block device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskUsage {
    pub device: String,
    pub mount_point: String,
    pub total: u64,
    pub used: u64,
    pub inodes_total: u64,
    pub inodes_used: u64,
}

impl DiskUsage {
    pub fn used_percent(&self) -> f64 {
        percent(self.used, self.total)
    }
}

/// Cumulative I/O counters of one block device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskIo {
    pub name: String,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_count: u64,
    pub write_count: u64,
    pub read_time_ms: u64,
    pub write_time_ms: u64,
    pub in_progress: u64,
    pub io_time_ms: u64,
    pub weighted_io_ms: u64,
}

/// Cumulative counters of one network interface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetIo {
    pub name: String,
    pub bytes_recv: u64,
    pub bytes_sent: u64,
    pub packets_recv: u64,
    pub packets_sent: u64,
    pub errors_in: u64,
    pub errors_out: u64,
    pub drop_in: u64,
    pub drop_out: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessEntry {
    pub name: String,
    pub exe: Option<PathBuf>,
}

/// Raw OS counters on demand. Calls may block.
pub trait HostStats: Send + Sync {
    /// One entry per core, in core order.
    fn cpu_times(&self) -> Result<Vec<CpuTimes>, ProviderError>;
    fn temperatures(&self) -> Result<Vec<SensorReading>, ProviderError>;
    fn memory(&self) -> Result<MemoryUsage, ProviderError>;
    fn load_average(&self) -> Result<LoadAverage, ProviderError>;
    fn disk_usage(&self) -> Result<Vec<DiskUsage>, ProviderError>;
    fn disk_io(&self) -> Result<Vec<DiskIo>, ProviderError>;
    fn network_io(&self) -> Result<Vec<NetIo>, ProviderError>;
    fn processes(&self) -> Result<Vec<ProcessEntry>, ProviderError>;
}

/// Runs a provider call on the blocking pool.
pub async fn sample<T, F>(provider: &Arc<dyn HostStats>, call: F) -> Result<T, ProviderError>
where
    T: Send + 'static,
    F: FnOnce(&dyn HostStats) -> Result<T, ProviderError> + Send + 'static,
{
    let provider = Arc::clone(provider);
    task::spawn_blocking(move || call(provider.as_ref()))
        .await
        .map_err(|err| ProviderError::Join(err.to_string()))?
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
