use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;
use sysinfo::{Components, Disks, Networks, System};

use crate::error::ProviderError;

use super::procfs::{self, parse_diskstats, parse_net_dev, parse_stat};
use super::{
    CpuTimes, DiskIo, DiskUsage, HostStats, LoadAverage, MemoryUsage, NetIo, ProcessEntry,
    SensorReading,
};

/// Provider backed by `sysinfo`, with `/proc` parsers for the counters
/// `sysinfo` does not expose (CPU time-in-state, block device I/O).
pub struct SystemHost {
    system: Mutex<System>,
    proc_root: PathBuf,
}

impl SystemHost {
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Reads `/proc` files from another root. Used for containers that mount
    /// the host's procfs elsewhere.
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        SystemHost {
            system: Mutex::new(System::new()),
            proc_root: proc_root.into(),
        }
    }

    fn proc_file(&self, name: &str) -> PathBuf {
        self.proc_root.join(name)
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostStats for SystemHost {
    fn cpu_times(&self) -> Result<Vec<CpuTimes>, ProviderError> {
        if !cfg!(target_os = "linux") {
            return Err(ProviderError::Unsupported("cpu time-in-state"));
        }
        let cores = parse_stat(&procfs::read(&self.proc_file("stat"))?);
        if cores.is_empty() {
            return Err(ProviderError::Empty("cpu times"));
        }
        Ok(cores)
    }

    fn temperatures(&self) -> Result<Vec<SensorReading>, ProviderError> {
        let components = Components::new_with_refreshed_list();
        Ok(components
            .list()
            .iter()
            .map(|component| SensorReading {
                label: component.label().to_string(),
                celsius: component.temperature(),
            })
            .collect())
    }

    fn memory(&self) -> Result<MemoryUsage, ProviderError> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| ProviderError::Join("system handle poisoned".to_string()))?;
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return Err(ProviderError::Empty("memory"));
        }
        Ok(MemoryUsage {
            total,
            used: system.used_memory(),
            swap_total: system.total_swap(),
            swap_used: system.used_swap(),
        })
    }

    fn load_average(&self) -> Result<LoadAverage, ProviderError> {
        let load = System::load_average();
        Ok(LoadAverage {
            one: load.one,
            five: load.five,
            fifteen: load.fifteen,
        })
    }

    fn disk_usage(&self) -> Result<Vec<DiskUsage>, ProviderError> {
        let disks = Disks::new_with_refreshed_list();
        let mut seen = HashSet::new();
        let mut usages = Vec::new();

        for disk in disks.list() {
            let device = disk.name().to_string_lossy().to_string();
            if !seen.insert(device.clone()) {
                continue;
            }
            let total = disk.total_space();
            let mount_point = disk.mount_point();
            let (inodes_total, inodes_used) = inode_usage(mount_point).unwrap_or((0, 0));

            usages.push(DiskUsage {
                device,
                mount_point: mount_point.to_string_lossy().to_string(),
                total,
                used: total.saturating_sub(disk.available_space()),
                inodes_total,
                inodes_used,
            });
        }

        Ok(usages)
    }

    fn disk_io(&self) -> Result<Vec<DiskIo>, ProviderError> {
        if !cfg!(target_os = "linux") {
            return Err(ProviderError::Unsupported("disk i/o counters"));
        }
        Ok(parse_diskstats(&procfs::read(&self.proc_file("diskstats"))?))
    }

    fn network_io(&self) -> Result<Vec<NetIo>, ProviderError> {
        if cfg!(target_os = "linux") {
            return Ok(parse_net_dev(&procfs::read(&self.proc_file("net/dev"))?));
        }

        let networks = Networks::new_with_refreshed_list();
        Ok(networks
            .list()
            .iter()
            .map(|(name, data)| NetIo {
                name: name.clone(),
                bytes_recv: data.total_received(),
                bytes_sent: data.total_transmitted(),
                packets_recv: data.total_packets_received(),
                packets_sent: data.total_packets_transmitted(),
                errors_in: data.total_errors_on_received(),
                errors_out: data.total_errors_on_transmitted(),
                drop_in: 0,
                drop_out: 0,
            })
            .collect())
    }

    fn processes(&self) -> Result<Vec<ProcessEntry>, ProviderError> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| ProviderError::Join("system handle poisoned".to_string()))?;
        system.refresh_processes();

        let entries: Vec<ProcessEntry> = system
            .processes()
            .values()
            .map(|process| ProcessEntry {
                name: process.name().to_string(),
                exe: process.exe().map(Path::to_path_buf),
            })
            .collect();
        debug!("process list refreshed: {} entries", entries.len());
        Ok(entries)
    }
}

#[cfg(unix)]
fn inode_usage(mount_point: &Path) -> Option<(u64, u64)> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let path = CString::new(mount_point.as_os_str().as_bytes()).ok()?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    let result = unsafe { libc::statvfs(path.as_ptr(), stat.as_mut_ptr()) };
    if result != 0 {
        return None;
    }
    let stat = unsafe { stat.assume_init() };

    #[allow(clippy::unnecessary_cast)]
    let (total, free) = (stat.f_files as u64, stat.f_ffree as u64);
    Some((total, total.saturating_sub(free)))
}

#[cfg(not(unix))]
fn inode_usage(_: &Path) -> Option<(u64, u64)> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(target_os = "linux")]
    #[test]
    fn reads_counters_from_custom_proc_root() {
        let root = TempDir::new().unwrap();
        fs::write(
            root.path().join("stat"),
            "cpu  2 0 2 8 0 0 0 0\ncpu0 1 0 1 4 0 0 0 0\ncpu1 1 0 1 4 0 0 0 0\n",
        )
        .unwrap();
        fs::write(
            root.path().join("diskstats"),
            "   8       0 sda 1 0 8 1 1 0 8 1 0 2 2\n",
        )
        .unwrap();
        fs::create_dir_all(root.path().join("net")).unwrap();
        fs::write(
            root.path().join("net/dev"),
            "lo: 1 1 0 0 0 0 0 0 1 1 0 0 0 0 0 0\n",
        )
        .unwrap();

        let host = SystemHost::with_proc_root(root.path());
        assert_eq!(host.cpu_times().unwrap().len(), 2);
        assert_eq!(host.disk_io().unwrap()[0].read_bytes, 4096);
        assert_eq!(host.network_io().unwrap()[0].name, "lo");
    }

    #[test]
    fn missing_proc_file_is_a_read_error() {
        let root = TempDir::new().unwrap();
        let host = SystemHost::with_proc_root(root.path());
        assert!(host.cpu_times().is_err());
        assert!(host.disk_io().is_err());
    }
}
