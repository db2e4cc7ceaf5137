//! Parsers for the Linux `/proc` files the provider reads.

use std::fs;
use std::path::Path;

use crate::error::ProviderError;

use super::{CpuTimes, DiskIo, NetIo};

const SECTOR_SIZE: u64 = 512;

pub(super) fn read(path: &Path) -> Result<String, ProviderError> {
    fs::read_to_string(path).map_err(|source| ProviderError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Per-core times from `/proc/stat`. The aggregate `cpu` line is skipped.
pub fn parse_stat(content: &str) -> Vec<CpuTimes> {
    let mut cores = Vec::new();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let Some(label) = parts.next() else {
            continue;
        };
        if label == "cpu" || !label.starts_with("cpu") {
            continue;
        }

        let values: Vec<f64> = parts.filter_map(|s| s.parse().ok()).collect();
        if values.len() < 4 {
            continue;
        }
        let get_val = |idx: usize| -> f64 { values.get(idx).copied().unwrap_or(0.0) };

        cores.push(CpuTimes {
            user: get_val(0),
            nice: get_val(1),
            system: get_val(2),
            idle: get_val(3),
            iowait: get_val(4),
            irq: get_val(5),
            softirq: get_val(6),
            steal: get_val(7),
        });
    }

    cores
}

/// Block device counters from `/proc/diskstats`.
pub fn parse_diskstats(content: &str) -> Vec<DiskIo> {
    let mut disks = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue;
        }

        let get_val =
            |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

        disks.push(DiskIo {
            name: parts[2].to_string(),
            read_count: get_val(3),
            read_bytes: get_val(5).saturating_mul(SECTOR_SIZE),
            read_time_ms: get_val(6),
            write_count: get_val(7),
            write_bytes: get_val(9).saturating_mul(SECTOR_SIZE),
            write_time_ms: get_val(10),
            in_progress: get_val(11),
            io_time_ms: get_val(12),
            weighted_io_ms: get_val(13),
        });
    }

    disks
}

/// Interface counters from `/proc/net/dev`.
pub fn parse_net_dev(content: &str) -> Vec<NetIo> {
    let mut devices = Vec::new();

    for line in content.lines() {
        if line.contains('|') || line.trim().is_empty() {
            continue;
        }

        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let values: Vec<&str> = rest.split_whitespace().collect();
        if values.len() < 16 {
            continue;
        }

        let get_val =
            |idx: usize| -> u64 { values.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

        devices.push(NetIo {
            name: name.trim().to_string(),
            bytes_recv: get_val(0),
            packets_recv: get_val(1),
            errors_in: get_val(2),
            drop_in: get_val(3),
            bytes_sent: get_val(8),
            packets_sent: get_val(9),
            errors_out: get_val(10),
            drop_out: get_val(11),
        });
    }

    devices
}
