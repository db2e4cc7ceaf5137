use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::debug;
use tokio::sync::Mutex;

use crate::error::ScrapeError;
use crate::host::{self, DiskIo, DiskUsage, HostStats};
use crate::series::{DataPoint, SeriesFormat};

use super::{now_micros, rate, MetricSource, NameFilter, PublishBuffer};

const CLASS: &str = "os.disk.fs";

/// Filesystem usage per device and, from level 3 on, block device I/O rates.
///
/// Levels: 1 used percent, 2 space and inode counts, 3 byte rates,
/// 4 operation rates, 5 time rates and queue depth.
pub struct Disk {
    level: u8,
    period: Duration,
    filter: NameFilter,
    provider: Arc<dyn HostStats>,
    format: Arc<SeriesFormat>,
    previous: Mutex<Option<Vec<DiskIo>>>,
    buffer: PublishBuffer,
}

impl Disk {
    pub fn new(
        level: u8,
        period: Duration,
        filter: NameFilter,
        provider: Arc<dyn HostStats>,
        format: Arc<SeriesFormat>,
    ) -> Self {
        Disk {
            level,
            period,
            filter,
            provider,
            format,
            previous: Mutex::new(None),
            buffer: PublishBuffer::new(),
        }
    }

    async fn collect(&self) -> Result<(), ScrapeError> {
        let usages = host::sample(&self.provider, |p| p.disk_usage()).await?;
        let counters = if self.level > 2 {
            Some(host::sample(&self.provider, |p| p.disk_io()).await?)
        } else {
            None
        };
        let now = now_micros();

        let mut out = Vec::new();
        self.render_usage(&mut out, &usages, now);

        if let Some(counters) = counters {
            let mut previous = self.previous.lock().await;
            if let Some(last) = previous.as_deref() {
                self.render_io(&mut out, last, &counters, now);
            }
            *previous = Some(counters);
        }

        self.buffer.publish(out).await;
        Ok(())
    }

    fn render_usage(&self, out: &mut Vec<u8>, usages: &[DiskUsage], now: i64) {
        for usage in usages {
            let name = Path::new(&usage.device)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| usage.device.clone());
            if !self.filter.allows(&name) {
                debug!("disk {} is not allowed, skip it", usage.device);
                continue;
            }

            let point = |class: String, value: u64| {
                DataPoint::new(class, now, value)
                    .label("disk", &usage.device)
                    .attribute("mount", &usage.mount_point)
            };

            let percent = DataPoint::new(CLASS, now, usage.used_percent())
                .label("disk", &usage.device)
                .attribute("mount", &usage.mount_point);
            self.format.write_point(out, &percent);

            if self.level > 1 {
                for (suffix, value) in [
                    ("used", usage.used),
                    ("total", usage.total),
                    ("inodes.used", usage.inodes_used),
                    ("inodes.total", usage.inodes_total),
                ] {
                    self.format
                        .write_point(out, &point(format!("{}.{}", CLASS, suffix), value));
                }
            }
        }
    }

    fn render_io(&self, out: &mut Vec<u8>, previous: &[DiskIo], current: &[DiskIo], now: i64) {
        let previous: HashMap<&str, &DiskIo> =
            previous.iter().map(|d| (d.name.as_str(), d)).collect();

        for io in current {
            if !self.filter.allows(&io.name) {
                debug!("disk name {} is not allowed, skip it", io.name);
                continue;
            }
            let Some(last) = previous.get(io.name.as_str()) else {
                continue;
            };

            let mut series = vec![
                ("bytes.read", rate(io.read_bytes, last.read_bytes, self.period)),
                ("bytes.write", rate(io.write_bytes, last.write_bytes, self.period)),
            ];
            if self.level > 3 {
                series.push(("io.read", rate(io.read_count, last.read_count, self.period)));
                series.push(("io.write", rate(io.write_count, last.write_count, self.period)));
            }
            if self.level > 4 {
                series.push(("io.read.ms", rate(io.read_time_ms, last.read_time_ms, self.period)));
                series.push((
                    "io.write.ms",
                    rate(io.write_time_ms, last.write_time_ms, self.period),
                ));
                series.push(("io", io.in_progress as f64));
                series.push(("io.ms", rate(io.io_time_ms, last.io_time_ms, self.period)));
                series.push((
                    "io.weighted.ms",
                    rate(io.weighted_io_ms, last.weighted_io_ms, self.period),
                ));
            }

            for (suffix, value) in series {
                let point =
                    DataPoint::new(format!("{}.{}", CLASS, suffix), now, value).label("name", &io.name);
                self.format.write_point(out, &point);
            }
        }
    }
}

impl MetricSource for Disk {
    fn name(&self) -> &str {
        "disk"
    }

    fn level(&self) -> u8 {
        self.level
    }

    fn scrape(&self) -> BoxFuture<'_, Result<(), ScrapeError>> {
        self.collect().boxed()
    }

    fn metrics(&self) -> BoxFuture<'_, Vec<u8>> {
        self.buffer.snapshot().boxed()
    }
}
