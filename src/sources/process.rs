use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::debug;

use crate::error::ScrapeError;
use crate::host::{self, HostStats, ProcessEntry};
use crate::series::{DataPoint, SeriesFormat};

use super::{now_micros, MetricSource, PublishBuffer};

/// Publishes `os.process.up{name=..}` for every watched process name.
pub struct Process {
    level: u8,
    watch: Vec<String>,
    provider: Arc<dyn HostStats>,
    format: Arc<SeriesFormat>,
    buffer: PublishBuffer,
}

impl Process {
    pub fn new(
        level: u8,
        watch: Vec<String>,
        provider: Arc<dyn HostStats>,
        format: Arc<SeriesFormat>,
    ) -> Self {
        debug!("process watch list: {:?}", watch);
        Process {
            level,
            watch,
            provider,
            format,
            buffer: PublishBuffer::new(),
        }
    }

    async fn collect(&self) -> Result<(), ScrapeError> {
        let processes = host::sample(&self.provider, |p| p.processes()).await?;
        let now = now_micros();

        let mut out = Vec::new();
        for name in &self.watch {
            let up = processes.iter().any(|process| runs(process, name));
            let point = DataPoint::new("os.process.up", now, up).label("name", name);
            self.format.write_point(&mut out, &point);
        }

        self.buffer.publish(out).await;
        Ok(())
    }
}

fn runs(process: &ProcessEntry, name: &str) -> bool {
    match &process.exe {
        Some(exe) => exe.to_string_lossy().contains(name),
        None => process.name.contains(name),
    }
}

impl MetricSource for Process {
    fn name(&self) -> &str {
        "process"
    }

    /// An empty watch list disables the source like level 0 does.
    fn level(&self) -> u8 {
        if self.watch.is_empty() {
            0
        } else {
            self.level
        }
    }

    fn scrape(&self) -> BoxFuture<'_, Result<(), ScrapeError>> {
        self.collect().boxed()
    }

    fn metrics(&self) -> BoxFuture<'_, Vec<u8>> {
        self.buffer.snapshot().boxed()
    }
}
