use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::ScrapeError;
use crate::host::{self, HostStats, MemoryUsage};
use crate::series::{DataPoint, SeriesFormat};

use super::{now_micros, MetricSource, PublishBuffer};

pub struct Memory {
    level: u8,
    provider: Arc<dyn HostStats>,
    format: Arc<SeriesFormat>,
    buffer: PublishBuffer,
}

impl Memory {
    pub fn new(level: u8, provider: Arc<dyn HostStats>, format: Arc<SeriesFormat>) -> Self {
        Memory {
            level,
            provider,
            format,
            buffer: PublishBuffer::new(),
        }
    }

    async fn collect(&self) -> Result<(), ScrapeError> {
        let usage = host::sample(&self.provider, |p| p.memory()).await?;
        self.buffer.publish(self.render(&usage, now_micros())).await;
        Ok(())
    }

    fn render(&self, usage: &MemoryUsage, now: i64) -> Vec<u8> {
        let mut points = vec![
            DataPoint::new("os.mem", now, usage.used_percent()),
            DataPoint::new("os.swap", now, usage.swap_used_percent()),
        ];
        if self.level > 1 {
            points.extend([
                DataPoint::new("os.mem.used", now, usage.used),
                DataPoint::new("os.mem.total", now, usage.total),
                DataPoint::new("os.swap.used", now, usage.swap_used),
                DataPoint::new("os.swap.total", now, usage.swap_total),
            ]);
        }

        let mut out = Vec::new();
        for point in &points {
            self.format.write_point(&mut out, point);
        }
        out
    }
}

impl MetricSource for Memory {
    fn name(&self) -> &str {
        "memory"
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
