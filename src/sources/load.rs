use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::ScrapeError;
use crate::host::{self, HostStats};
use crate::series::{DataPoint, SeriesFormat};

use super::{now_micros, MetricSource, PublishBuffer};

/// Load averages. Level 1 is the 1 minute average, level 2 adds 5 and 15.
pub struct Load {
    level: u8,
    provider: Arc<dyn HostStats>,
    format: Arc<SeriesFormat>,
    buffer: PublishBuffer,
}

impl Load {
    pub fn new(level: u8, provider: Arc<dyn HostStats>, format: Arc<SeriesFormat>) -> Self {
        Load {
            level,
            provider,
            format,
            buffer: PublishBuffer::new(),
        }
    }

    async fn collect(&self) -> Result<(), ScrapeError> {
        let load = host::sample(&self.provider, |p| p.load_average()).await?;
        let now = now_micros();

        let mut out = Vec::new();
        self.format
            .write_point(&mut out, &DataPoint::new("os.load1", now, load.one));
        if self.level > 1 {
            self.format
                .write_point(&mut out, &DataPoint::new("os.load5", now, load.five));
            self.format
                .write_point(&mut out, &DataPoint::new("os.load15", now, load.fifteen));
        }

        self.buffer.publish(out).await;
        Ok(())
    }
}

impl MetricSource for Load {
    fn name(&self) -> &str {
        "load"
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
