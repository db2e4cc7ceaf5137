use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Mutex;

use crate::error::ScrapeError;
use crate::host::{self, HostStats, NetIo};
use crate::series::{DataPoint, SeriesFormat};

use super::{now_micros, rate, MetricSource, NameFilter, PublishBuffer};

const LOOPBACK: &str = "lo";

/// Network throughput rates. Level 1 is the host-wide byte rate, level 2
/// breaks it down per interface, level 3 adds packets, errors and drops.
pub struct Net {
    level: u8,
    period: Duration,
    filter: NameFilter,
    provider: Arc<dyn HostStats>,
    format: Arc<SeriesFormat>,
    previous: Mutex<Option<Vec<NetIo>>>,
    buffer: PublishBuffer,
}

impl Net {
    pub fn new(
        level: u8,
        period: Duration,
        filter: NameFilter,
        provider: Arc<dyn HostStats>,
        format: Arc<SeriesFormat>,
    ) -> Self {
        Net {
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
        let counters = host::sample(&self.provider, |p| p.network_io()).await?;

        let mut previous = self.previous.lock().await;
        let Some(last) = previous.replace(counters.clone()) else {
            return Ok(());
        };

        let lines = self.render(&last, &counters, now_micros());
        self.buffer.publish(lines).await;
        Ok(())
    }

    fn render(&self, previous: &[NetIo], current: &[NetIo], now: i64) -> Vec<u8> {
        let previous: HashMap<&str, &NetIo> =
            previous.iter().map(|n| (n.name.as_str(), n)).collect();
        let pairs: Vec<(&NetIo, &NetIo)> = current
            .iter()
            .filter(|n| n.name != LOOPBACK && self.filter.allows(&n.name))
            .filter_map(|n| previous.get(n.name.as_str()).map(|last| (n, *last)))
            .collect();

        let mut out = Vec::new();
        let bytes_in: f64 = pairs
            .iter()
            .map(|(n, last)| rate(n.bytes_recv, last.bytes_recv, self.period))
            .sum();
        let bytes_out: f64 = pairs
            .iter()
            .map(|(n, last)| rate(n.bytes_sent, last.bytes_sent, self.period))
            .sum();
        for (direction, value) in [("in", bytes_in), ("out", bytes_out)] {
            let point = DataPoint::new("os.net.bytes", now, value).label("direction", direction);
            self.format.write_point(&mut out, &point);
        }

        if self.level > 1 {
            for (n, last) in &pairs {
                self.write_pair(
                    &mut out,
                    "os.net.bytes",
                    &n.name,
                    rate(n.bytes_recv, last.bytes_recv, self.period),
                    rate(n.bytes_sent, last.bytes_sent, self.period),
                    now,
                );
            }
        }

        if self.level > 2 {
            for (n, last) in &pairs {
                let series = [
                    (
                        "os.net.packets",
                        rate(n.packets_recv, last.packets_recv, self.period),
                        rate(n.packets_sent, last.packets_sent, self.period),
                    ),
                    (
                        "os.net.errs",
                        rate(n.errors_in, last.errors_in, self.period),
                        rate(n.errors_out, last.errors_out, self.period),
                    ),
                    (
                        "os.net.dropped",
                        rate(n.drop_in, last.drop_in, self.period),
                        rate(n.drop_out, last.drop_out, self.period),
                    ),
                ];
                for (class, inbound, outbound) in series {
                    self.write_pair(&mut out, class, &n.name, inbound, outbound, now);
                }
            }
        }

        out
    }

    fn write_pair(
        &self,
        out: &mut Vec<u8>,
        class: &str,
        iface: &str,
        inbound: f64,
        outbound: f64,
        now: i64,
    ) {
        for (direction, value) in [("in", inbound), ("out", outbound)] {
            let point = DataPoint::new(class, now, value)
                .label("iface", iface)
                .label("direction", direction);
            self.format.write_point(out, &point);
        }
    }
}

impl MetricSource for Net {
    fn name(&self) -> &str {
        "net"
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
