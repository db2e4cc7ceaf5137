use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use tokio::sync::Mutex;

use crate::error::ScrapeError;
use crate::host::{self, CpuTimes, HostStats, SensorReading};
use crate::series::{DataPoint, SeriesFormat};

use super::{now_micros, MetricSource, PublishBuffer};

const CLASS: &str = "os.cpu";
const STATES: [&str; 5] = ["user", "system", "nice", "iowait", "irq"];

lazy_static! {
    static ref PACKAGE_SENSOR: Regex = Regex::new(r"(?i)package id (\d+)").unwrap();
    static ref CORE_SENSOR: Regex = Regex::new(r"(?i)\bcore (\d+)").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuModule {
    Temperature,
}

impl CpuModule {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "temperature" => Some(CpuModule::Temperature),
            _ => None,
        }
    }
}

/// Share of elapsed time spent in each state between two samples of one core.
#[derive(Debug, Default, Clone, Copy)]
struct Shares {
    idle: f64,
    user: f64,
    system: f64,
    nice: f64,
    iowait: f64,
    irq: f64,
}

impl Shares {
    fn between(previous: &CpuTimes, current: &CpuTimes) -> Self {
        let elapsed = current.total() - previous.total();
        if elapsed <= 0.0 {
            return Shares::default();
        }
        Shares {
            idle: (current.idle - previous.idle) / elapsed,
            user: (current.user - previous.user) / elapsed,
            system: (current.system - previous.system) / elapsed,
            nice: (current.nice - previous.nice) / elapsed,
            iowait: (current.iowait - previous.iowait) / elapsed,
            irq: (current.irq - previous.irq) / elapsed,
        }
    }

    /// Values in [`STATES`] order.
    fn values(&self) -> [f64; 5] {
        [self.user, self.system, self.nice, self.iowait, self.irq]
    }
}

/// CPU usage from time-in-state deltas.
///
/// Level 1 publishes overall busy percent, level 2 adds the per-state
/// breakdown averaged over cores, level 3 repeats the breakdown per core.
pub struct Cpu {
    level: u8,
    modules: Vec<CpuModule>,
    provider: Arc<dyn HostStats>,
    format: Arc<SeriesFormat>,
    previous: Mutex<Option<Vec<CpuTimes>>>,
    buffer: PublishBuffer,
}

impl Cpu {
    pub fn new(
        level: u8,
        modules: &[String],
        provider: Arc<dyn HostStats>,
        format: Arc<SeriesFormat>,
    ) -> Self {
        let modules = modules
            .iter()
            .filter_map(|name| {
                let module = CpuModule::from_name(name);
                if module.is_none() {
                    warn!("[cpu] module '{}' not found", name);
                }
                module
            })
            .collect();

        Cpu {
            level,
            modules,
            provider,
            format,
            previous: Mutex::new(None),
            buffer: PublishBuffer::new(),
        }
    }

    async fn collect(&self) -> Result<(), ScrapeError> {
        let times = host::sample(&self.provider, |p| p.cpu_times()).await?;
        let temperatures = if self.modules.contains(&CpuModule::Temperature) {
            Some(host::sample(&self.provider, |p| p.temperatures()).await?)
        } else {
            None
        };

        let mut previous = self.previous.lock().await;
        let Some(last) = previous.replace(times.clone()) else {
            return Ok(());
        };

        let lines = self.render(&last, &times, temperatures.as_deref(), now_micros());
        self.buffer.publish(lines).await;
        Ok(())
    }

    fn render(
        &self,
        previous: &[CpuTimes],
        current: &[CpuTimes],
        temperatures: Option<&[SensorReading]>,
        now: i64,
    ) -> Vec<u8> {
        let shares: Vec<Shares> = previous
            .iter()
            .zip(current)
            .map(|(p, c)| Shares::between(p, c))
            .collect();
        let mut out = Vec::new();
        if shares.is_empty() {
            return out;
        }
        let cores = shares.len() as f64;

        let idle = shares.iter().map(|s| s.idle).sum::<f64>() / cores;
        self.format
            .write_point(&mut out, &DataPoint::new(CLASS, now, (1.0 - idle) * 100.0));

        if self.level >= 2 {
            for (idx, state) in STATES.iter().enumerate() {
                let mean = shares.iter().map(|s| s.values()[idx]).sum::<f64>() / cores;
                let class = format!("{}.{}", CLASS, state);
                self.format
                    .write_point(&mut out, &DataPoint::new(class, now, mean * 100.0));
            }
        }

        if self.level >= 3 {
            for (core, share) in shares.iter().enumerate() {
                for (state, value) in STATES.iter().zip(share.values()) {
                    let point = DataPoint::new(format!("{}.{}", CLASS, state), now, value * 100.0)
                        .label("core", core);
                    self.format.write_point(&mut out, &point);
                }
            }
        }

        if let Some(readings) = temperatures {
            self.render_temperatures(&mut out, readings, now);
        }

        out
    }

    fn render_temperatures(&self, out: &mut Vec<u8>, readings: &[SensorReading], now: i64) {
        let class = format!("{}.temperature", CLASS);
        for reading in readings {
            if let Some(caps) = PACKAGE_SENSOR.captures(&reading.label) {
                let point = DataPoint::new(class.as_str(), now, reading.celsius).label("id", &caps[1]);
                self.format.write_point(out, &point);
            } else if self.level >= 2 {
                if let Some(caps) = CORE_SENSOR.captures(&reading.label) {
                    let point =
                        DataPoint::new(class.as_str(), now, reading.celsius).label("core", &caps[1]);
                    self.format.write_point(out, &point);
                }
            }
        }
    }
}

impl MetricSource for Cpu {
    fn name(&self) -> &str {
        "cpu"
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
