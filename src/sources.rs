//! Metric sources.
//!
//! Every source owns one [`PublishBuffer`] and is driven by its own scrape
//! loop (see [`spawn_scrape_loop`]). Provider-backed sources overwrite their
//! buffer on each scrape and read it without side effects.

mod buffer;
mod cpu;
mod disk;
mod filter;
mod load;
mod memory;
mod net;
mod process;
mod scheduler;


use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;

use crate::error::ScrapeError;

pub use buffer::PublishBuffer;
pub use cpu::{Cpu, CpuModule};
pub use disk::Disk;
pub use filter::NameFilter;
pub use load::Load;
pub use memory::Memory;
pub use net::Net;
pub use process::Process;
pub use scheduler::spawn_scrape_loop;

/// Anything that produces a serialized snapshot on demand.
pub trait MetricSource: Send + Sync {
    fn name(&self) -> &str;

    /// Verbosity level. Zero disables the source: it is never scheduled and
    /// always reports an empty snapshot.
    fn level(&self) -> u8;

    /// Runs one sampling cycle and publishes the result.
    fn scrape(&self) -> BoxFuture<'_, Result<(), ScrapeError>>;

    /// Returns the current snapshot.
    fn metrics(&self) -> BoxFuture<'_, Vec<u8>>;
}

/// Current time in microseconds since the epoch.
pub(crate) fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// Per-second rate of a cumulative counter over one period. Counter resets
/// yield zero rather than a negative rate.
pub(crate) fn rate(current: u64, previous: u64, period: Duration) -> f64 {
    let seconds = period.as_secs_f64();
    if seconds <= 0.0 {
        return 0.0;
    }
    current.saturating_sub(previous) as f64 / seconds
}
