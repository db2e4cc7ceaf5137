//! Periodic dump of the aggregated metrics to disk.
//!
//! Each cycle writes `<prefix><unix seconds>.tmp` and renames it to
//! `<prefix><unix seconds>.metrics`, so readers never see a partial file.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info};
use tokio::fs;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::registry::Registry;

/// Writes one snapshot file and returns the final path.
pub async fn flush_once(registry: &Registry, prefix: &str) -> io::Result<PathBuf> {
    let base = format!("{}{}", prefix, Utc::now().timestamp());
    let tmp = PathBuf::from(format!("{}.tmp", base));
    let target = PathBuf::from(format!("{}.metrics", base));

    debug!("flush to file: {}", tmp.display());
    fs::write(&tmp, registry.metrics().await).await?;
    debug!("move to file: {}", target.display());
    fs::rename(&tmp, &target).await?;
    Ok(target)
}

/// Flushes every `period` until the registry shuts down. Failed cycles are
/// logged and the next one runs on schedule.
pub fn spawn_flush_loop(registry: Arc<Registry>, prefix: String, period: Duration) -> JoinHandle<()> {
    let cancel = registry.cancellation_token();
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("flush routine started");

        loop {
            select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = flush_once(&registry, &prefix).await {
                        error!("flush failed: {}", err);
                    }
                }
            }
        }

        debug!("flush routine stopped");
    })
}
