use std::sync::Arc;
use std::time::Duration;

use log::{debug, error};
use tokio::runtime::Handle;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::MetricSource;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Starts the periodic scrape task of `source`. Disabled sources get no task.
///
/// The first scrape happens one period after the call. A failed scrape is
/// logged and leaves the published snapshot untouched; the next tick runs on
/// schedule regardless. Ticks missed while a scrape is running are skipped.
pub fn spawn_scrape_loop(
    runtime: &Handle,
    source: Arc<dyn MetricSource>,
    period: Duration,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    if source.level() == 0 {
        debug!("{} collector disabled", source.name());
        return None;
    }
    Some(runtime.spawn(run(source, period.max(MIN_PERIOD), cancel)))
}

async fn run(source: Arc<dyn MetricSource>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(
        "{} collector scheduled every {}ms",
        source.name(),
        period.as_millis()
    );

    loop {
        select! {
            _ = cancel.cancelled() => {
                break;
            }
            _ = ticker.tick() => {
                select! {
                    _ = cancel.cancelled() => {
                        break;
                    }
                    result = source.scrape() => {
                        if let Err(err) = result {
                            error!("{} scrape failed: {}", source.name(), err);
                        }
                    }
                }
            }
        }
    }

    debug!("{} collector stopped", source.name());
}
