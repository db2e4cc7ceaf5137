use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::external::{discover, ExternalCollector};
use crate::host::HostStats;
use crate::sources::{spawn_scrape_loop, Cpu, Disk, Load, Memory, MetricSource, Net, Process};

/// Every active source of the agent and the single point where their
/// snapshots are aggregated.
///
/// Sources are scheduled as they are registered. Dropping the registry stops
/// every scrape loop.
pub struct Registry {
    runtime: Handle,
    sources: Vec<Arc<dyn MetricSource>>,
    tasks: Vec<JoinHandle<()>>,
    collect: Mutex<()>,
    cancel: CancellationToken,
}

impl Registry {
    /// Empty registry scheduling on the current tokio runtime.
    pub fn new() -> Result<Self, AgentError> {
        Ok(Self::with_runtime(Handle::try_current()?))
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        Registry {
            runtime,
            sources: Vec::new(),
            tasks: Vec::new(),
            collect: Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    /// Builds the built-in sources and the external collectors found on disk,
    /// in exposition order.
    pub fn from_config(
        config: &AgentConfig,
        provider: Arc<dyn HostStats>,
    ) -> Result<Self, AgentError> {
        let mut registry = Self::new()?;
        let format = Arc::new(config.series_format());
        let period = config.period();

        registry.register(
            Arc::new(Cpu::new(
                config.cpu,
                &config.cpu_modules,
                Arc::clone(&provider),
                Arc::clone(&format),
            )),
            period,
        );
        registry.register(
            Arc::new(Memory::new(config.mem, Arc::clone(&provider), Arc::clone(&format))),
            period,
        );
        registry.register(
            Arc::new(Load::new(config.load, Arc::clone(&provider), Arc::clone(&format))),
            period,
        );
        registry.register(
            Arc::new(Net::new(
                config.net,
                period,
                config.net_filter()?,
                Arc::clone(&provider),
                Arc::clone(&format),
            )),
            period,
        );
        registry.register(
            Arc::new(Disk::new(
                config.disk,
                period,
                config.disk_filter()?,
                Arc::clone(&provider),
                Arc::clone(&format),
            )),
            period,
        );
        registry.register(
            Arc::new(Process::new(
                config.process,
                config.process_opts.whitelist.clone(),
                provider,
                Arc::clone(&format),
            )),
            period,
        );

        info!(
            "external collectors will be loaded from: '{}'",
            config.collectors.display()
        );
        for entry in discover(&config.collectors, period) {
            let collector =
                ExternalCollector::new(entry.path, config.keep(), config.keep_metrics, &format);
            registry.register(Arc::new(collector), entry.period);
        }

        info!(
            "{} sources registered, {} scheduled",
            registry.sources.len(),
            registry.tasks.len()
        );
        Ok(registry)
    }

    /// Adds `source` to the aggregation and starts its scrape loop unless it
    /// is disabled.
    pub fn register(&mut self, source: Arc<dyn MetricSource>, period: Duration) {
        debug!("registering {} source", source.name());
        if let Some(task) = spawn_scrape_loop(
            &self.runtime,
            Arc::clone(&source),
            period,
            self.cancel.child_token(),
        ) {
            self.tasks.push(task);
        }
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Concatenated snapshots of every source in registration order.
    ///
    /// Commits external collector output, so concurrent callers are
    /// serialized and each exposure cycle should call it once.
    pub async fn metrics(&self) -> Vec<u8> {
        let _guard = self.collect.lock().await;
        let mut out = Vec::new();
        for source in &self.sources {
            out.extend(source.metrics().await);
        }
        out
    }

    /// Token cancelled when the registry shuts down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops every scrape loop. Published snapshots stay readable.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            debug!("stopping {} scrape loops", self.tasks.len());
            self.cancel.cancel();
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
