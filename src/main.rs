//! nodescrape - node-local telemetry agent.
//!
//! Samples host metrics and external collectors and exposes them over HTTP
//! and, optionally, as periodically flushed files.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};
use tokio::select;
use tokio::signal;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use nodescrape_lib::config::AgentConfig;
use nodescrape_lib::flush::spawn_flush_loop;
use nodescrape_lib::host::SystemHost;
use nodescrape_lib::registry::Registry;
use nodescrape_lib::server;

/// Node-local telemetry agent.
#[derive(Parser)]
#[command(name = "nodescrape", about = "Expose node stats as Sensision or Prometheus metrics", version)]
struct Args {
    /// Config file to use instead of the default search path.
    #[arg(long, env = "NODESCRAPE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, `none` to disable the HTTP endpoint.
    #[arg(short, long, env = "NODESCRAPE_LISTEN")]
    listen: Option<String>,

    /// Default collection period in milliseconds.
    #[arg(long, env = "NODESCRAPE_PERIOD")]
    period: Option<u64>,

    /// CPU metrics level.
    #[arg(long, env = "NODESCRAPE_CPU")]
    cpu: Option<u8>,

    /// Memory metrics level.
    #[arg(long, env = "NODESCRAPE_MEM")]
    mem: Option<u8>,

    /// Load metrics level.
    #[arg(long, env = "NODESCRAPE_LOAD")]
    load: Option<u8>,

    /// Disk metrics level.
    #[arg(long, env = "NODESCRAPE_DISK")]
    disk: Option<u8>,

    /// Network metrics level.
    #[arg(long, env = "NODESCRAPE_NET")]
    net: Option<u8>,

    /// Process presence level.
    #[arg(long, env = "NODESCRAPE_PROCESS")]
    process: Option<u8>,

    /// Optional CPU modules (`temperature`).
    #[arg(long = "cpu-mods", value_delimiter = ',')]
    cpu_modules: Vec<String>,

    /// Network interfaces to collect, `~` prefix for a regex.
    #[arg(long = "net-interfaces", value_delimiter = ',')]
    net_interfaces: Vec<String>,

    /// Disk names to collect, `~` prefix for a regex.
    #[arg(long = "disk-names", value_delimiter = ',')]
    disk_names: Vec<String>,

    /// Process names to watch.
    #[arg(long = "process-whitelist", value_delimiter = ',')]
    process_whitelist: Vec<String>,

    /// External collectors directory.
    #[arg(short, long, env = "NODESCRAPE_COLLECTORS")]
    collectors: Option<PathBuf>,

    /// Keep collectors data for the given number of fetches.
    #[arg(short, long, env = "NODESCRAPE_KEEP_FOR")]
    keep_for: Option<usize>,

    /// Expose every retained collector fetch instead of the newest only.
    #[arg(long)]
    keep_metrics: bool,

    /// Output format: sensision or prometheus.
    #[arg(long, env = "NODESCRAPE_FORMAT")]
    format: Option<String>,

    /// Class separator.
    #[arg(long, env = "NODESCRAPE_SEPARATOR")]
    separator: Option<String>,

    /// Default label added to every series, as key=value. Repeatable.
    #[arg(long = "label", value_parser = parse_label)]
    labels: Vec<(String, String)>,

    /// File prefix for periodic flushes.
    #[arg(long, env = "NODESCRAPE_FLUSH_PATH")]
    flush_path: Option<String>,

    /// Flush period in milliseconds.
    #[arg(long, env = "NODESCRAPE_FLUSH_PERIOD")]
    flush_period: Option<u64>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Command line values win over the config file.
    fn apply(&self, config: &mut AgentConfig) {
        override_with(&mut config.listen, &self.listen);
        override_with(&mut config.period, &self.period);
        override_with(&mut config.cpu, &self.cpu);
        override_with(&mut config.mem, &self.mem);
        override_with(&mut config.load, &self.load);
        override_with(&mut config.disk, &self.disk);
        override_with(&mut config.net, &self.net);
        override_with(&mut config.process, &self.process);
        override_with(&mut config.collectors, &self.collectors);
        override_with(&mut config.keep_for, &self.keep_for);
        override_with(&mut config.format, &self.format);
        override_with(&mut config.separator, &self.separator);
        override_with(&mut config.flush_period, &self.flush_period);

        if let Some(path) = &self.flush_path {
            config.flush_path = Some(path.clone());
        }
        if self.keep_metrics {
            config.keep_metrics = true;
        }
        if !self.cpu_modules.is_empty() {
            config.cpu_modules = self.cpu_modules.clone();
        }
        if !self.net_interfaces.is_empty() {
            config.net_opts.interfaces = self.net_interfaces.clone();
        }
        if !self.disk_names.is_empty() {
            config.disk_opts.names = self.disk_names.clone();
        }
        if !self.process_whitelist.is_empty() {
            config.process_opts.whitelist = self.process_whitelist.clone();
        }
        config.labels.extend(self.labels.iter().cloned());
    }
}

fn override_with<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("invalid label '{}', expected key=value", raw)),
    }
}

/// Initializes the tracing subscriber, which also receives `log` records.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("nodescrape={}", level).parse()?)
        .add_directive(format!("nodescrape_lib={}", level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet)?;

    let (mut config, file) =
        AgentConfig::discover(args.config.as_deref()).context("failed to load configuration")?;
    match file {
        Some(path) => info!("using config file {}", path.display()),
        None => info!("no config file found, using defaults"),
    }
    args.apply(&mut config);
    debug!("configuration: {:?}", config);

    info!("nodescrape starting");
    let registry = Arc::new(
        Registry::from_config(&config, Arc::new(SystemHost::new()))
            .context("failed to start collectors")?,
    );
    info!("nodescrape started - {}", registry.len());

    let flush = config.flush_path.clone().map(|prefix| {
        spawn_flush_loop(Arc::clone(&registry), prefix, config.flush_period())
    });

    let result = match config.listen_addr() {
        Some(addr) => {
            select! {
                served = server::serve(Arc::clone(&registry), addr) => {
                    served.with_context(|| format!("http server on {} failed", addr))
                }
                _ = shutdown_signal() => Ok(()),
            }
        }
        None => {
            shutdown_signal().await;
            Ok(())
        }
    };

    info!("shutting down");
    registry.shutdown();
    if let Some(flush) = flush {
        let _ = flush.await;
    }
    result
}
