use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use lazy_static::lazy_static;
use nodescrape_lib::host::{
    CpuTimes, DiskIo, DiskUsage, HostStats, LoadAverage, MemoryUsage, NetIo, ProcessEntry,
    SensorReading,
};
use nodescrape_lib::series::SeriesFormat;
use nodescrape_lib::sources::PublishBuffer;
use nodescrape_lib::{
    AgentConfig, ExternalCollector, MetricSource, ProviderError, Registry, ScrapeError,
};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

/// Fixed host counters.
struct StaticHost;

impl HostStats for StaticHost {
    fn cpu_times(&self) -> Result<Vec<CpuTimes>, ProviderError> {
        Err(ProviderError::Unsupported("cpu time-in-state"))
    }

    fn temperatures(&self) -> Result<Vec<SensorReading>, ProviderError> {
        Ok(Vec::new())
    }

    fn memory(&self) -> Result<MemoryUsage, ProviderError> {
        Ok(MemoryUsage {
            total: 400,
            used: 100,
            swap_total: 0,
            swap_used: 0,
        })
    }

    fn load_average(&self) -> Result<LoadAverage, ProviderError> {
        Ok(LoadAverage {
            one: 1.5,
            five: 1.0,
            fifteen: 0.5,
        })
    }

    fn disk_usage(&self) -> Result<Vec<DiskUsage>, ProviderError> {
        Ok(Vec::new())
    }

    fn disk_io(&self) -> Result<Vec<DiskIo>, ProviderError> {
        Ok(Vec::new())
    }

    fn network_io(&self) -> Result<Vec<NetIo>, ProviderError> {
        Ok(Vec::new())
    }

    fn processes(&self) -> Result<Vec<ProcessEntry>, ProviderError> {
        Ok(vec![ProcessEntry {
            name: "sshd".to_string(),
            exe: Some(PathBuf::from("/usr/sbin/sshd")),
        }])
    }
}

lazy_static! {
    // Scripts are written and executed one test at a time to avoid ETXTBSY.
    static ref SCRIPTS: Mutex<()> = Mutex::new(());
}

/// Source whose snapshot is set by the test.
struct Canned {
    name: &'static str,
    buffer: PublishBuffer,
}

impl Canned {
    async fn new(name: &'static str, lines: &str) -> Arc<Self> {
        let buffer = PublishBuffer::new();
        buffer.publish(lines.as_bytes().to_vec()).await;
        Arc::new(Canned { name, buffer })
    }
}

impl MetricSource for Canned {
    fn name(&self) -> &str {
        self.name
    }

    fn level(&self) -> u8 {
        0
    }

    fn scrape(&self) -> BoxFuture<'_, Result<(), ScrapeError>> {
        async { Ok(()) }.boxed()
    }

    fn metrics(&self) -> BoxFuture<'_, Vec<u8>> {
        self.buffer.snapshot().boxed()
    }
}

fn quiet_config(collectors: PathBuf) -> AgentConfig {
    AgentConfig {
        period: 10,
        cpu: 0,
        mem: 0,
        load: 0,
        disk: 0,
        net: 0,
        process: 0,
        collectors,
        ..AgentConfig::default()
    }
}

#[tokio::test]
async fn aggregation_follows_registration_order() {
    let mut registry = Registry::new().unwrap();
    registry.register(Canned::new("b", "b 1\n").await, Duration::from_secs(1));
    registry.register(Canned::new("a", "a 1\n").await, Duration::from_secs(1));
    registry.register(Canned::new("empty", "").await, Duration::from_secs(1));
    registry.register(Canned::new("c", "c 1\n").await, Duration::from_secs(1));

    assert_eq!(registry.len(), 4);
    assert_eq!(registry.metrics().await, b"b 1\na 1\nc 1\n");
}

#[tokio::test]
async fn disabled_sources_contribute_nothing() {
    let dir = TempDir::new().unwrap();
    let registry =
        Registry::from_config(&quiet_config(dir.path().join("none")), Arc::new(StaticHost))
            .unwrap();

    assert_eq!(registry.len(), 6);
    sleep(Duration::from_millis(50)).await;
    assert!(registry.metrics().await.is_empty());
}

#[tokio::test]
async fn enabled_sources_publish_through_the_registry() {
    let dir = TempDir::new().unwrap();
    let config = AgentConfig {
        mem: 1,
        load: 2,
        process: 1,
        process_opts: nodescrape_lib::config::ProcessOptions {
            whitelist: vec!["sshd".to_string()],
        },
        ..quiet_config(dir.path().join("none"))
    };
    let registry = Registry::from_config(&config, Arc::new(StaticHost)).unwrap();

    let out = timeout(Duration::from_secs(5), async {
        loop {
            let out = String::from_utf8(registry.metrics().await).unwrap();
            if out.contains("os.process.up") && out.contains("os.load15") && out.contains("os.mem") {
                return out;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("sources did not publish in time");

    let classes: Vec<&str> = out
        .lines()
        .filter_map(|line| line.split_once("// ").map(|(_, rest)| rest))
        .collect();
    assert_eq!(
        classes,
        vec![
            "os.mem{} 25",
            "os.swap{} 0",
            "os.load1{} 1.5",
            "os.load5{} 1",
            "os.load15{} 0.5",
            "os.process.up{name=sshd} true",
        ]
    );

    registry.shutdown();
}

#[cfg(unix)]
#[tokio::test]
async fn external_collectors_are_discovered_and_scheduled() {
    use std::os::unix::fs::PermissionsExt;

    let _guard = SCRIPTS.lock().await;
    let dir = TempDir::new().unwrap();
    let interval_dir = dir.path().join("0");
    fs::create_dir(&interval_dir).unwrap();
    let script = interval_dir.join("up.sh");
    fs::write(&script, "#!/bin/sh\necho 'app.up 1620000000000000 1 role=test'\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let config = AgentConfig {
        keep_for: 5,
        keep_metrics: true,
        ..quiet_config(dir.path().to_path_buf())
    };
    let registry = Registry::from_config(&config, Arc::new(StaticHost)).unwrap();
    assert_eq!(registry.len(), 7);

    timeout(Duration::from_secs(5), async {
        loop {
            let out = String::from_utf8(registry.metrics().await).unwrap();
            if out.contains("1620000000000000// app.up{role=test} 1\n") {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("external collector did not publish in time");
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_commit_each_scrape_once() {
    use std::os::unix::fs::PermissionsExt;

    let _guard = SCRIPTS.lock().await;
    let dir = TempDir::new().unwrap();
    let script = |name: &str, line: &str| {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\necho '{}'\n", line)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    };
    let newest = Arc::new(ExternalCollector::new(
        script("newest.sh", "app.newest 1 1"),
        5,
        false,
        &SeriesFormat::default(),
    ));
    let history = Arc::new(ExternalCollector::new(
        script("history.sh", "app.history 1 1"),
        5,
        true,
        &SeriesFormat::default(),
    ));

    // The period is long enough that only the scrapes below ever run.
    let mut registry = Registry::new().unwrap();
    registry.register(Arc::<ExternalCollector>::clone(&newest), Duration::from_secs(3600));
    registry.register(Arc::<ExternalCollector>::clone(&history), Duration::from_secs(3600));
    newest.scrape().await.unwrap();
    history.scrape().await.unwrap();

    let (first, second) = tokio::join!(registry.metrics(), registry.metrics());
    let first = String::from_utf8(first).unwrap();
    let second = String::from_utf8(second).unwrap();

    let line = "1// app.newest{} 1\n";
    assert_eq!(first.matches(line).count() + second.matches(line).count(), 1);

    let retained = String::from_utf8(history.retained().await).unwrap();
    assert_eq!(retained, "1// app.history{} 1\n");

    registry.shutdown();
}
