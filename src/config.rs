// src/config.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::series::{OutputFormat, SeriesFormat};
use crate::sources::NameFilter;

const CONFIG_FILE: &str = "config.yaml";
const DISABLED_LISTEN: &str = "none";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetOptions {
    pub interfaces: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskOptions {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessOptions {
    pub whitelist: Vec<String>,
}

/// Agent settings, read from YAML. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// HTTP listen address, `none` to disable the endpoint.
    pub listen: String,
    /// Default scrape period in milliseconds.
    pub period: u64,

    // Levels, 0 disables a source
    pub cpu: u8,
    pub mem: u8,
    pub load: u8,
    pub disk: u8,
    pub net: u8,
    pub process: u8,

    #[serde(alias = "cpu-mods")]
    pub cpu_modules: Vec<String>,
    #[serde(alias = "net-opts")]
    pub net_opts: NetOptions,
    #[serde(alias = "disk-opts")]
    pub disk_opts: DiskOptions,
    #[serde(alias = "process-opts")]
    pub process_opts: ProcessOptions,

    /// Root of the `<seconds>/<executable>` tree.
    pub collectors: PathBuf,
    /// Snapshots retained per external collector.
    #[serde(alias = "keep-for")]
    pub keep_for: usize,
    /// Expose every retained snapshot instead of the newest only.
    #[serde(alias = "keep-metrics")]
    pub keep_metrics: bool,

    pub format: String,
    pub separator: String,
    pub labels: BTreeMap<String, String>,

    /// File name prefix for periodic dumps, disabled when unset.
    #[serde(alias = "flushPath")]
    pub flush_path: Option<String>,
    #[serde(alias = "flushPeriod")]
    pub flush_period: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            listen: "127.0.0.1:9100".to_string(),
            period: 1000,
            cpu: 1,
            mem: 1,
            load: 1,
            disk: 1,
            net: 1,
            process: 1,
            cpu_modules: Vec::new(),
            net_opts: NetOptions::default(),
            disk_opts: DiskOptions::default(),
            process_opts: ProcessOptions::default(),
            collectors: PathBuf::from("./collectors"),
            keep_for: 3,
            keep_metrics: false,
            format: "sensision".to_string(),
            separator: ".".to_string(),
            labels: BTreeMap::new(),
            flush_path: None,
            flush_period: 10000,
        }
    }
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `explicit` when given, otherwise the first existing file among
    /// [`AgentConfig::search_paths`]. No file at all means defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        for path in Self::search_paths() {
            if path.is_file() {
                return Ok((Self::load(&path)?, Some(path)));
            }
            debug!("no config file at {}", path.display());
        }
        Ok((Self::default(), None))
    }

    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![Path::new("/etc/nodescrape").join(CONFIG_FILE)];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".nodescrape").join(CONFIG_FILE));
        }
        paths.push(PathBuf::from(".").join(CONFIG_FILE));
        paths
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period)
    }

    pub fn flush_period(&self) -> Duration {
        Duration::from_millis(self.flush_period)
    }

    pub fn keep(&self) -> usize {
        self.keep_for.max(1)
    }

    /// `None` when the HTTP endpoint is disabled.
    pub fn listen_addr(&self) -> Option<&str> {
        let listen = self.listen.trim();
        if listen.is_empty() || listen.eq_ignore_ascii_case(DISABLED_LISTEN) {
            None
        } else {
            Some(listen)
        }
    }

    pub fn series_format(&self) -> SeriesFormat {
        SeriesFormat::new(
            OutputFormat::from_identifier(&self.format),
            self.separator.clone(),
            self.labels.clone(),
        )
    }

    pub fn disk_filter(&self) -> Result<NameFilter, ConfigError> {
        NameFilter::new(&self.disk_opts.names)
    }

    pub fn net_filter(&self) -> Result<NameFilter, ConfigError> {
        NameFilter::new(&self.net_opts.interfaces)
    }
}
