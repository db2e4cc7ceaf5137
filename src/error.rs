use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Failure of the host statistics provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not available on this platform")]
    Unsupported(&'static str),
    #[error("{0} returned no data")]
    Empty(&'static str),
    #[error("provider task failed: {0}")]
    Join(String),
}

/// Failure of a single scrape cycle. Never fatal, the scheduler logs it and
/// keeps the previous snapshot.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("{path}: failed to spawn collector: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: failed to read collector output: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: collector exited with {status}")]
    Exit { path: PathBuf, status: ExitStatus },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid filter pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no tokio runtime available to schedule collectors: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
}
