//! External collectors: executables whose stdout is scraped every period.
//!
//! Unlike the built-in sources, reading an external collector is not free of
//! side effects. [`ExternalCollector::commit_and_read`] moves everything parsed
//! since the previous read into the [`RetentionRing`] and returns the ring, so
//! it must be called once per exposure cycle.

mod discovery;
mod protocol;
mod ring;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::RwLock;

use crate::error::ScrapeError;
use crate::series::{OutputFormat, SeriesFormat};
use crate::sources::MetricSource;

pub use discovery::{discover, CollectorEntry};
pub use protocol::{parse_line, ParsedLine};
pub use ring::RetentionRing;

#[derive(Debug)]
struct State {
    /// Lines of the current, not yet committed, scrapes.
    scratch: Vec<u8>,
    ring: RetentionRing,
}

pub struct ExternalCollector {
    path: PathBuf,
    name: String,
    keep_history: bool,
    format: SeriesFormat,
    state: RwLock<State>,
}

impl ExternalCollector {
    /// `keep` is the number of committed snapshots retained. With
    /// `keep_history` off only the newest one is returned on read.
    ///
    /// Collectors always emit Sensision lines; `format` contributes its
    /// separator and default labels.
    pub fn new(
        path: impl Into<PathBuf>,
        keep: usize,
        keep_history: bool,
        format: &SeriesFormat,
    ) -> Self {
        let path = path.into();
        ExternalCollector {
            name: path.display().to_string(),
            path,
            keep_history,
            format: format.with_format(OutputFormat::Sensision),
            state: RwLock::new(State {
                scratch: Vec::new(),
                ring: RetentionRing::new(keep),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs the executable once and appends its data points to the scratch
    /// buffer. Lines parsed before a failure are kept.
    async fn run(&self) -> Result<(), ScrapeError> {
        let mut child = Command::new(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ScrapeError::Spawn {
                path: self.path.clone(),
                source,
            })?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf).await {
                        Ok(0) => break,
                        Ok(_) => warn!("{}: {}", name, String::from_utf8_lossy(&buf).trim()),
                        Err(err) => {
                            debug!("{}: stderr closed: {}", name, err);
                            break;
                        }
                    }
                }
            })
        });

        if let Some(stdout) = child.stdout.take() {
            // Lines are decoded lossily so a stray byte only spoils its own line.
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                let read = reader
                    .read_until(b'\n', &mut buf)
                    .await
                    .map_err(|source| ScrapeError::Output {
                        path: self.path.clone(),
                        source,
                    })?;
                if read == 0 {
                    break;
                }
                self.ingest(&String::from_utf8_lossy(&buf)).await;
            }
        }

        let status = child.wait().await.map_err(|source| ScrapeError::Output {
            path: self.path.clone(),
            source,
        })?;
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        if !status.success() {
            return Err(ScrapeError::Exit {
                path: self.path.clone(),
                status,
            });
        }
        Ok(())
    }

    async fn ingest(&self, line: &str) {
        match parse_line(line) {
            ParsedLine::Point(point) => {
                let encoded = self.format.encode(&point);
                self.state
                    .write()
                    .await
                    .scratch
                    .extend_from_slice(encoded.as_bytes());
            }
            ParsedLine::Blank | ParsedLine::Metadata => {}
            ParsedLine::Invalid(reason) => warn!("{}: {}", self.name, reason),
        }
    }

    /// Commits the scratch buffer as the newest snapshot, evicting the oldest,
    /// and returns the retained lines.
    pub async fn commit_and_read(&self) -> Vec<u8> {
        let mut state = self.state.write().await;
        let scratch = std::mem::take(&mut state.scratch);
        debug!("{}: committing {} bytes", self.name, scratch.len());
        state.ring.commit(scratch);
        self.read(&state.ring)
    }

    /// Retained lines without committing.
    pub async fn retained(&self) -> Vec<u8> {
        let state = self.state.read().await;
        self.read(&state.ring)
    }

    fn read(&self, ring: &RetentionRing) -> Vec<u8> {
        if self.keep_history {
            ring.concat()
        } else {
            ring.newest().to_vec()
        }
    }
}

impl MetricSource for ExternalCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> u8 {
        1
    }

    fn scrape(&self) -> BoxFuture<'_, Result<(), ScrapeError>> {
        self.run().boxed()
    }

    fn metrics(&self) -> BoxFuture<'_, Vec<u8>> {
        self.commit_and_read().boxed()
    }
}
