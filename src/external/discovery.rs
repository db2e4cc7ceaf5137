use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, warn};
use walkdir::WalkDir;

/// Directory names that may sit next to the interval directories.
const SUPPORT_DIRS: [&str; 2] = ["etc", "lib"];

/// One executable found in the collectors directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorEntry {
    pub path: PathBuf,
    pub period: Duration,
}

/// Scans `root` for `<seconds>/<executable>` entries. A non-positive interval
/// directory uses `default_period`. Entries come back sorted by path.
pub fn discover(root: &Path, default_period: Duration) -> Vec<CollectorEntry> {
    if !root.is_dir() {
        debug!("no external collectors directory at {}", root.display());
        return Vec::new();
    }

    let mut entries = Vec::new();
    let interval_dirs = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for dir in interval_dirs {
        let dir = match dir {
            Ok(dir) => dir,
            Err(err) => {
                error!("failed to read collectors directory: {}", err);
                continue;
            }
        };
        if !dir.file_type().is_dir() {
            continue;
        }

        let name = dir.file_name().to_string_lossy();
        let period = match name.parse::<i64>() {
            Ok(seconds) if seconds > 0 => Duration::from_secs(seconds as u64),
            Ok(_) => default_period,
            Err(_) => {
                if !SUPPORT_DIRS.contains(&&*name) {
                    warn!("bad collector folder: {}", name);
                }
                continue;
            }
        };

        let files = WalkDir::new(dir.path())
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();
        for file in files {
            match file {
                Ok(file) if file.file_type().is_file() => entries.push(CollectorEntry {
                    path: file.into_path(),
                    period,
                }),
                Ok(_) => {}
                Err(err) => error!("failed to read collectors directory: {}", err),
            }
        }
    }

    entries
}
