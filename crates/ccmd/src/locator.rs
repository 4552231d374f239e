//! Log artifact locator.
//!
//! Claude Code writes one `*.jsonl` log per session under
//! `~/.claude/projects/<escaped-project-path>/`. Nothing on disk names the
//! process that owns a log, so a process is matched to the log whose
//! creation time is closest to the process start time, within
//! [`MATCH_TOLERANCE`]. Two sessions started within the tolerance of the
//! same log can both match it; that misattribution is accepted.
//!
//! This module performs blocking I/O.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

/// Maximum distance between process start and log creation for a match.
pub const MATCH_TOLERANCE: Duration = Duration::from_secs(300);

/// Extension of session log files.
pub const LOG_EXTENSION: &str = "jsonl";

/// Scans a log root for the log belonging to a process.
#[derive(Debug, Clone)]
pub struct LogLocator {
    root: PathBuf,
}

impl LogLocator {
    /// Creates a locator over the given log root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the log root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Finds the log created closest to `start_time`, if one is in tolerance.
    ///
    /// Returns `None` when the start time is unknown, the root is unreadable,
    /// or no log is close enough. Never fails.
    pub fn locate(&self, start_time: Option<DateTime<Utc>>) -> Option<PathBuf> {
        let start = SystemTime::from(start_time?);
        let found = select_closest(self.candidates(), start);
        debug!(
            root = %self.root.display(),
            found = ?found,
            "Log artifact scan complete"
        );
        found
    }

    /// Enumerates `(path, creation time)` for every log one level below the root.
    fn candidates(&self) -> Vec<(PathBuf, SystemTime)> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(root = %self.root.display(), error = %e, "Cannot read log root");
                return Vec::new();
            }
        };

        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .flat_map(|dir| project_logs(&dir))
            .collect()
    }
}

/// Lists the logs in one project directory with their creation times.
fn project_logs(dir: &Path) -> Vec<(PathBuf, SystemTime)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            trace!(dir = %dir.display(), error = %e, "Skipping unreadable project dir");
            return Vec::new();
        }
    };

    entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                return None;
            }
            let metadata = entry.metadata().ok()?;
            let created = creation_time(&metadata)?;
            Some((path, created))
        })
        .collect()
}

/// Returns the file's creation time.
///
/// Filesystems that do not record a birth time report `Unsupported`; the
/// modification time stands in for it there.
fn creation_time(metadata: &fs::Metadata) -> Option<SystemTime> {
    match metadata.created() {
        Ok(created) => Some(created),
        Err(e) if e.kind() == ErrorKind::Unsupported => metadata.modified().ok(),
        Err(_) => None,
    }
}

/// Picks the candidate created closest to `start`, strictly within
/// [`MATCH_TOLERANCE`].
///
/// Equal distances keep the first candidate encountered.
pub fn select_closest<I>(candidates: I, start: SystemTime) -> Option<PathBuf>
where
    I: IntoIterator<Item = (PathBuf, SystemTime)>,
{
    let mut best: Option<(PathBuf, Duration)> = None;

    for (path, created) in candidates {
        let diff = abs_diff(created, start);
        if diff >= MATCH_TOLERANCE {
            continue;
        }
        let better = match &best {
            Some((_, best_diff)) => diff < *best_diff,
            None => true,
        };
        if better {
            best = Some((path, diff));
        }
    }

    best.map(|(path, _)| path)
}

fn abs_diff(a: SystemTime, b: SystemTime) -> Duration {
    a.duration_since(b)
        .or_else(|_| b.duration_since(a))
        .unwrap_or_default()
}
