//! Session correlator.
//!
//! Gives each live process a title, matching it to its log artifact on the
//! first poll that sees it and serving the cached answer afterwards. The
//! cache is keyed by PID and must be pruned to the live PID set every poll:
//! PIDs get reused, and a stale entry would hand a dead session's title to
//! an unrelated process.

use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};

use ccm_core::extract_title;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::locator::LogLocator;
use crate::process::ProcessSource;

/// Prefix of titles derived from something other than a log.
pub const FALLBACK_TITLE_PREFIX: &str = "Claude Code";

// ============================================================================
// Correlation Cache
// ============================================================================

/// Per-process correlation results that survive across polls.
///
/// A PID can have a title without an artifact: that records "no log found"
/// so the directory tree is not rescanned each poll.
#[derive(Debug, Default)]
pub struct CorrelationCache {
    titles: HashMap<u32, String>,
    artifacts: HashMap<u32, PathBuf>,
}

impl CorrelationCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached title for a process.
    pub fn title(&self, pid: u32) -> Option<&str> {
        self.titles.get(&pid).map(String::as_str)
    }

    /// Returns the cached log artifact for a process.
    pub fn artifact(&self, pid: u32) -> Option<&Path> {
        self.artifacts.get(&pid).map(PathBuf::as_path)
    }

    /// Records a resolution.
    pub fn insert(&mut self, pid: u32, title: String, artifact: Option<PathBuf>) {
        self.titles.insert(pid, title);
        match artifact {
            Some(path) => {
                self.artifacts.insert(pid, path);
            }
            None => {
                self.artifacts.remove(&pid);
            }
        }
    }

    /// Drops every entry whose PID is not live. Returns how many PIDs were evicted.
    pub fn retain_live(&mut self, live: &HashSet<u32>) -> usize {
        let before = self.titles.len();
        self.titles.retain(|pid, _| live.contains(pid));
        self.artifacts.retain(|pid, _| live.contains(pid));
        before - self.titles.len()
    }

    /// Number of processes with a cached title.
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Returns true if the process has any cache entry.
    pub fn contains(&self, pid: u32) -> bool {
        self.titles.contains_key(&pid) || self.artifacts.contains_key(&pid)
    }
}

// ============================================================================
// Correlator
// ============================================================================

/// Resolves session titles using the log locator and a fallback rule.
#[derive(Debug, Clone)]
pub struct Correlator {
    locator: LogLocator,
    /// Directory names that never make a good title (includes the user's name).
    excluded_dir_names: Vec<String>,
}

impl Correlator {
    /// Creates a correlator.
    ///
    /// The operating user's name is added to `excluded_dir_names`.
    pub fn new(locator: LogLocator, mut excluded_dir_names: Vec<String>) -> Self {
        if let Some(user) = current_user_name() {
            if !excluded_dir_names.contains(&user) {
                excluded_dir_names.push(user);
            }
        }
        Self {
            locator,
            excluded_dir_names,
        }
    }

    /// Returns the locator in use.
    pub fn locator(&self) -> &LogLocator {
        &self.locator
    }

    /// Returns the title for a process, resolving and caching it on first sight.
    ///
    /// On a miss the log root is scanned; a matching log supplies the title
    /// and is cached as the process's artifact. Without a match the title
    /// comes from the working directory and only the title is cached.
    pub fn resolve_title(
        &self,
        pid: u32,
        tty: &str,
        start_time: Option<DateTime<Utc>>,
        cache: &mut CorrelationCache,
        source: &dyn ProcessSource,
    ) -> String {
        if let Some(title) = cache.title(pid) {
            return title.to_string();
        }

        let (title, artifact) = match self.locator.locate(start_time) {
            Some(path) => (extract_title(&path), Some(path)),
            None => {
                let cwd = source.working_directory(pid);
                (self.fallback_title(cwd.as_deref(), tty), None)
            }
        };

        debug!(
            pid,
            title = %title,
            artifact = ?artifact,
            "Correlated session"
        );

        cache.insert(pid, title.clone(), artifact);
        title
    }

    /// Builds a title from the working directory, or from the terminal when
    /// the directory name is missing or excluded.
    pub fn fallback_title(&self, cwd: Option<&Path>, tty: &str) -> String {
        let leaf = cwd
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty());

        match leaf {
            Some(name) if !self.excluded_dir_names.contains(&name) => {
                format!("{FALLBACK_TITLE_PREFIX} - {name}")
            }
            _ => format!("{FALLBACK_TITLE_PREFIX} ({tty})"),
        }
    }
}

/// Returns the operating user's login name.
///
/// Reads `$USER`, then `$LOGNAME`, then falls back to the home directory's
/// name.
pub fn current_user_name() -> Option<String> {
    env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .or_else(|| env::var("LOGNAME").ok().filter(|u| !u.is_empty()))
        .or_else(|| {
            dirs::home_dir()
                .and_then(|h| h.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
}
