//! One poll cycle: enumerate, correlate, classify, prune, sort.
//!
//! The `Poller` owns every piece of state that survives between cycles
//! (the correlation cache) and does all of its work with blocking calls.
//! The registry actor moves it onto a blocking thread for each cycle.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use ccm_core::{classify, is_recent, ProcessDetail, Session, SessionSnapshot};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::MonitorConfig;
use crate::correlator::{CorrelationCache, Correlator};
use crate::locator::LogLocator;
use crate::process::{ProcessSource, PsProcessSource};

/// Stateful session poller.
pub struct Poller {
    source: Box<dyn ProcessSource>,
    correlator: Correlator,
    cache: CorrelationCache,
}

impl Poller {
    /// Creates a poller with an empty cache.
    pub fn new(source: Box<dyn ProcessSource>, correlator: Correlator) -> Self {
        Self {
            source,
            correlator,
            cache: CorrelationCache::new(),
        }
    }

    /// Creates a poller reading the real process table.
    pub fn from_config(config: &MonitorConfig) -> Self {
        let source = PsProcessSource::new(config.executable_name.clone());
        let locator = LogLocator::new(config.log_root.clone());
        let correlator = Correlator::new(locator, config.excluded_dir_names.clone());
        Self::new(Box::new(source), correlator)
    }

    /// Returns the correlation cache.
    pub fn cache(&self) -> &CorrelationCache {
        &self.cache
    }

    /// Runs one poll cycle against the current time.
    pub fn poll(&mut self) -> SessionSnapshot {
        self.poll_at(SystemTime::now())
    }

    /// Runs one poll cycle, judging log recency against `now`.
    ///
    /// Never fails. If the process table cannot be listed the snapshot is
    /// empty and the cache is left alone; a process whose details cannot
    /// be read is left out of the snapshot.
    pub fn poll_at(&mut self, now: SystemTime) -> SessionSnapshot {
        let polled_at = DateTime::<Utc>::from(now);

        let pids = match self.source.list_pids() {
            Ok(pids) => pids,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate processes");
                return SessionSnapshot::new(Vec::new(), polled_at);
            }
        };

        let mut live = HashSet::with_capacity(pids.len());
        let mut sessions = Vec::with_capacity(pids.len());

        for pid in pids {
            if !live.insert(pid) {
                continue;
            }

            let Some(detail) = self.source.details(pid) else {
                debug!(pid, "Dropping process without details");
                continue;
            };

            sessions.push(self.build_session(detail, now));
        }

        let evicted = self.cache.retain_live(&live);

        let snapshot = SessionSnapshot::new(sessions, polled_at);
        debug!(
            sessions = snapshot.len(),
            waiting = snapshot.waiting_count,
            cached = self.cache.len(),
            evicted,
            "Poll cycle complete"
        );
        snapshot
    }

    fn build_session(&mut self, detail: ProcessDetail, now: SystemTime) -> Session {
        let title = self.correlator.resolve_title(
            detail.pid,
            &detail.tty,
            detail.start_time,
            &mut self.cache,
            &*self.source,
        );

        let log_recent = self
            .cache
            .artifact(detail.pid)
            .and_then(modified_time)
            .is_some_and(|modified| is_recent(modified, now));

        let status = classify(&detail.state, detail.cpu_percent, log_recent);

        debug!(
            pid = detail.pid,
            state = %detail.state,
            cpu = detail.cpu_percent,
            log_recent,
            status = %status,
            "Classified session"
        );

        Session::new(detail.pid, detail.tty, title, status, detail.start_time)
    }
}

/// Reads a file's modification time fresh from the filesystem.
fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
