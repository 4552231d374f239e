//! Activity classification.
//!
//! A session's state is a pure function of three signals: the scheduler
//! run-state code, CPU usage, and whether its log file was written recently.
//! First match wins:
//!
//! 1. runnable, or CPU above [`WORKING_CPU_THRESHOLD`] → `Working`
//! 2. log modified within [`RECENT_LOG_WINDOW`] → `Waiting`
//! 3. otherwise → `Idle`
//!
//! Consumers depend on these exact thresholds; they are not configuration.

use std::time::{Duration, SystemTime};

use crate::SessionStatus;

/// CPU percentage above which a process counts as working.
pub const WORKING_CPU_THRESHOLD: f64 = 2.0;

/// A log modified less than this long ago counts as recent activity.
pub const RECENT_LOG_WINDOW: Duration = Duration::from_secs(120);

/// Returns true if a `ps` state code marks the process as runnable.
///
/// State codes carry modifier flags (`R+`, `Ss`, `S<`), so this checks
/// for the `R` anywhere in the code.
#[must_use]
pub fn is_runnable(state: &str) -> bool {
    state.contains('R')
}

/// Classifies a session.
#[must_use]
pub fn classify(state: &str, cpu_percent: f64, log_recently_modified: bool) -> SessionStatus {
    if is_runnable(state) || cpu_percent > WORKING_CPU_THRESHOLD {
        SessionStatus::Working
    } else if log_recently_modified {
        SessionStatus::Waiting
    } else {
        SessionStatus::Idle
    }
}

/// Returns true if `modified` lies within [`RECENT_LOG_WINDOW`] before `now`.
///
/// Timestamps in the future (clock skew) count as recent.
#[must_use]
pub fn is_recent(modified: SystemTime, now: SystemTime) -> bool {
    match now.duration_since(modified) {
        Ok(age) => age < RECENT_LOG_WINDOW,
        Err(_) => true,
    }
}
