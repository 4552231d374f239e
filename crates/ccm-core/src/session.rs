//! Session domain entities and value objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier for a session within a published snapshot.
///
/// Derived from the process ID (decimal string), so it is only stable
/// for as long as the process-table entry lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new SessionId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates the session ID for a process.
    pub fn from_pid(pid: u32) -> Self {
        Self(pid.to_string())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the process ID back out of the identifier.
    pub fn pid(&self) -> Option<u32> {
        self.0.parse().ok()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SessionId {
    fn from(pid: u32) -> Self {
        Self::from_pid(pid)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Session Status (3-State Model)
// ============================================================================

/// Activity state of a session, as decided by [`crate::classify`].
///
/// - **Working**: the process is computing (runnable or burning CPU)
/// - **Waiting**: the assistant just finished and wants a human reply
/// - **Idle**: neither signal is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Actively processing.
    Working,

    /// Recently active log, no CPU load: needs user input.
    Waiting,

    /// Nothing happening.
    #[default]
    Idle,
}

impl SessionStatus {
    /// Returns the display label for this status.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Working => "Working...",
            Self::Waiting => "Needs input",
            Self::Idle => "Idle",
        }
    }

    /// Returns the color name a presentation layer should use.
    #[must_use]
    pub fn color_name(&self) -> &'static str {
        match self {
            Self::Working => "blue",
            Self::Waiting => "orange",
            Self::Idle => "gray",
        }
    }

    /// Returns the ASCII icon for this status.
    #[must_use]
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Working => ">",
            Self::Waiting => "!",
            Self::Idle => "-",
        }
    }

    /// Returns true if user action is needed.
    #[must_use]
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::Waiting)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Session
// ============================================================================

/// One live assistant process as observed by a single poll cycle.
///
/// Immutable once published; a new poll produces new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Snapshot-scoped identifier (derived from the PID)
    pub id: SessionId,

    /// OS process identifier
    pub pid: u32,

    /// Terminal device name without the `/dev/` prefix (e.g. "ttys003", "pts/4")
    pub tty: String,

    /// Best-effort human-readable title
    pub title: String,

    /// Activity state
    pub status: SessionStatus,

    /// Process start time, absent when it could not be parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates a session for a process.
    pub fn new(
        pid: u32,
        tty: impl Into<String>,
        title: impl Into<String>,
        status: SessionStatus,
        start_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: SessionId::from_pid(pid),
            pid,
            tty: tty.into(),
            title: title.into(),
            status,
            start_time,
        }
    }

    /// Returns the terminal's device path (e.g. "/dev/ttys003").
    #[must_use]
    pub fn tty_device(&self) -> String {
        format!("/dev/{}", self.tty)
    }
}

/// Sorts sessions most recently started first.
///
/// Sessions without a start time go last. The sort is stable, so equal
/// keys keep their enumeration order.
pub fn sort_sessions(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| match (a.start_time, b.start_time) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

// ============================================================================
// Snapshot
// ============================================================================

/// The unit of publication: a fully computed, ordered session list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Sessions, most recently started first
    pub sessions: Vec<Session>,

    /// Number of sessions in [`SessionStatus::Waiting`]
    pub waiting_count: usize,

    /// When the poll cycle that produced this snapshot ran
    pub polled_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Builds a snapshot, sorting the sessions and deriving the waiting count.
    pub fn new(mut sessions: Vec<Session>, polled_at: DateTime<Utc>) -> Self {
        sort_sessions(&mut sessions);
        let waiting_count = sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Waiting)
            .count();
        Self {
            sessions,
            waiting_count,
            polled_at,
        }
    }

    /// An empty snapshot stamped with the current time.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Utc::now())
    }

    /// Looks up a session by process ID.
    pub fn get(&self, pid: u32) -> Option<&Session> {
        self.sessions.iter().find(|s| s.pid == pid)
    }

    /// Returns true if no sessions were found.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Compares session content, ignoring the poll timestamp.
    pub fn same_sessions(&self, other: &Self) -> bool {
        self.sessions == other.sessions
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
