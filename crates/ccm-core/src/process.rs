//! Parsing of process-table output.
//!
//! The monitor reads the process table through `pgrep`, `ps` and `lsof`.
//! This module holds the pure parsing half so it can be tested without
//! spawning anything. Every parser fails soft: bad input yields `None`
//! or a default, never an error.

use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// The `ps -o` column list matching [`parse_detail_line`].
pub const PS_DETAIL_COLUMNS: &str = "tty=,state=,%cpu=,lstart=";

/// `lstart` layouts: double-digit and space-padded single-digit day.
const LSTART_FORMATS: [&str; 2] = ["%a %b %d %H:%M:%S %Y", "%a %b  %e %H:%M:%S %Y"];

/// Number of whitespace-separated fields in an `lstart` value.
const LSTART_FIELDS: usize = 5;

/// Per-process attributes read from the process table.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessDetail {
    /// Process ID
    pub pid: u32,
    /// Terminal name (e.g. "ttys003", "pts/4")
    pub tty: String,
    /// Run-state code (e.g. "S+", "R")
    pub state: String,
    /// CPU usage percentage, 0.0 when unparsable
    pub cpu_percent: f64,
    /// Process start time, absent when unparsable
    pub start_time: Option<DateTime<Utc>>,
}

/// Parses `pgrep` output (one PID per line) preserving order.
///
/// Lines that are not PIDs are skipped.
pub fn parse_pid_list(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Parses one line of `ps -o tty=,state=,%cpu=,lstart=` output.
///
/// Example: `ttys003  S+    0.3 Mon Jan  5 10:30:00 2024`
///
/// Returns `None` if the line has too few fields (the process is gone or
/// the output is garbled). An unparsable start time or CPU value does not
/// reject the line.
pub fn parse_detail_line(pid: u32, line: &str) -> Option<ProcessDetail> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 + LSTART_FIELDS {
        return None;
    }

    let tty = fields.first()?.to_string();
    let state = fields.get(1)?.to_string();
    let cpu_percent = parse_cpu_percent(fields.get(2)?);
    let start_time = fields
        .get(3..3 + LSTART_FIELDS)
        .and_then(|lstart| parse_start_time(&lstart.join(" ")));

    Some(ProcessDetail {
        pid,
        tty,
        state,
        cpu_percent,
        start_time,
    })
}

/// Parses a CPU percentage, defaulting to 0.0.
pub fn parse_cpu_percent(s: &str) -> f64 {
    s.trim().parse().unwrap_or(0.0)
}

/// Parses a `ps` `lstart` timestamp as local time.
///
/// Tries both layouts; returns `None` if neither matches or the local time
/// does not exist (DST gap).
pub fn parse_start_time(s: &str) -> Option<DateTime<Utc>> {
    let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
    let naive = LSTART_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Extracts the working directory from `lsof -a -d cwd -Fn` output.
///
/// The field output has one `n<path>` line per file; the first absolute
/// path wins.
pub fn parse_lsof_cwd(output: &str) -> Option<PathBuf> {
    output
        .lines()
        .find(|line| line.starts_with("n/"))
        .and_then(|line| line.get(1..))
        .map(PathBuf::from)
}
