//! Process snapshot reader.
//!
//! Finds running assistant processes and reads their per-process
//! attributes from the OS. The [`ProcessSource`] trait is the seam: the
//! poller only talks to the trait, and tests substitute a fake.
//!
//! All methods perform blocking I/O and must run on a blocking thread.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A process that vanishes mid-query yields `None`, not an error

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use ccm_core::process::PS_DETAIL_COLUMNS;
use ccm_core::{parse_detail_line, parse_lsof_cwd, parse_pid_list, ProcessDetail};
use thiserror::Error;
use tracing::{debug, trace};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while enumerating processes.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process-listing command could not be run at all.
    #[error("failed to run {command}: {message}")]
    CommandFailed { command: String, message: String },
}

// ============================================================================
// Process Source Trait
// ============================================================================

/// Read access to the OS process table.
pub trait ProcessSource: Send {
    /// Lists the PIDs of processes named exactly like the target executable,
    /// in listing order.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError` only if the listing itself cannot be performed.
    /// "No matching processes" is an empty list.
    fn list_pids(&self) -> Result<Vec<u32>, ProcessError>;

    /// Reads terminal, run-state, CPU and start time for one process.
    ///
    /// Returns `None` if the process exited or its details are unreadable.
    fn details(&self, pid: u32) -> Option<ProcessDetail>;

    /// Reads the process's current working directory.
    fn working_directory(&self, pid: u32) -> Option<PathBuf>;
}

// ============================================================================
// ps-based Implementation
// ============================================================================

/// Process source backed by `pgrep`, `ps` and `lsof`.
///
/// Works on macOS and Linux. On Linux the working directory is read from
/// `/proc/<pid>/cwd` before falling back to `lsof`.
#[derive(Debug, Clone)]
pub struct PsProcessSource {
    executable_name: String,
}

impl PsProcessSource {
    /// Creates a source matching the given executable name.
    pub fn new(executable_name: impl Into<String>) -> Self {
        Self {
            executable_name: executable_name.into(),
        }
    }

    /// Returns the executable name being matched.
    pub fn executable_name(&self) -> &str {
        &self.executable_name
    }
}

/// Output formats (`lstart` names, `%cpu` decimals) are only fixed in the
/// C locale.
fn c_locale_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.env("LC_ALL", "C");
    cmd
}

fn pgrep_command(executable_name: &str) -> Command {
    let mut cmd = c_locale_command("pgrep");
    cmd.args(["-x", executable_name]);
    cmd
}

fn ps_command(pid: u32) -> Command {
    let mut cmd = c_locale_command("ps");
    cmd.args(["-p", &pid.to_string(), "-o", PS_DETAIL_COLUMNS]);
    cmd
}

fn lsof_command(pid: u32) -> Command {
    let mut cmd = c_locale_command("lsof");
    cmd.args(["-p", &pid.to_string(), "-a", "-d", "cwd", "-Fn"]);
    cmd
}

/// Interprets a finished `pgrep` run.
///
/// Exit 0 lists matches and exit 1 means nothing matched. Any other status,
/// or death by signal, is a listing failure.
fn pgrep_result(code: Option<i32>, stdout: &str, stderr: &str) -> Result<Vec<u32>, ProcessError> {
    match code {
        Some(0 | 1) => Ok(parse_pid_list(stdout)),
        Some(code) => Err(ProcessError::CommandFailed {
            command: "pgrep".to_string(),
            message: format!("exit status {code}: {}", stderr.trim()),
        }),
        None => Err(ProcessError::CommandFailed {
            command: "pgrep".to_string(),
            message: "terminated by signal".to_string(),
        }),
    }
}

impl ProcessSource for PsProcessSource {
    fn list_pids(&self) -> Result<Vec<u32>, ProcessError> {
        let output = pgrep_command(&self.executable_name)
            .output()
            .map_err(|e| ProcessError::CommandFailed {
                command: "pgrep".to_string(),
                message: e.to_string(),
            })?;

        let pids = pgrep_result(
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )?;
        trace!(
            name = %self.executable_name,
            count = pids.len(),
            "Listed processes"
        );
        Ok(pids)
    }

    fn details(&self, pid: u32) -> Option<ProcessDetail> {
        let output = ps_command(pid).output().ok()?;

        if !output.status.success() {
            debug!(pid, "Process gone before details could be read");
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.lines().find(|l| !l.trim().is_empty())?;
        let detail = parse_detail_line(pid, line);
        if detail.is_none() {
            debug!(pid, line, "Unparsable ps output");
        }
        detail
    }

    fn working_directory(&self, pid: u32) -> Option<PathBuf> {
        if let Ok(cwd) = fs::read_link(format!("/proc/{pid}/cwd")) {
            return Some(cwd);
        }

        let output = lsof_command(pid).output().ok()?;
        parse_lsof_cwd(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn has_c_locale(cmd: &Command) -> bool {
        cmd.get_envs()
            .any(|(key, value)| key == "LC_ALL" && value == Some(OsStr::new("C")))
    }

    fn args(cmd: &Command) -> Vec<&str> {
        cmd.get_args().filter_map(OsStr::to_str).collect()
    }

    #[test]
    fn test_commands_run_in_c_locale() {
        for cmd in [pgrep_command("claude"), ps_command(42), lsof_command(42)] {
            assert!(has_c_locale(&cmd), "{:?} lacks LC_ALL=C", cmd.get_program());
        }
    }

    #[test]
    fn test_ps_command_args() {
        let cmd = ps_command(4242);
        assert_eq!(cmd.get_program(), "ps");
        assert_eq!(args(&cmd), ["-p", "4242", "-o", PS_DETAIL_COLUMNS]);
    }

    #[test]
    fn test_pgrep_and_lsof_command_args() {
        assert_eq!(args(&pgrep_command("claude")), ["-x", "claude"]);
        assert_eq!(
            args(&lsof_command(7)),
            ["-p", "7", "-a", "-d", "cwd", "-Fn"]
        );
    }

    #[test]
    fn test_pgrep_result_matches_and_no_match() {
        assert_eq!(pgrep_result(Some(0), "12\n34\n", "").unwrap(), vec![12, 34]);
        assert!(pgrep_result(Some(1), "", "").unwrap().is_empty());
    }

    #[test]
    fn test_pgrep_result_failure_statuses() {
        let err = pgrep_result(Some(2), "", "pgrep: invalid option\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to run pgrep: exit status 2: pgrep: invalid option"
        );
        assert!(pgrep_result(Some(3), "", "").is_err());
        assert!(pgrep_result(None, "", "").is_err());
    }

    #[test]
    fn test_list_pids_no_match_is_empty() {
        let source = PsProcessSource::new("ccm-no-such-executable-xyz");
        // pgrep may be missing in minimal environments; either way no panic
        if let Ok(pids) = source.list_pids() {
            assert!(pids.is_empty());
        }
    }

    #[test]
    fn test_details_nonexistent_pid() {
        let source = PsProcessSource::new("claude");
        assert!(source.details(999_999_999).is_none());
    }

    #[test]
    fn test_working_directory_nonexistent_pid() {
        let source = PsProcessSource::new("claude");
        assert!(source.working_directory(999_999_999).is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_working_directory_self() {
        let source = PsProcessSource::new("claude");
        let cwd = source.working_directory(std::process::id());
        assert_eq!(cwd, std::env::current_dir().ok());
    }

    #[test]
    fn test_executable_name() {
        let source = PsProcessSource::new("claude");
        assert_eq!(source.executable_name(), "claude");
    }
}
