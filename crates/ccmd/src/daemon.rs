//! Daemon lifecycle: state files and process control.
//!
//! `ccmd` keeps two files in its state directory: the PID of the running
//! instance and, when detached, the log that replaces its stdout/stderr.
//! [`DaemonFiles`] owns those paths so `start`, `stop` and `status` agree
//! on them and tests can point them at a temporary directory.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

const STATE_DIR_NAME: &str = "ccm";
const PID_FILE_NAME: &str = "ccmd.pid";
const LOG_FILE_NAME: &str = "ccmd.log";

/// How often [`wait_for_exit`] re-checks the process.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors from daemon lifecycle operations.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to {action} {}: {source}", path.display())]
    File {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

/// PID and log file locations for one daemon instance.
#[derive(Debug, Clone)]
pub struct DaemonFiles {
    dir: PathBuf,
}

impl DaemonFiles {
    /// Uses `dir` to hold the PID and log files.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The platform state directory, or `/tmp` when there is none.
    pub fn from_state_dir() -> Self {
        let base = dirs::state_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        Self::new(base.join(STATE_DIR_NAME))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pid_file(&self) -> PathBuf {
        self.dir.join(PID_FILE_NAME)
    }

    pub fn log_file(&self) -> PathBuf {
        self.dir.join(LOG_FILE_NAME)
    }

    /// Reads the recorded PID. A missing or garbled file reads as `None`.
    pub fn read_pid(&self) -> Option<u32> {
        fs::read_to_string(self.pid_file()).ok()?.trim().parse().ok()
    }

    /// Records `pid` as the running instance.
    pub fn write_pid(&self, pid: u32) -> Result<(), DaemonError> {
        self.ensure_dir()?;
        let path = self.pid_file();
        fs::write(&path, pid.to_string()).map_err(|source| DaemonError::File {
            action: "write",
            path,
            source,
        })
    }

    /// Removes the PID file; a file that is already gone is fine.
    pub fn remove_pid(&self) {
        if let Err(e) = fs::remove_file(self.pid_file()) {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(error = %e, "Cannot remove PID file");
            }
        }
    }

    /// Returns the PID of a live daemon.
    ///
    /// A PID file naming a dead process is stale and gets removed.
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.read_pid()?;
        if is_process_running(pid) {
            return Some(pid);
        }
        debug!(pid, "Removing stale PID file");
        self.remove_pid();
        None
    }

    /// Truncates the log file and returns handles for stdout and stderr.
    pub fn open_log(&self) -> Result<(File, File), DaemonError> {
        self.ensure_dir()?;
        let path = self.log_file();
        let stdout = File::create(&path).map_err(|source| DaemonError::File {
            action: "create",
            path: path.clone(),
            source,
        })?;
        let stderr = stdout.try_clone().map_err(|source| DaemonError::File {
            action: "duplicate",
            path,
            source,
        })?;
        Ok((stdout, stderr))
    }

    fn ensure_dir(&self) -> Result<(), DaemonError> {
        fs::create_dir_all(&self.dir).map_err(|source| DaemonError::File {
            action: "create",
            path: self.dir.clone(),
            source,
        })
    }
}

/// Reports whether `pid` names a live process.
///
/// A process owned by another user still counts as running.
pub fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // Signal 0 checks existence without delivering anything
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Asks `pid` to shut down with SIGTERM.
pub fn send_terminate(pid: u32) -> Result<(), DaemonError> {
    let target = libc::pid_t::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| DaemonError::Signal {
            pid,
            source: io::Error::from(io::ErrorKind::InvalidInput),
        })?;
    if unsafe { libc::kill(target, libc::SIGTERM) } != 0 {
        return Err(DaemonError::Signal {
            pid,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Waits up to `timeout` for `pid` to exit. Returns `true` once it is gone.
pub fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !is_process_running(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Above any real PID limit, so never alive.
    const DEAD_PID: u32 = 999_999_999;

    #[test]
    fn test_paths_live_in_dir() {
        let files = DaemonFiles::new("/var/lib/ccm");
        assert_eq!(files.pid_file(), Path::new("/var/lib/ccm/ccmd.pid"));
        assert_eq!(files.log_file(), Path::new("/var/lib/ccm/ccmd.log"));
    }

    #[test]
    fn test_write_then_read_pid() {
        let dir = TempDir::new().unwrap();
        let files = DaemonFiles::new(dir.path().join("nested"));
        assert_eq!(files.read_pid(), None);

        files.write_pid(4242).unwrap();
        assert_eq!(files.read_pid(), Some(4242));

        files.remove_pid();
        assert_eq!(files.read_pid(), None);
        // Removing twice is harmless
        files.remove_pid();
    }

    #[test]
    fn test_garbled_pid_file_reads_none() {
        let dir = TempDir::new().unwrap();
        let files = DaemonFiles::new(dir.path());
        fs::write(files.pid_file(), "not a pid\n").unwrap();
        assert_eq!(files.read_pid(), None);
    }

    #[test]
    fn test_running_pid_for_live_process() {
        let dir = TempDir::new().unwrap();
        let files = DaemonFiles::new(dir.path());
        files.write_pid(std::process::id()).unwrap();
        assert_eq!(files.running_pid(), Some(std::process::id()));
        assert!(files.pid_file().exists());
    }

    #[test]
    fn test_running_pid_removes_stale_file() {
        let dir = TempDir::new().unwrap();
        let files = DaemonFiles::new(dir.path());
        files.write_pid(DEAD_PID).unwrap();
        assert_eq!(files.running_pid(), None);
        assert!(!files.pid_file().exists());
    }

    #[test]
    fn test_open_log_creates_file() {
        let dir = TempDir::new().unwrap();
        let files = DaemonFiles::new(dir.path().join("state"));
        let (mut stdout, mut stderr) = files.open_log().unwrap();

        use std::io::Write;
        write!(stdout, "out ").unwrap();
        write!(stderr, "err").unwrap();
        assert_eq!(fs::read_to_string(files.log_file()).unwrap(), "out err");
    }

    #[test]
    fn test_process_liveness() {
        assert!(is_process_running(std::process::id()));
        assert!(!is_process_running(DEAD_PID));
        assert!(!is_process_running(0));
    }

    #[test]
    fn test_send_terminate_rejects_bad_pid() {
        assert!(matches!(
            send_terminate(0),
            Err(DaemonError::Signal { pid: 0, .. })
        ));
        assert!(send_terminate(DEAD_PID).is_err());
    }

    #[test]
    fn test_wait_for_exit_gone_process() {
        assert!(wait_for_exit(DEAD_PID, Duration::from_millis(10)));
        assert!(!wait_for_exit(std::process::id(), Duration::from_millis(10)));
    }
}
