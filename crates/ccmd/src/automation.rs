//! Session commands: open a new assistant session, focus an existing one.
//!
//! Both are one-way, best-effort requests to the terminal. Nothing is
//! retried and nothing is reported back beyond a `warn!` log line.
//!
//! Backends:
//! - [`AppleScriptAutomation`]: Terminal.app, via `osascript -`
//! - [`TmuxAutomation`]: tmux windows and panes
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Command failures are returned as errors, then logged by `SessionCommands`

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use ccm_core::Session;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{AutomationBackend, MonitorConfig};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while driving the terminal.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// The automation tool could not be started.
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The automation tool ran and reported failure.
    #[error("{command} failed: {message}")]
    CommandFailed {
        command: &'static str,
        message: String,
    },
}

// ============================================================================
// Terminal Automation Trait
// ============================================================================

/// Blocking terminal automation.
pub trait TerminalAutomation: Send + Sync {
    /// Opens a new terminal window or tab running `executable`.
    fn open_new_session(&self, executable: &str) -> Result<(), AutomationError>;

    /// Brings the tab bound to `device` (e.g. "/dev/ttys003") to the front.
    ///
    /// Succeeds without doing anything when no tab uses that terminal.
    fn focus_tty(&self, device: &str) -> Result<(), AutomationError>;
}

// ============================================================================
// AppleScript (Terminal.app)
// ============================================================================

/// Drives Terminal.app through `osascript`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppleScriptAutomation;

impl AppleScriptAutomation {
    /// Script that opens a tab running `executable` and activates Terminal.
    pub fn new_session_script(executable: &str) -> String {
        format!(
            "tell application \"Terminal\"\n    do script \"{}\"\n    activate\nend tell\n",
            escape_applescript(executable)
        )
    }

    /// Script that selects the first tab whose tty is `device`.
    pub fn focus_script(device: &str) -> String {
        format!(
            r#"tell application "Terminal"
    set targetTTY to "{}"
    repeat with w in windows
        repeat with t in tabs of w
            if tty of t is targetTTY then
                set index of w to 1
                set selected tab of w to t
                activate
                return
            end if
        end repeat
    end repeat
end tell
"#,
            escape_applescript(device)
        )
    }
}

impl TerminalAutomation for AppleScriptAutomation {
    fn open_new_session(&self, executable: &str) -> Result<(), AutomationError> {
        run_osascript(&Self::new_session_script(executable))
    }

    fn focus_tty(&self, device: &str) -> Result<(), AutomationError> {
        run_osascript(&Self::focus_script(device))
    }
}

/// Escapes a value for use inside an AppleScript string literal.
pub fn escape_applescript(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Pipes a script into `osascript -` and waits for it.
fn run_osascript(script: &str) -> Result<(), AutomationError> {
    let mut child = Command::new("osascript")
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| AutomationError::Spawn {
            command: "osascript",
            source,
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(script.as_bytes())
            .map_err(|source| AutomationError::Spawn {
                command: "osascript",
                source,
            })?;
        // Dropping stdin closes the pipe so osascript starts running
    }

    let output = child
        .wait_with_output()
        .map_err(|source| AutomationError::Spawn {
            command: "osascript",
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AutomationError::CommandFailed {
            command: "osascript",
            message: stderr.trim().to_string(),
        });
    }

    Ok(())
}

// ============================================================================
// tmux
// ============================================================================

/// One row of `tmux list-panes -a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub pane_id: String,
    pub tty: String,
    pub session_name: String,
    pub window_id: String,
}

/// Format string matching [`parse_pane_list`]. Tab separated, with the
/// session name last since it may contain spaces.
const PANE_FORMAT: &str = "#{pane_id}\t#{pane_tty}\t#{window_id}\t#{session_name}";

/// Drives tmux: new sessions open in a new window, focus selects the pane.
#[derive(Debug, Clone, Copy, Default)]
pub struct TmuxAutomation;

impl TmuxAutomation {
    fn list_panes() -> Result<Vec<PaneInfo>, AutomationError> {
        let output = run_tmux(&["list-panes", "-a", "-F", PANE_FORMAT])?;
        Ok(parse_pane_list(&output))
    }
}

impl TerminalAutomation for TmuxAutomation {
    fn open_new_session(&self, executable: &str) -> Result<(), AutomationError> {
        run_tmux(&["new-window", executable]).map(|_| ())
    }

    fn focus_tty(&self, device: &str) -> Result<(), AutomationError> {
        let panes = Self::list_panes()?;
        let Some(pane) = find_pane_for_tty(&panes, device) else {
            debug!(device, "No tmux pane uses this terminal");
            return Ok(());
        };

        // Switching the client fails outside an attached client; the pane
        // and window are still selected for the next attach.
        if let Err(e) = run_tmux(&["switch-client", "-t", &pane.session_name]) {
            debug!(error = %e, "switch-client failed");
        }
        run_tmux(&["select-window", "-t", &pane.window_id])?;
        run_tmux(&["select-pane", "-t", &pane.pane_id])?;
        Ok(())
    }
}

/// Parses `list-panes` output in [`PANE_FORMAT`], skipping malformed rows.
pub fn parse_pane_list(output: &str) -> Vec<PaneInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(4, '\t');
            let pane_id = parts.next().filter(|p| !p.is_empty())?;
            let tty = parts.next().filter(|p| !p.is_empty())?;
            let window_id = parts.next().filter(|p| !p.is_empty())?;
            let session_name = parts.next().filter(|p| !p.is_empty())?;
            Some(PaneInfo {
                pane_id: pane_id.to_string(),
                tty: tty.to_string(),
                session_name: session_name.to_string(),
                window_id: window_id.to_string(),
            })
        })
        .collect()
}

/// Returns the first pane bound to `device`.
pub fn find_pane_for_tty<'a>(panes: &'a [PaneInfo], device: &str) -> Option<&'a PaneInfo> {
    panes.iter().find(|pane| pane.tty == device)
}

fn run_tmux(args: &[&str]) -> Result<String, AutomationError> {
    let output = Command::new("tmux")
        .args(args)
        .output()
        .map_err(|source| AutomationError::Spawn {
            command: "tmux",
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AutomationError::CommandFailed {
            command: "tmux",
            message: format!("{}: {}", args.first().copied().unwrap_or(""), stderr.trim()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ============================================================================
// Session Commands
// ============================================================================

/// Dispatches session commands to a terminal backend without blocking.
#[derive(Clone)]
pub struct SessionCommands {
    automation: Arc<dyn TerminalAutomation>,
    executable: String,
}

impl SessionCommands {
    /// Creates commands over the given backend.
    pub fn new(automation: Arc<dyn TerminalAutomation>, executable: impl Into<String>) -> Self {
        Self {
            automation,
            executable: executable.into(),
        }
    }

    /// Creates commands using the configured backend.
    pub fn from_config(config: &MonitorConfig) -> Self {
        let automation: Arc<dyn TerminalAutomation> = match config.automation.resolve() {
            AutomationBackend::AppleScript => Arc::new(AppleScriptAutomation),
            AutomationBackend::Tmux | AutomationBackend::Auto => Arc::new(TmuxAutomation),
        };
        Self::new(automation, config.executable_name.clone())
    }

    /// Opens a new terminal running the assistant.
    ///
    /// Returns immediately. The handle may be awaited or dropped; failures
    /// are only logged.
    pub fn open_new_session(&self) -> JoinHandle<()> {
        let automation = Arc::clone(&self.automation);
        let executable = self.executable.clone();

        tokio::task::spawn_blocking(move || {
            match automation.open_new_session(&executable) {
                Ok(()) => info!(executable = %executable, "Opened new session"),
                Err(e) => warn!(error = %e, "Failed to open new session"),
            }
        })
    }

    /// Brings the terminal tab hosting `session` to the front.
    ///
    /// Returns immediately. The handle may be awaited or dropped; failures
    /// are only logged.
    pub fn focus_session(&self, session: &Session) -> JoinHandle<()> {
        let automation = Arc::clone(&self.automation);
        let device = session.tty_device();
        let pid = session.pid;

        tokio::task::spawn_blocking(move || {
            match automation.focus_tty(&device) {
                Ok(()) => debug!(pid, device = %device, "Focus requested"),
                Err(e) => warn!(pid, device = %device, error = %e, "Failed to focus session"),
            }
        })
    }
}
