//! Monitor configuration.
//!
//! Loaded from a TOML file (`$CCM_CONFIG`, else
//! `~/.config/ccm/config.toml`), then overridden by environment variables.
//! A missing file means defaults; a malformed one is an error.
//!
//! Only deployment details live here. The classification thresholds and
//! matching tolerances are fixed constants in `ccm_core` and `locator`.
//!
//! ```toml
//! executable_name = "claude"
//! log_root = "/Users/me/.claude/projects"
//! excluded_dir_names = ["me-work"]
//! automation = "tmux"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Environment variable pointing at an alternate config file.
pub const CONFIG_ENV: &str = "CCM_CONFIG";

/// Environment variable overriding [`MonitorConfig::log_root`].
pub const LOG_ROOT_ENV: &str = "CCM_LOG_ROOT";

/// Environment variable overriding [`MonitorConfig::executable_name`].
pub const EXECUTABLE_ENV: &str = "CCM_EXECUTABLE";

/// Default name of the assistant executable.
pub const DEFAULT_EXECUTABLE: &str = "claude";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`MonitorConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// ============================================================================
// Configuration
// ============================================================================

/// Which terminal automation backend session commands use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutomationBackend {
    /// AppleScript on macOS, tmux elsewhere.
    #[default]
    Auto,
    /// Terminal.app via `osascript`.
    AppleScript,
    /// tmux panes and windows.
    Tmux,
}

impl AutomationBackend {
    /// Resolves `Auto` for the current platform.
    #[must_use]
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(target_os = "macos") => Self::AppleScript,
            Self::Auto => Self::Tmux,
            other => other,
        }
    }
}

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Exact executable name matched in the process table.
    pub executable_name: String,

    /// Directory holding one subdirectory of session logs per project.
    pub log_root: PathBuf,

    /// Working-directory names too generic to title a session with.
    ///
    /// The operating user's name is always excluded.
    pub excluded_dir_names: Vec<String>,

    /// Terminal automation backend for focus/open commands.
    pub automation: AutomationBackend,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            executable_name: DEFAULT_EXECUTABLE.to_string(),
            log_root: default_log_root(),
            excluded_dir_names: Vec::new(),
            automation: AutomationBackend::default(),
        }
    }
}

impl MonitorConfig {
    /// Loads configuration from the default location plus environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a config file exists but is unreadable or
    /// malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Loads a config file, returning defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is unreadable or malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies environment overrides using the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(LOG_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.log_root = PathBuf::from(root);
        }
        if let Some(name) = lookup(EXECUTABLE_ENV).filter(|v| !v.is_empty()) {
            self.executable_name = name;
        }
    }
}

/// Returns `~/.claude/projects`, or a relative path if there is no home.
pub fn default_log_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("projects")
}

/// Returns the config file path: `$CCM_CONFIG` or `<config_dir>/ccm/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .or_else(|| dirs::config_dir().map(|d| d.join("ccm").join("config.toml")))
}
