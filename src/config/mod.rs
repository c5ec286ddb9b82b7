//! Configuration for projectjail
//!
//! Limits and defaults for the file engine, the process runner and the
//! terminal registry. Values come from a TOML file (see [`loader`]) and can
//! be overridden through environment variables.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use loader::ConfigLoader;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// File operation limits
    pub files: FilesConfig,

    /// Non-interactive command execution
    pub exec: ExecConfig,

    /// Interactive terminal sessions
    pub terminal: TerminalConfig,

    /// Path resolution
    pub paths: PathsConfig,
}

/// File operation limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Hard ceiling for a full read
    pub max_read_bytes: u64,

    /// Ceiling for a preview read
    pub max_preview_bytes: u64,

    /// Maximum entries returned by one listing
    pub max_listing_entries: usize,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_read_bytes: 10 * 1024 * 1024, // 10 MiB
            max_preview_bytes: 10 * 1024,     // 10 KiB
            max_listing_entries: 100_000,
        }
    }
}

/// Non-interactive command execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Interpreter receiving the command string via `-c`
    pub shell: PathBuf,

    /// Deadline used when the caller supplies none
    pub default_timeout_secs: u64,

    /// Upper bound for caller supplied deadlines
    pub max_timeout_secs: u64,

    /// Capture ceiling per stream
    pub max_output_bytes: usize,

    /// Time to wait for output pipes to close after a forced kill
    pub kill_grace_ms: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
            default_timeout_secs: 30,
            max_timeout_secs: 3600,
            max_output_bytes: 1024 * 1024,
            kill_grace_ms: 2000,
        }
    }
}

/// Interactive terminal sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Interactive shell executable
    pub shell: PathBuf,

    /// Shell arguments
    pub shell_args: Vec<String>,

    /// Maximum number of live sessions across all roots
    pub max_sessions: usize,

    /// Initial terminal width
    pub cols: u16,

    /// Initial terminal height
    pub rows: u16,

    /// SIGTERM to SIGKILL escalation delay on close
    pub close_grace_ms: u64,

    /// Value exported as TERM to the shell
    pub term: String,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: default_interactive_shell(),
            shell_args: Vec::new(),
            max_sessions: 100,
            cols: 80,
            rows: 24,
            close_grace_ms: 2000,
            term: "xterm-256color".to_string(),
        }
    }
}

/// Path resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Symlinks followed during one resolution before giving up
    pub max_symlink_hops: usize,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            max_symlink_hops: 40,
        }
    }
}

/// The user's shell from the environment, `/bin/bash` otherwise
pub fn default_interactive_shell() -> PathBuf {
    std::env::var_os("SHELL")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/bin/bash"))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Invalid value in environment variable {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreConfig {
    /// Check limits for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            }
        }

        if self.files.max_read_bytes == 0 {
            return Err(invalid("files.max_read_bytes", "must be greater than 0"));
        }
        if self.files.max_preview_bytes == 0 {
            return Err(invalid("files.max_preview_bytes", "must be greater than 0"));
        }
        if self.files.max_preview_bytes > self.files.max_read_bytes {
            return Err(invalid(
                "files.max_preview_bytes",
                "cannot exceed files.max_read_bytes",
            ));
        }
        if self.files.max_listing_entries == 0 {
            return Err(invalid("files.max_listing_entries", "must be greater than 0"));
        }

        if self.exec.shell.as_os_str().is_empty() {
            return Err(invalid("exec.shell", "cannot be empty"));
        }
        if self.exec.max_timeout_secs == 0 {
            return Err(invalid("exec.max_timeout_secs", "must be greater than 0"));
        }
        if self.exec.default_timeout_secs == 0
            || self.exec.default_timeout_secs > self.exec.max_timeout_secs
        {
            return Err(invalid(
                "exec.default_timeout_secs",
                "must be between 1 and exec.max_timeout_secs",
            ));
        }
        if self.exec.max_output_bytes == 0 {
            return Err(invalid("exec.max_output_bytes", "must be greater than 0"));
        }

        if self.terminal.shell.as_os_str().is_empty() {
            return Err(invalid("terminal.shell", "cannot be empty"));
        }
        if self.terminal.max_sessions == 0 {
            return Err(invalid("terminal.max_sessions", "must be greater than 0"));
        }
        if self.terminal.cols == 0 || self.terminal.rows == 0 {
            return Err(invalid("terminal.cols/rows", "must be greater than 0"));
        }

        if self.paths.max_symlink_hops == 0 {
            return Err(invalid("paths.max_symlink_hops", "must be greater than 0"));
        }

        Ok(())
    }
}
