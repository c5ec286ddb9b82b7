//! Command Result Model
//!
//! Outcome of one bounded, non-interactive command.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Captured outcome of a command run by the process runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// The command string as submitted
    pub command: String,

    /// Exit code, absent when the process was killed by a signal
    pub exit_code: Option<i32>,

    /// Captured standard output (lossy UTF-8)
    pub stdout: String,

    /// Captured standard error (lossy UTF-8)
    pub stderr: String,

    /// Output past the capture ceiling was discarded
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,

    /// Wall-clock time from spawn to exit (or kill)
    pub duration: Duration,

    /// The deadline fired and the process group was killed
    pub timed_out: bool,
}

impl CommandResult {
    /// Exited normally with status 0
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Turn a timed-out result into [`Error::Timeout`]; anything else passes through
    pub fn into_completed(self) -> Result<Self> {
        if self.timed_out {
            return Err(Error::Timeout {
                command: self.command,
                duration: self.duration,
            });
        }
        Ok(self)
    }
}
