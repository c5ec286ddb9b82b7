//! Terminal Session Model
//!
//! Lifecycle state and the read-only view of a live terminal session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a terminal session
///
/// `Created -> Running -> Closing -> Closed`, or `-> Failed` from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Pty allocated, shell not confirmed yet
    #[default]
    Created,
    /// Shell is running and may be attached
    Running,
    /// Release in progress
    Closing,
    /// Process and pty released
    Closed,
    /// Start or release went wrong
    Failed,
}

impl SessionState {
    /// Whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Running, Closing)
                | (Closing, Closed)
                | (Created, Failed)
                | (Running, Failed)
                | (Closing, Failed)
        )
    }

    /// Closed and Failed are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }
}

/// Snapshot of one live session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// A client is currently attached
    pub attached: bool,
    /// Shell process id
    pub pid: Option<u32>,
}
