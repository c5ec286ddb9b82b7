//! Security Audit Events
//!
//! Structured records for traversal rejections, command executions and
//! terminal session start/stop, delivered to an append-only [`AuditSink`].
//!
//! ## Security Policy
//!
//! - Subjects are relative paths, truncated commands or session ids
//! - **NEVER** record resolved absolute paths or command output
//! - Subjects are sanitized against log injection before delivery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Longest subject kept in an event
const MAX_SUBJECT_LEN: usize = 200;

/// Longest command prefix kept in an event
const MAX_COMMAND_LEN: usize = 100;

/// What kind of security-relevant thing happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    /// A path was refused by the confiner
    PathTraversal,
    /// A non-interactive command ran
    CommandExecution,
    /// A terminal session was started
    SessionStart,
    /// A terminal session was released
    SessionStop,
}

impl AuditCategory {
    pub fn description(&self) -> &'static str {
        match self {
            AuditCategory::PathTraversal => "Path traversal attempt",
            AuditCategory::CommandExecution => "Shell command executed",
            AuditCategory::SessionStart => "Terminal session started",
            AuditCategory::SessionStop => "Terminal session stopped",
        }
    }
}

/// How it ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allowed,
    Rejected,
    Succeeded,
    Failed,
    TimedOut,
}

impl AuditOutcome {
    /// Outcomes that should stand out in operator logs
    pub fn is_suspicious(&self) -> bool {
        matches!(self, AuditOutcome::Rejected)
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub category: AuditCategory,
    pub subject: String,
    pub outcome: AuditOutcome,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Build an event stamped now, with a sanitized subject
    pub fn new(category: AuditCategory, subject: &str, outcome: AuditOutcome) -> Self {
        Self {
            category,
            subject: sanitize_subject(subject),
            outcome,
            timestamp: Utc::now(),
        }
    }

    pub fn traversal(relative_path: &str) -> Self {
        Self::new(
            AuditCategory::PathTraversal,
            &format!("path={}", relative_path),
            AuditOutcome::Rejected,
        )
    }

    pub fn command(command: &str, outcome: AuditOutcome) -> Self {
        let display: String = command.chars().take(MAX_COMMAND_LEN).collect();
        Self::new(
            AuditCategory::CommandExecution,
            &format!("command={}", display),
            outcome,
        )
    }

    pub fn session(category: AuditCategory, session_id: &str, outcome: AuditOutcome) -> Self {
        Self::new(category, &format!("session={}", session_id), outcome)
    }
}

/// Append-only destination for audit events
pub trait AuditSink: Send + Sync {
    /// Record one event. Must not block for long and must not panic.
    fn record(&self, event: AuditEvent);
}

/// Default sink: one structured tracing line per event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let desc = event.category.description();
        if event.outcome.is_suspicious() {
            warn!(
                target: "projectjail::audit",
                category = ?event.category,
                outcome = ?event.outcome,
                subject = %event.subject,
                "SECURITY AUDIT: {}",
                desc
            );
        } else {
            info!(
                target: "projectjail::audit",
                category = ?event.category,
                outcome = ?event.outcome,
                subject = %event.subject,
                "SECURITY AUDIT: {}",
                desc
            );
        }
    }
}

/// Appends one JSON object per line to a file
pub struct JsonLinesAuditSink {
    file: Mutex<File>,
}

impl JsonLinesAuditSink {
    /// Open (or create) the log file in append mode
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, event: AuditEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{}", line) {
            error!("Failed to append audit event: {}", e);
        }
    }
}

/// Keeps events in memory; used by tests and embedding applications
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Events of one category
    pub fn of_category(&self, category: AuditCategory) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.category == category)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Strip control characters and cap the length to prevent log injection
fn sanitize_subject(subject: &str) -> String {
    subject
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_SUBJECT_LEN)
        .collect()
}
