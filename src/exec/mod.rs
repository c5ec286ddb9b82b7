//! Bounded Command Execution
//!
//! Runs one non-interactive shell command inside a project root with a hard
//! wall-clock deadline and capped output capture.
//!
//! The command string is handed to the interpreter verbatim. Containment is
//! the confined working directory plus the deadline; there is no command
//! filtering.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::audit::{AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use crate::config::{CoreConfig, ExecConfig};
use crate::confine::{PathConfiner, ProjectRoot, ResolveMode};
use crate::error::{Error, Result};
use crate::models::CommandResult;
use crate::signals::signal_process_group;

/// Read buffer size for output pipes
const READ_CHUNK: usize = 8192;

/// Bytes captured from one output stream
#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Runs bounded shell commands
#[derive(Clone)]
pub struct ProcessRunner {
    config: ExecConfig,
    confiner: PathConfiner,
    audit: Arc<dyn AuditSink>,
}

impl ProcessRunner {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            config: config.exec.clone(),
            confiner: PathConfiner::from_config(&config.paths),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Deadline actually applied for a requested timeout
    pub fn effective_timeout(&self, requested_secs: Option<u64>) -> Duration {
        let secs = requested_secs
            .unwrap_or(self.config.default_timeout_secs)
            .clamp(1, self.config.max_timeout_secs.max(1));
        Duration::from_secs(secs)
    }

    /// Run `command` through the shell with its working directory at
    /// `cwd` (relative to `root`, default the root itself).
    ///
    /// A nonzero exit is a normal result. When the deadline fires the whole
    /// process group is killed and the result has `timed_out` set and no
    /// exit code.
    pub async fn execute(
        &self,
        root: &ProjectRoot,
        command: &str,
        timeout_secs: Option<u64>,
        cwd: Option<&str>,
    ) -> Result<CommandResult> {
        if command.trim().is_empty() {
            return Err(Error::InvalidInput {
                field: "command",
                reason: "command cannot be empty".to_string(),
            });
        }

        let cwd_relative = cwd.unwrap_or(".");
        let workdir = self
            .confiner
            .resolve(root, cwd_relative, ResolveMode::Existing)
            .map_err(|e| {
                if let Error::PathTraversal { path, .. } = &e {
                    self.audit.record(AuditEvent::traversal(path));
                }
                e
            })?;
        if !workdir.absolute().is_dir() {
            return Err(Error::NotADirectory {
                path: cwd_relative.to_string(),
            });
        }

        let deadline = self.effective_timeout(timeout_secs);
        info!(
            "Executing command in '{}' (timeout {:?}): {}",
            cwd_relative,
            deadline,
            truncate_command(command)
        );

        let mut cmd = Command::new(&self.config.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(workdir.absolute())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to spawn {}: {}", self.config.shell.display(), e);
                self.audit
                    .record(AuditEvent::command(command, AuditOutcome::Failed));
                return Err(Error::SpawnFailed {
                    command: truncate_command(command),
                    reason: e.kind().to_string(),
                });
            }
        };
        let pid = child.id();

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.start_kill();
            return Err(Error::SpawnFailed {
                command: truncate_command(command),
                reason: "output pipes were not created".to_string(),
            });
        };
        let limit = self.config.max_output_bytes;
        let stdout_task = tokio::spawn(read_capped(stdout, limit));
        let stderr_task = tokio::spawn(read_capped(stderr, limit));

        let (exit_code, timed_out) = match tokio::time::timeout(deadline, child.wait()).await {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(e)) => {
                if let Some(pid) = pid {
                    signal_process_group(pid, Signal::SIGKILL);
                }
                return Err(Error::from_io(cwd_relative, e));
            }
            Err(_) => {
                warn!(
                    "Command exceeded {:?}, killing process group: {}",
                    deadline,
                    truncate_command(command)
                );
                if let Some(pid) = pid {
                    signal_process_group(pid, Signal::SIGKILL);
                }
                let _ = child.start_kill();
                let _ = child.wait().await;
                (None, true)
            }
        };
        let duration = started.elapsed();

        let grace = Duration::from_millis(self.config.kill_grace_ms);
        let (stdout, stderr) = tokio::join!(
            collect(stdout_task, grace, pid),
            collect(stderr_task, grace, pid)
        );

        if stdout.truncated || stderr.truncated {
            debug!("Output of '{}' truncated at {} bytes", truncate_command(command), limit);
        }

        let result = CommandResult {
            command: command.to_string(),
            exit_code,
            stdout: String::from_utf8_lossy(&stdout.bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
            duration,
            timed_out,
        };

        let outcome = if result.timed_out {
            AuditOutcome::TimedOut
        } else if result.success() {
            AuditOutcome::Succeeded
        } else {
            AuditOutcome::Failed
        };
        self.audit.record(AuditEvent::command(command, outcome));
        debug!(
            "Command finished: exit={:?} timed_out={} in {:?}",
            result.exit_code, result.timed_out, result.duration
        );

        Ok(result)
    }
}

/// Drain a pipe to EOF, keeping at most `limit` bytes
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Capture {
    let mut capture = Capture::default();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(capture.bytes.len());
                let keep = n.min(room);
                capture.bytes.extend_from_slice(&buf[..keep]);
                if keep < n {
                    capture.truncated = true;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Output pipe read error: {}", e);
                break;
            }
        }
    }
    capture
}

/// Wait for a reader to hit EOF.
///
/// Background jobs of the command can hold the pipe open after the shell
/// exits; past `grace` the group is killed so the pipe closes.
async fn collect(mut task: JoinHandle<Capture>, grace: Duration, pid: Option<u32>) -> Capture {
    if let Ok(joined) = tokio::time::timeout(grace, &mut task).await {
        return joined.unwrap_or_default();
    }

    if let Some(pid) = pid {
        signal_process_group(pid, Signal::SIGKILL);
    }
    match tokio::time::timeout(grace, &mut task).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            warn!("Output pipe still open after kill, discarding capture");
            task.abort();
            Capture::default()
        }
    }
}

fn truncate_command(command: &str) -> String {
    const MAX_DISPLAY: usize = 100;
    if command.chars().count() > MAX_DISPLAY {
        let head: String = command.chars().take(MAX_DISPLAY).collect();
        format!("{}...", head)
    } else {
        command.to_string()
    }
}
