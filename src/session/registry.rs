//! Session Registry
//!
//! Lock-guarded map from session id to live session. Each entry keeps its
//! own small locks so sessions never block one another; the map lock is only
//! held for insert, lookup and remove.
//!
//! Release happens in [`SessionRegistry::cleanup`]: whoever removes the
//! entry from the map performs the release, every later caller finds nothing
//! and returns. That makes the three triggers (child exit, client
//! disconnect, explicit request) race-free.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use portable_pty::{ChildKiller, MasterPty};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinSet;
use uuid::Uuid;

use super::pty::{pty_size, spawn_shell, PtyHandle, PtyStreams};
use super::pump::spawn_pump;
use super::{Attachment, ClientMessage};
use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use crate::config::{CoreConfig, TerminalConfig};
use crate::confine::ProjectRoot;
use crate::error::{Error, Result};
use crate::models::{SessionInfo, SessionState};
use crate::signals::signal_process_group;

/// Lock a std mutex, recovering the data if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One live session: the shell, its pty and the channel ends to its threads
pub(crate) struct SessionEntry {
    pub id: String,
    pub root: ProjectRoot,
    pub created_at: DateTime<Utc>,
    pub pid: Option<u32>,
    state: Mutex<SessionState>,
    last_activity: Mutex<DateTime<Utc>>,
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    killer: Mutex<Option<Box<dyn ChildKiller + Send + Sync>>>,
    input: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    output: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    attached: AtomicBool,
    exited: watch::Receiver<bool>,
    closed: watch::Sender<bool>,
}

impl SessionEntry {
    fn new(id: String, root: ProjectRoot, handle: PtyHandle, streams: PtyStreams) -> Self {
        let now = Utc::now();
        let (closed, _) = watch::channel(false);
        Self {
            id,
            root,
            created_at: now,
            pid: handle.pid,
            state: Mutex::new(SessionState::Created),
            last_activity: Mutex::new(now),
            master: Mutex::new(Some(handle.master)),
            killer: Mutex::new(Some(handle.killer)),
            input: Mutex::new(Some(streams.input)),
            output: Mutex::new(Some(streams.output)),
            attached: AtomicBool::new(false),
            exited: streams.exited,
            closed,
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Move to `next` if the transition is legal
    fn transition(&self, next: SessionState) -> bool {
        let mut state = lock(&self.state);
        if state.can_transition_to(next) {
            *state = next;
            true
        } else {
            debug!(
                "Session {} ignoring transition {:?} -> {:?}",
                self.id, *state, next
            );
            false
        }
    }

    pub fn touch(&self) {
        *lock(&self.last_activity) = Utc::now();
    }

    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// Receiver that flips to `true` once the session is being released
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let master = lock(&self.master);
        let Some(master) = master.as_ref() else {
            return Err(Error::SessionNotFound {
                session_id: self.id.clone(),
            });
        };
        master.resize(pty_size(cols, rows)).map_err(|e| Error::Io {
            path: format!("session {}", self.id),
            source: std::io::Error::other(e.to_string()),
        })?;
        debug!("Resized session {} to {}x{}", self.id, cols, rows);
        Ok(())
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            state: self.state(),
            created_at: self.created_at,
            last_activity: *lock(&self.last_activity),
            attached: self.attached.load(Ordering::SeqCst),
            pid: self.pid,
        }
    }

    /// Terminate the shell and drop the pty. Called exactly once per entry.
    ///
    /// Ends in `Closed` for a running shell that went away on its own or on
    /// SIGHUP/SIGTERM. A session that never reached `Running`, or whose
    /// shell had to be SIGKILLed, ends in `Failed`.
    async fn release(&self, grace: Duration) -> SessionState {
        let mut clean = self.transition(SessionState::Closing);
        let _ = self.closed.send(true);
        lock(&self.input).take();

        if !self.has_exited() {
            if let Some(pid) = self.pid {
                // Interactive shells ignore SIGTERM, a hangup ends them
                signal_process_group(pid, Signal::SIGHUP);
                signal_process_group(pid, Signal::SIGTERM);
            }

            let mut exited = self.exited.clone();
            let exited_in_time = tokio::time::timeout(grace, exited.wait_for(|done| *done))
                .await
                .is_ok();
            if !exited_in_time {
                warn!(
                    "Session {} did not exit within {:?}, sending SIGKILL",
                    self.id, grace
                );
                clean = false;
                if let Some(pid) = self.pid {
                    signal_process_group(pid, Signal::SIGKILL);
                }
                if let Some(killer) = lock(&self.killer).as_mut() {
                    let _ = killer.kill();
                }
            }
        }

        lock(&self.killer).take();
        lock(&self.master).take();
        lock(&self.output).take();
        self.transition(if clean {
            SessionState::Closed
        } else {
            SessionState::Failed
        });
        self.state()
    }
}

impl Drop for SessionEntry {
    fn drop(&mut self) {
        // Entries dropped without a release (registry dropped) still take
        // their shell down with them
        if let Some(mut killer) = lock(&self.killer).take() {
            let _ = killer.kill();
        }
    }
}

/// Owns every live terminal session
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<SessionEntry>>>>,
    config: Arc<TerminalConfig>,
    audit: Arc<dyn AuditSink>,
}

impl SessionRegistry {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config.terminal.clone()),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    fn close_grace(&self) -> Duration {
        Duration::from_millis(self.config.close_grace_ms)
    }

    fn exhausted(&self) -> Error {
        Error::ResourceExhausted {
            resource: "terminal sessions",
            limit: self.config.max_sessions,
        }
    }

    /// Spawn an interactive shell in `root` and register it
    pub async fn start(&self, root: &ProjectRoot) -> Result<String> {
        if self.sessions.read().await.len() >= self.config.max_sessions {
            warn!("Refusing new session: {} sessions live", self.config.max_sessions);
            return Err(self.exhausted());
        }

        let config = Arc::clone(&self.config);
        let cwd = root.path().to_path_buf();
        let spawned = tokio::task::spawn_blocking(move || spawn_shell(&config, &cwd))
            .await
            .map_err(|e| Error::SpawnFailed {
                command: self.config.shell.display().to_string(),
                reason: e.to_string(),
            })?;
        let (handle, streams) = match spawned {
            Ok(parts) => parts,
            Err(e) => {
                error!("Failed to start terminal session: {}", e);
                self.audit.record(AuditEvent::session(
                    AuditCategory::SessionStart,
                    "-",
                    AuditOutcome::Failed,
                ));
                return Err(e);
            }
        };

        let id = Uuid::new_v4().to_string();
        let entry = Arc::new(SessionEntry::new(id.clone(), root.clone(), handle, streams));

        {
            let mut sessions = self.sessions.write().await;
            // Re-check: other starts may have won the race while we spawned
            if sessions.len() >= self.config.max_sessions {
                drop(sessions);
                let state = entry.release(self.close_grace()).await;
                debug!("Discarded over-limit session {} ({:?})", id, state);
                return Err(self.exhausted());
            }
            entry.transition(SessionState::Running);
            sessions.insert(id.clone(), Arc::clone(&entry));
        }

        self.audit.record(AuditEvent::session(
            AuditCategory::SessionStart,
            &id,
            AuditOutcome::Succeeded,
        ));
        info!("Started terminal session {} (pid {:?})", id, entry.pid);

        // Release the session as soon as the shell exits on its own
        let registry = self.clone();
        let mut exited = entry.exited.clone();
        let watched = id.clone();
        tokio::spawn(async move {
            let _ = exited.wait_for(|done| *done).await;
            registry.cleanup(&watched).await;
        });

        Ok(id)
    }

    /// Start pumping between `inbound` and the session's pty.
    ///
    /// Pumping stops when the client drops either channel end, the shell
    /// exits or the session is cleaned up; the session is released in all
    /// three cases.
    pub async fn attach(
        &self,
        session_id: &str,
        inbound: mpsc::Receiver<ClientMessage>,
    ) -> Result<Attachment> {
        let entry = self.entry(session_id).await?;
        if !entry.state().is_running() {
            return Err(Error::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        if entry.attached.swap(true, Ordering::SeqCst) {
            return Err(Error::SessionBusy {
                session_id: session_id.to_string(),
            });
        }

        let pty_out = lock(&entry.output).take();
        let pty_in = lock(&entry.input).clone();
        let (Some(pty_out), Some(pty_in)) = (pty_out, pty_in) else {
            return Err(Error::SessionNotFound {
                session_id: session_id.to_string(),
            });
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let task = spawn_pump(
            self.clone(),
            entry,
            pty_out,
            pty_in,
            inbound,
            outbound_tx,
            self.close_grace(),
        );
        info!("Client attached to session {}", session_id);

        Ok(Attachment {
            output: outbound_rx,
            task,
        })
    }

    /// Change the terminal size of a session
    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> Result<()> {
        if cols == 0 || rows == 0 {
            return Err(Error::InvalidInput {
                field: "terminal size",
                reason: format!("{}x{} has a zero dimension", cols, rows),
            });
        }
        self.entry(session_id).await?.resize(cols, rows)
    }

    /// Ids of live sessions started in `root`, oldest first
    pub async fn list(&self, root: &ProjectRoot) -> Vec<String> {
        self.sessions(root).await.into_iter().map(|s| s.id).collect()
    }

    /// Snapshots of live sessions started in `root`, oldest first
    pub async fn sessions(&self, root: &ProjectRoot) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<SessionInfo> = sessions
            .values()
            .filter(|entry| entry.root == *root && !entry.state().is_terminal())
            .map(|entry| entry.info())
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        infos
    }

    /// Snapshot of one session
    pub async fn info(&self, session_id: &str) -> Result<SessionInfo> {
        Ok(self.entry(session_id).await?.info())
    }

    /// Number of live sessions across all roots
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Release a session. Unknown or already released ids are a no-op.
    pub async fn cleanup(&self, session_id: &str) {
        let removed = self.sessions.write().await.remove(session_id);
        let Some(entry) = removed else {
            debug!("Session {} already released", session_id);
            return;
        };

        let state = entry.release(self.close_grace()).await;
        let outcome = if state == SessionState::Failed {
            AuditOutcome::Failed
        } else {
            AuditOutcome::Succeeded
        };
        self.audit.record(AuditEvent::session(
            AuditCategory::SessionStop,
            session_id,
            outcome,
        ));
        info!("Released terminal session {} ({:?})", session_id, state);
    }

    /// Release every live session
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        if ids.is_empty() {
            return;
        }
        info!("Shutting down {} terminal sessions", ids.len());

        let mut releases = JoinSet::new();
        for id in ids {
            let registry = self.clone();
            releases.spawn(async move { registry.cleanup(&id).await });
        }
        while releases.join_next().await.is_some() {}
    }

    async fn entry(&self, session_id: &str) -> Result<Arc<SessionEntry>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }
}
