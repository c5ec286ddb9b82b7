//! Attachment Pump
//!
//! Two unidirectional copy tasks per attachment (pty -> client and
//! client -> pty). Both watch the session's closed signal. The first one to
//! finish releases the session through the registry, which flips the signal
//! and stops the other.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::registry::{SessionEntry, SessionRegistry};
use super::{ClientMessage, DetachReason};

pub(crate) fn spawn_pump(
    registry: SessionRegistry,
    entry: Arc<SessionEntry>,
    pty_out: mpsc::Receiver<Vec<u8>>,
    pty_in: mpsc::Sender<Vec<u8>>,
    inbound: mpsc::Receiver<ClientMessage>,
    outbound: mpsc::Sender<Vec<u8>>,
    grace: Duration,
) -> JoinHandle<DetachReason> {
    tokio::spawn(async move {
        let id = entry.id.clone();
        let mut downstream = tokio::spawn(pump_output(Arc::clone(&entry), pty_out, outbound, grace));
        let mut upstream = tokio::spawn(pump_input(Arc::clone(&entry), inbound, pty_in));

        let reason = tokio::select! {
            done = &mut downstream => {
                registry.cleanup(&id).await;
                let _ = upstream.await;
                done
            }
            done = &mut upstream => {
                registry.cleanup(&id).await;
                let _ = downstream.await;
                done
            }
        };

        let reason = reason.unwrap_or(DetachReason::SessionClosed);
        info!("Client detached from session {}: {:?}", id, reason);
        reason
    })
}

/// Resolves once the session starts releasing
async fn closing(closed: &mut watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed || closed.changed().await.is_err() {
            return;
        }
    }
}

fn closed_reason(entry: &SessionEntry) -> DetachReason {
    if entry.has_exited() {
        DetachReason::ChildExited
    } else {
        DetachReason::SessionClosed
    }
}

/// Forward whatever the exited shell left in the pty until the reader hits
/// EOF. Stops early once no output has arrived for `grace`, which covers
/// background jobs that keep the slave side open.
async fn drain_exited(
    entry: &SessionEntry,
    pty_out: &mut mpsc::Receiver<Vec<u8>>,
    outbound: &mpsc::Sender<Vec<u8>>,
    grace: Duration,
) {
    loop {
        match tokio::time::timeout(grace, pty_out.recv()).await {
            Ok(Some(bytes)) => {
                entry.touch();
                if outbound.send(bytes).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(_) => {
                debug!("Session {} output still open {:?} after exit", entry.id, grace);
                return;
            }
        }
    }
}

async fn pump_output(
    entry: Arc<SessionEntry>,
    mut pty_out: mpsc::Receiver<Vec<u8>>,
    outbound: mpsc::Sender<Vec<u8>>,
    grace: Duration,
) -> DetachReason {
    let mut closed = entry.closed_signal();
    loop {
        tokio::select! {
            chunk = pty_out.recv() => match chunk {
                Some(bytes) => {
                    entry.touch();
                    if outbound.send(bytes).await.is_err() {
                        return DetachReason::ClientClosed;
                    }
                }
                None => return DetachReason::ChildExited,
            },
            _ = closing(&mut closed) => {
                if entry.has_exited() {
                    drain_exited(&entry, &mut pty_out, &outbound, grace).await;
                } else {
                    // Released under a live shell: pass on what is buffered
                    while let Ok(bytes) = pty_out.try_recv() {
                        if outbound.try_send(bytes).is_err() {
                            break;
                        }
                    }
                }
                return closed_reason(&entry);
            }
            _ = outbound.closed() => return DetachReason::ClientClosed,
        }
    }
}

async fn pump_input(
    entry: Arc<SessionEntry>,
    mut inbound: mpsc::Receiver<ClientMessage>,
    pty_in: mpsc::Sender<Vec<u8>>,
) -> DetachReason {
    let mut closed = entry.closed_signal();
    loop {
        tokio::select! {
            _ = closing(&mut closed) => return closed_reason(&entry),
            message = inbound.recv() => match message {
                Some(ClientMessage::Input(bytes)) => {
                    entry.touch();
                    if pty_in.send(bytes).await.is_err() {
                        return DetachReason::ChildExited;
                    }
                }
                Some(ClientMessage::Resize { cols, rows }) => {
                    if cols == 0 || rows == 0 {
                        debug!("Ignoring resize to {}x{} on session {}", cols, rows, entry.id);
                    } else if let Err(e) = entry.resize(cols, rows) {
                        debug!("Resize failed on session {}: {}", entry.id, e);
                    }
                }
                None => return DetachReason::ClientClosed,
            },
        }
    }
}
