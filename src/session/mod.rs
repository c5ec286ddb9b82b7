//! Interactive Terminal Sessions
//!
//! A [`SessionRegistry`] owns every live shell running on a pseudo-terminal.
//! Sessions are started inside a project root, attached by at most one
//! client at a time and released exactly once, whichever of child exit,
//! client disconnect or explicit cleanup happens first.
//!
//! ```no_run
//! use projectjail::{CoreConfig, ProjectRoot, SessionRegistry};
//! use projectjail::session::ClientMessage;
//! use tokio::sync::mpsc;
//!
//! # async fn demo() -> projectjail::Result<()> {
//! let registry = SessionRegistry::new(&CoreConfig::default());
//! let root = ProjectRoot::new("/srv/projects/demo")?;
//! let id = registry.start(&root).await?;
//!
//! let (tx, rx) = mpsc::channel(16);
//! let mut attachment = registry.attach(&id, rx).await?;
//! tx.send(ClientMessage::Input(b"ls\n".to_vec())).await.ok();
//! if let Some(bytes) = attachment.output.recv().await {
//!     println!("{}", String::from_utf8_lossy(&bytes));
//! }
//! registry.cleanup(&id).await;
//! # Ok(())
//! # }
//! ```

mod pty;
mod pump;
mod registry;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use registry::SessionRegistry;

/// Message from an attached client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    /// Raw bytes for the shell's stdin
    Input(Vec<u8>),
    /// New terminal dimensions
    Resize { cols: u16, rows: u16 },
}

/// Why an attachment ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetachReason {
    /// The client dropped its inbound sender or outbound receiver
    ClientClosed,
    /// The shell exited
    ChildExited,
    /// The session was released by someone else
    SessionClosed,
}

/// A live attachment to a session
#[derive(Debug)]
pub struct Attachment {
    /// Bytes produced by the shell
    pub output: mpsc::Receiver<Vec<u8>>,
    /// Resolves once pumping stopped and the session was released
    pub task: JoinHandle<DetachReason>,
}
