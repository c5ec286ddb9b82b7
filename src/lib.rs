//! projectjail - confined file and shell operations for isolated projects
//!
//! This library is the part of a project backend that touches the operating
//! system on behalf of remote callers. Every operation is bounded by a
//! [`ProjectRoot`]: nothing may be read, written or executed outside it, and
//! no command may run without a deadline.
//!
//! ## Module Organization
//!
//! - [`confine`] - `PathConfiner`: relative path -> root-confined absolute path
//! - [`fs_ops`] - `FileOperationEngine`: list, read, create, delete
//! - [`exec`] - `ProcessRunner`: bounded non-interactive shell commands
//! - [`session`] - `SessionRegistry`: interactive shells on pseudo-terminals
//! - [`audit`] - security audit events and sinks
//! - [`config`] - limits and defaults, TOML + environment overrides
//! - [`models`] - data returned by the operations
//! - [`mod@error`] - error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use projectjail::{ConfigLoader, FileOperationEngine, ProcessRunner, ProjectRoot};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load()?;
//! let root = ProjectRoot::new("/srv/projects/demo")?;
//!
//! let files = FileOperationEngine::new(&config);
//! files.create_file(&root, "notes/todo.txt", "hi", false).await?;
//! let read = files.read(&root, "notes/todo.txt", None, false).await?;
//! assert_eq!(read.content_text(), "hi");
//!
//! let runner = ProcessRunner::new(&config);
//! let result = runner.execute(&root, "ls -la", Some(10), None).await?;
//! println!("{}", result.stdout);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - Filesystem work runs on tokio's blocking pool
//! - Commands run as `tokio::process` children in their own process group,
//!   killed as a group when their deadline fires
//! - Each terminal session has a reader thread, a writer thread and a
//!   waiter thread bridging the blocking pty to tokio channels
//!
//! Communication between threads happens via async channels (`tokio::mpsc`).
//!
//! ## Platform Support
//!
//! Unix only (process groups and POSIX signals).

#[cfg(not(unix))]
compile_error!("projectjail requires a Unix platform");

#[macro_use]
extern crate tracing;

pub mod audit;
pub mod config;
pub mod confine;
pub mod error;
pub mod exec;
pub mod fs_ops;
pub mod logging;
pub mod models;
pub mod session;
pub mod signals;

// Re-exports for core functionality
pub use audit::{AuditEvent, AuditSink};
pub use config::{ConfigLoader, CoreConfig};
pub use confine::{PathConfiner, ProjectRoot, ResolveMode, ResolvedPath};
pub use error::{Error, ErrorKind, Result};
pub use exec::ProcessRunner;
pub use fs_ops::{FileOperationEngine, IgnoreOracle, ListOptions};
pub use models::{CommandResult, FileEntry, SessionInfo, SessionState};
pub use session::SessionRegistry;

/// The current version of projectjail from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
