//! Core data models for projectjail
//!
//! Plain data returned by the file engine, the process runner and the
//! terminal registry. None of these carry resolved absolute paths.

pub mod command_result;
pub mod file_entry;
pub mod session;

// Re-exports for convenience
pub use command_result::CommandResult;
pub use file_entry::{CreateOutcome, DeleteOutcome, DirOutcome, EntryKind, FileEntry, ReadOutcome};
pub use session::{SessionInfo, SessionState};
