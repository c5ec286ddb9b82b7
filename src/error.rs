//! Error types and Result aliases for projectjail
//!
//! Every public operation returns success or exactly one [`Error`]. The
//! [`ErrorKind`] tag is what collaborators map onto their own transport
//! status codes. Messages name the caller-supplied relative path or the
//! session id, never the resolved absolute path.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Result type alias for projectjail operations
pub type Result<T> = std::result::Result<T, Error>;

/// Tag identifying which failure an operation reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PathTraversal,
    NotFound,
    AlreadyExists,
    NotEmpty,
    FileTooLarge,
    Timeout,
    SpawnFailed,
    SessionBusy,
    ResourceExhausted,
    NotADirectory,
    NotAFile,
    InvalidInput,
    Io,
}

impl ErrorKind {
    /// Stable snake_case name, suitable for wire formats
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PathTraversal => "path_traversal",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotEmpty => "not_empty",
            ErrorKind::FileTooLarge => "file_too_large",
            ErrorKind::Timeout => "timeout",
            ErrorKind::SpawnFailed => "spawn_failed",
            ErrorKind::SessionBusy => "session_busy",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::NotADirectory => "not_a_directory",
            ErrorKind::NotAFile => "not_a_file",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a path was refused by the confiner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalReason {
    /// Path was absolute
    Absolute,
    /// A `..` segment survived normalization
    ParentSegment,
    /// A symlink resolved to a location outside the root
    SymlinkEscape,
    /// Too many symlink hops (cycle or pathological chain)
    SymlinkLoop,
    /// Embedded NUL byte
    NulByte,
    /// The operation would act on the project root itself
    RootTarget,
}

impl TraversalReason {
    pub fn description(&self) -> &'static str {
        match self {
            TraversalReason::Absolute => "absolute paths are not allowed",
            TraversalReason::ParentSegment => "'..' segments are not allowed",
            TraversalReason::SymlinkEscape => "symlink resolves outside the project root",
            TraversalReason::SymlinkLoop => "too many levels of symbolic links",
            TraversalReason::NulByte => "path contains a NUL byte",
            TraversalReason::RootTarget => "operation cannot target the project root",
        }
    }
}

/// Main error type for projectjail
#[derive(Debug)]
pub enum Error {
    // === Confinement ===
    /// Path rejected by the confiner
    PathTraversal {
        path: String,
        reason: TraversalReason,
    },

    // === Filesystem ===
    /// A required path component does not exist
    NotFound {
        path: String,
    },

    /// Target already exists
    AlreadyExists {
        path: String,
    },

    /// Directory is not empty and recursive deletion was not requested
    NotEmpty {
        path: String,
    },

    /// File exceeds the hard read ceiling
    FileTooLarge {
        path: String,
        size: u64,
        limit: u64,
    },

    /// Target exists but is not a directory
    NotADirectory {
        path: String,
    },

    /// Target exists but is not a regular file
    NotAFile {
        path: String,
    },

    // === Processes ===
    /// Command exceeded its deadline
    Timeout {
        command: String,
        duration: Duration,
    },

    /// Interpreter or shell could not be started
    SpawnFailed {
        command: String,
        reason: String,
    },

    // === Sessions ===
    /// Unknown or already closed session
    SessionNotFound {
        session_id: String,
    },

    /// Session already has an attached consumer
    SessionBusy {
        session_id: String,
    },

    /// A configured capacity was reached
    ResourceExhausted {
        resource: &'static str,
        limit: usize,
    },

    // === Caller input ===
    /// Argument rejected before any work was done
    InvalidInput {
        field: &'static str,
        reason: String,
    },

    /// Configuration could not be loaded or is invalid
    Config(ConfigError),

    /// Unexpected OS failure on a confined path
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl Error {
    /// The tag collaborators translate into a transport status
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PathTraversal { .. } => ErrorKind::PathTraversal,
            Error::NotFound { .. } | Error::SessionNotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::NotEmpty { .. } => ErrorKind::NotEmpty,
            Error::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            Error::NotADirectory { .. } => ErrorKind::NotADirectory,
            Error::NotAFile { .. } => ErrorKind::NotAFile,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::SpawnFailed { .. } => ErrorKind::SpawnFailed,
            Error::SessionBusy { .. } => ErrorKind::SessionBusy,
            Error::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Error::InvalidInput { .. } | Error::Config(_) => ErrorKind::InvalidInput,
            Error::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn traversal(path: &str, reason: TraversalReason) -> Self {
        Error::PathTraversal {
            path: path.to_string(),
            reason,
        }
    }

    /// Map an OS error on a confined path onto the closest tagged kind
    pub(crate) fn from_io(path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound {
                path: path.to_string(),
            },
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists {
                path: path.to_string(),
            },
            std::io::ErrorKind::NotADirectory => Error::NotADirectory {
                path: path.to_string(),
            },
            std::io::ErrorKind::IsADirectory => Error::NotAFile {
                path: path.to_string(),
            },
            std::io::ErrorKind::DirectoryNotEmpty => Error::NotEmpty {
                path: path.to_string(),
            },
            _ => Error::Io {
                path: path.to_string(),
                source: err,
            },
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            Error::PathTraversal { path, reason } => {
                write!(f, "[{}] '{}': {}", kind, path, reason.description())
            }
            Error::NotFound { path } => write!(f, "[{}] '{}' does not exist", kind, path),
            Error::AlreadyExists { path } => write!(f, "[{}] '{}' already exists", kind, path),
            Error::NotEmpty { path } => {
                write!(f, "[{}] directory '{}' is not empty", kind, path)
            }
            Error::FileTooLarge { path, size, limit } => write!(
                f,
                "[{}] '{}' is {} bytes, limit is {} bytes",
                kind, path, size, limit
            ),
            Error::NotADirectory { path } => {
                write!(f, "[{}] '{}' is not a directory", kind, path)
            }
            Error::NotAFile { path } => write!(f, "[{}] '{}' is not a file", kind, path),
            Error::Timeout { command, duration } => write!(
                f,
                "[{}] command '{}' timed out after {:?}",
                kind, command, duration
            ),
            Error::SpawnFailed { command, reason } => {
                write!(f, "[{}] failed to spawn '{}': {}", kind, command, reason)
            }
            Error::SessionNotFound { session_id } => {
                write!(f, "[{}] session '{}' not found", kind, session_id)
            }
            Error::SessionBusy { session_id } => write!(
                f,
                "[{}] session '{}' already has an attached client",
                kind, session_id
            ),
            Error::ResourceExhausted { resource, limit } => {
                write!(f, "[{}] {} limit of {} reached", kind, resource, limit)
            }
            Error::InvalidInput { field, reason } => {
                write!(f, "[{}] invalid {}: {}", kind, field, reason)
            }
            Error::Config(err) => write!(f, "[{}] configuration: {}", kind, err),
            Error::Io { path, source } => {
                write!(f, "[{}] '{}': {}", kind, path, source.kind())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            Error::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}
