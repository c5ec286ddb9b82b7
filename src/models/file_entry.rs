//! File Entry Model
//!
//! Listing entries and the outcomes of read, create and delete calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// What a directory entry is, without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// FIFO, socket or device node
    Other,
}

impl EntryKind {
    pub fn from_file_type(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Final path component
    pub name: String,

    /// Path relative to the project root, `/`-separated
    pub path: String,

    pub kind: EntryKind,

    /// Size on disk for regular files, 0 for everything else
    pub size_bytes: u64,

    /// Last modification time, when the platform reports one
    pub modified: Option<DateTime<Utc>>,

    /// Set by the ignore oracle
    pub ignored: bool,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Result of a read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadOutcome {
    /// Relative path as requested
    pub path: String,

    /// Full size of the file on disk
    pub size_bytes: u64,

    /// Whether this was a preview read
    pub preview: bool,

    /// Whether `bytes` holds less than the whole file
    pub truncated: bool,

    pub bytes: Vec<u8>,
}

impl ReadOutcome {
    /// Lossy UTF-8 view of the content
    pub fn content_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Result of a file create or overwrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOutcome {
    pub path: String,
    pub size_bytes: u64,
    /// `false` when an existing file was overwritten
    pub created: bool,
}

/// Result of a directory create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirOutcome {
    pub path: String,
    /// `false` when the directory already existed
    pub created: bool,
}

/// Result of a delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub path: String,
    /// Kind of the entry that was removed
    pub kind: EntryKind,
}
