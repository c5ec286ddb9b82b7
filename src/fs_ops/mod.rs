//! File Operation Engine
//!
//! List, read, create and delete inside a project root. Every call resolves
//! its path through the [`PathConfiner`] first and only ever touches the
//! resolved location. Blocking filesystem work runs on tokio's blocking pool.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::audit::{AuditEvent, AuditSink, TracingAuditSink};
use crate::config::{CoreConfig, FilesConfig};
use crate::confine::{lexical_components, PathConfiner, ProjectRoot, ResolveMode, ResolvedPath};
use crate::error::{Error, Result};
use crate::models::{CreateOutcome, DeleteOutcome, DirOutcome, EntryKind, FileEntry, ReadOutcome};

/// Decides whether a relative path is ignored (gitignore-style matching
/// lives outside this crate)
pub trait IgnoreOracle: Send + Sync {
    fn is_ignored(&self, relative_path: &str, is_dir: bool) -> bool;
}

/// Oracle that ignores nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIgnore;

impl IgnoreOracle for NoIgnore {
    fn is_ignored(&self, _relative_path: &str, _is_dir: bool) -> bool {
        false
    }
}

/// Listing options
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Descend into subdirectories (never through symlinks)
    pub recursive: bool,
    /// Omit ignored entries and do not descend into ignored directories
    pub skip_ignored: bool,
}

impl ListOptions {
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            skip_ignored: false,
        }
    }
}

/// Confined filesystem operations
#[derive(Clone)]
pub struct FileOperationEngine {
    limits: FilesConfig,
    confiner: PathConfiner,
    audit: Arc<dyn AuditSink>,
    ignore: Arc<dyn IgnoreOracle>,
}

impl FileOperationEngine {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            limits: config.files.clone(),
            confiner: PathConfiner::from_config(&config.paths),
            audit: Arc::new(TracingAuditSink),
            ignore: Arc::new(NoIgnore),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_ignore_oracle(mut self, ignore: Arc<dyn IgnoreOracle>) -> Self {
        self.ignore = ignore;
        self
    }

    /// List a directory, flat or recursive
    pub async fn list(
        &self,
        root: &ProjectRoot,
        relative: &str,
        recursive: bool,
    ) -> Result<Vec<FileEntry>> {
        let options = ListOptions {
            recursive,
            skip_ignored: false,
        };
        self.list_with(root, relative, options).await
    }

    /// List a directory with explicit options
    pub async fn list_with(
        &self,
        root: &ProjectRoot,
        relative: &str,
        options: ListOptions,
    ) -> Result<Vec<FileEntry>> {
        let relative = relative.to_string();
        self.blocking(root, move |engine, root| {
            engine.list_blocking(root, &relative, options)
        })
        .await
    }

    /// Read a file.
    ///
    /// `max_bytes` lowers the full-read ceiling for this call (it can never
    /// raise it). In preview mode at most `max_preview_bytes` are returned
    /// and larger files are flagged `truncated` instead of failing.
    pub async fn read(
        &self,
        root: &ProjectRoot,
        relative: &str,
        max_bytes: Option<u64>,
        preview: bool,
    ) -> Result<ReadOutcome> {
        let relative = relative.to_string();
        self.blocking(root, move |engine, root| {
            engine.read_blocking(root, &relative, max_bytes, preview)
        })
        .await
    }

    /// Write a file, creating missing parent directories
    pub async fn create_file(
        &self,
        root: &ProjectRoot,
        relative: &str,
        content: impl Into<Vec<u8>>,
        overwrite: bool,
    ) -> Result<CreateOutcome> {
        let relative = relative.to_string();
        let content = content.into();
        self.blocking(root, move |engine, root| {
            engine.create_file_blocking(root, &relative, &content, overwrite)
        })
        .await
    }

    /// Create a directory. An existing directory is not an error.
    pub async fn create_directory(
        &self,
        root: &ProjectRoot,
        relative: &str,
        parents: bool,
    ) -> Result<DirOutcome> {
        let relative = relative.to_string();
        self.blocking(root, move |engine, root| {
            engine.create_directory_blocking(root, &relative, parents)
        })
        .await
    }

    /// Delete a file, symlink or directory
    pub async fn delete(
        &self,
        root: &ProjectRoot,
        relative: &str,
        recursive: bool,
    ) -> Result<DeleteOutcome> {
        let relative = relative.to_string();
        self.blocking(root, move |engine, root| {
            engine.delete_blocking(root, &relative, recursive)
        })
        .await
    }

    async fn blocking<T, F>(&self, root: &ProjectRoot, op: F) -> Result<T>
    where
        F: FnOnce(&Self, &ProjectRoot) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.clone();
        let root = root.clone();
        tokio::task::spawn_blocking(move || op(&engine, &root))
            .await
            .map_err(|e| Error::Io {
                path: String::new(),
                source: std::io::Error::other(e.to_string()),
            })?
    }

    /// Resolve through the confiner, auditing every traversal rejection
    fn confine(&self, root: &ProjectRoot, relative: &str, mode: ResolveMode) -> Result<ResolvedPath> {
        self.confiner
            .resolve(root, relative, mode)
            .map_err(|e| self.note_rejection(e))
    }

    fn note_rejection(&self, err: Error) -> Error {
        if let Error::PathTraversal { path, reason } = &err {
            warn!("Rejected path '{}': {}", path, reason.description());
            self.audit.record(AuditEvent::traversal(path));
        }
        err
    }

    fn list_blocking(
        &self,
        root: &ProjectRoot,
        relative: &str,
        options: ListOptions,
    ) -> Result<Vec<FileEntry>> {
        let target = self.confine(root, relative, ResolveMode::Existing)?;
        let meta = fs::metadata(target.absolute()).map_err(|e| Error::from_io(relative, e))?;
        if !meta.is_dir() {
            return Err(Error::NotADirectory {
                path: relative.to_string(),
            });
        }

        let base = display_path(relative)?;
        let mut entries = Vec::new();
        let mut pending: Vec<(PathBuf, String)> = vec![(target.absolute().to_path_buf(), base)];

        while let Some((dir, prefix)) = pending.pop() {
            let shown = if prefix.is_empty() { "." } else { prefix.as_str() };
            let reader = fs::read_dir(&dir).map_err(|e| Error::from_io(shown, e))?;

            for item in reader {
                let item = item.map_err(|e| Error::from_io(shown, e))?;
                let name = item.file_name().to_string_lossy().into_owned();
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };

                let meta = match fs::symlink_metadata(item.path()) {
                    Ok(meta) => meta,
                    // Removed while we were listing
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(Error::from_io(&path, e)),
                };
                let kind = EntryKind::from_file_type(meta.file_type());

                if kind == EntryKind::Symlink
                    && self
                        .confiner
                        .resolve(root, &path, ResolveMode::Create)
                        .is_err()
                {
                    debug!("Omitting symlink '{}' that leaves the project root", path);
                    continue;
                }

                let ignored = self.ignore.is_ignored(&path, kind == EntryKind::Directory);
                if ignored && options.skip_ignored {
                    continue;
                }

                if entries.len() >= self.limits.max_listing_entries {
                    return Err(Error::ResourceExhausted {
                        resource: "listing entries",
                        limit: self.limits.max_listing_entries,
                    });
                }

                if options.recursive && kind == EntryKind::Directory {
                    pending.push((item.path(), path.clone()));
                }

                entries.push(FileEntry {
                    name,
                    path,
                    kind,
                    size_bytes: if kind == EntryKind::File { meta.len() } else { 0 },
                    modified: meta.modified().ok().map(DateTime::<Utc>::from),
                    ignored,
                });
            }
        }

        sort_entries(&mut entries);
        debug!("Listed {} entries under '{}'", entries.len(), relative);
        Ok(entries)
    }

    fn read_blocking(
        &self,
        root: &ProjectRoot,
        relative: &str,
        max_bytes: Option<u64>,
        preview: bool,
    ) -> Result<ReadOutcome> {
        let target = self.confine(root, relative, ResolveMode::Existing)?;
        let meta = fs::metadata(target.absolute()).map_err(|e| Error::from_io(relative, e))?;
        if !meta.is_file() {
            return Err(Error::NotAFile {
                path: relative.to_string(),
            });
        }

        let ceiling = self.limits.max_read_bytes;
        let limit = max_bytes.map_or(ceiling, |requested| requested.min(ceiling));
        let size = meta.len();

        let cap = if preview {
            limit.min(self.limits.max_preview_bytes)
        } else {
            if size > limit {
                return Err(Error::FileTooLarge {
                    path: relative.to_string(),
                    size,
                    limit,
                });
            }
            limit
        };

        let mut options = OpenOptions::new();
        options.read(true);
        let file = open_regular(&options, target.absolute(), relative)?;
        let mut bytes = Vec::with_capacity(size.min(cap) as usize);
        // One extra byte tells us whether the file grew past the cap
        file.take(cap.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|e| Error::from_io(relative, e))?;

        let overflow = bytes.len() as u64 > cap;
        if overflow && !preview {
            return Err(Error::FileTooLarge {
                path: relative.to_string(),
                size: size.max(bytes.len() as u64),
                limit,
            });
        }
        bytes.truncate(cap as usize);

        debug!("Read {} of {} bytes from '{}'", bytes.len(), size, relative);
        Ok(ReadOutcome {
            path: relative.to_string(),
            size_bytes: size,
            preview,
            truncated: overflow || size > cap,
            bytes,
        })
    }

    fn create_file_blocking(
        &self,
        root: &ProjectRoot,
        relative: &str,
        content: &[u8],
        overwrite: bool,
    ) -> Result<CreateOutcome> {
        let target = self.confine(root, relative, ResolveMode::Create)?;
        let path = target.absolute();

        let existed = match fs::metadata(path) {
            Ok(meta) if !meta.is_file() => {
                return Err(Error::NotAFile {
                    path: relative.to_string(),
                })
            }
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(Error::from_io(relative, e)),
        };
        if existed && !overwrite {
            return Err(Error::AlreadyExists {
                path: relative.to_string(),
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::from_io(relative, e))?;
        }

        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = open_regular(&options, path, relative)?;
        file.write_all(content)
            .map_err(|e| Error::from_io(relative, e))?;

        info!(
            "{} '{}' ({} bytes)",
            if existed { "Overwrote" } else { "Created" },
            relative,
            content.len()
        );
        Ok(CreateOutcome {
            path: relative.to_string(),
            size_bytes: content.len() as u64,
            created: !existed,
        })
    }

    fn create_directory_blocking(
        &self,
        root: &ProjectRoot,
        relative: &str,
        parents: bool,
    ) -> Result<DirOutcome> {
        let target = self.confine(root, relative, ResolveMode::Create)?;
        let path = target.absolute();

        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => {
                return Ok(DirOutcome {
                    path: relative.to_string(),
                    created: false,
                })
            }
            Ok(_) => {
                return Err(Error::AlreadyExists {
                    path: relative.to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::from_io(relative, e)),
        }

        let created = if parents {
            fs::create_dir_all(path)
        } else {
            fs::create_dir(path)
        };
        match created {
            Ok(()) => {}
            // Lost a race with a concurrent mkdir of the same directory
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && path.is_dir() => {
                return Ok(DirOutcome {
                    path: relative.to_string(),
                    created: false,
                })
            }
            Err(e) => return Err(Error::from_io(relative, e)),
        }

        info!("Created directory '{}'", relative);
        Ok(DirOutcome {
            path: relative.to_string(),
            created: true,
        })
    }

    fn delete_blocking(
        &self,
        root: &ProjectRoot,
        relative: &str,
        recursive: bool,
    ) -> Result<DeleteOutcome> {
        let target = self
            .confiner
            .resolve_entry(root, relative)
            .map_err(|e| self.note_rejection(e))?;
        let path = target.absolute();

        let meta = fs::symlink_metadata(path).map_err(|e| Error::from_io(relative, e))?;
        let kind = EntryKind::from_file_type(meta.file_type());

        let removed = match kind {
            EntryKind::Directory if recursive => fs::remove_dir_all(path),
            EntryKind::Directory => {
                let mut children = fs::read_dir(path).map_err(|e| Error::from_io(relative, e))?;
                if children.next().is_some() {
                    return Err(Error::NotEmpty {
                        path: relative.to_string(),
                    });
                }
                fs::remove_dir(path)
            }
            EntryKind::File | EntryKind::Symlink | EntryKind::Other => fs::remove_file(path),
        };
        removed.map_err(|e| Error::from_io(relative, e))?;

        info!("Deleted {:?} '{}'", kind, relative);
        Ok(DeleteOutcome {
            path: relative.to_string(),
            kind,
        })
    }
}

/// Open `path` without ever blocking on a FIFO, and refuse anything that
/// is not a regular file once opened
fn open_regular(options: &OpenOptions, path: &Path, relative: &str) -> Result<File> {
    let mut options = options.clone();
    options.custom_flags(nix::libc::O_NONBLOCK);
    let file = options.open(path).map_err(|e| Error::from_io(relative, e))?;
    let meta = file.metadata().map_err(|e| Error::from_io(relative, e))?;
    if !meta.is_file() {
        return Err(Error::NotAFile {
            path: relative.to_string(),
        });
    }
    Ok(file)
}

/// Normalized `/`-joined form of a relative path; empty for the root
fn display_path(relative: &str) -> Result<String> {
    let parts = lexical_components(relative)?;
    Ok(parts
        .iter()
        .map(|p| p.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Directories first, then by path ignoring case
fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by_cached_key(|e| (!e.is_dir(), e.path.to_lowercase()));
}
