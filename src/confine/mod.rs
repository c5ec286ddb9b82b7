//! Path Confinement
//!
//! Turns a caller-supplied relative path into an absolute path that is
//! proven to lie inside a [`ProjectRoot`].
//!
//! Resolution happens in two phases:
//!
//! 1. **Lexical**: the raw string is split into components. Absolute paths,
//!    `..` segments and NUL bytes are refused before the filesystem is
//!    touched.
//! 2. **Walk**: components are resolved one at a time against the real
//!    filesystem. Symlinks are expanded by hand (bounded by
//!    `max_symlink_hops`) and the walk fails as soon as the resolved prefix
//!    would leave the root.
//!
//! The tree can change between `resolve` and the caller's use of the result.
//! That window is accepted for single-tenant deployments.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::config::PathsConfig;
use crate::error::{Error, Result, TraversalReason};

/// Canonical absolute directory bounding every operation of one project
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectRoot {
    path: PathBuf,
}

impl ProjectRoot {
    /// Canonicalize an existing directory into a project root
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let label = "<project root>";
        let path = fs::canonicalize(path.as_ref()).map_err(|e| Error::from_io(label, e))?;
        let meta = fs::metadata(&path).map_err(|e| Error::from_io(label, e))?;
        if !meta.is_dir() {
            return Err(Error::NotADirectory {
                path: label.to_string(),
            });
        }
        Ok(Self { path })
    }

    /// The canonical absolute directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `candidate` lies inside (or is) this root, component-wise
    pub fn contains(&self, candidate: &Path) -> bool {
        candidate.starts_with(&self.path)
    }
}

impl AsRef<Path> for ProjectRoot {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// How missing components are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Every component must exist
    Existing,
    /// Trailing components may be missing; they are taken literally
    Create,
}

/// An absolute path proven to lie inside its project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    absolute: PathBuf,
    relative: String,
    exists: bool,
    is_root: bool,
}

impl ResolvedPath {
    /// Absolute location on disk. Never put this in user-facing messages.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// The relative string the caller supplied
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// Whether every component existed at resolution time
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Whether the path denotes the project root itself
    pub fn is_root(&self) -> bool {
        self.is_root
    }
}

/// Split a relative path into plain components, refusing anything that could
/// climb out of the root before any filesystem access.
///
/// `.` and empty segments are dropped, so `"."`, `"./"` and `"a/./b"` are
/// fine. An empty string is refused.
pub fn lexical_components(relative: &str) -> Result<Vec<OsString>> {
    if relative.is_empty() {
        return Err(Error::InvalidInput {
            field: "path",
            reason: "path cannot be empty, use '.' for the project root".to_string(),
        });
    }
    if relative.contains('\0') {
        return Err(Error::traversal(relative, TraversalReason::NulByte));
    }
    if relative.starts_with('/') || Path::new(relative).is_absolute() {
        return Err(Error::traversal(relative, TraversalReason::Absolute));
    }

    let mut components = Vec::new();
    for segment in relative.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(Error::traversal(relative, TraversalReason::ParentSegment)),
            name => components.push(OsString::from(name)),
        }
    }
    Ok(components)
}

/// Resolves relative paths against a project root
#[derive(Debug, Clone)]
pub struct PathConfiner {
    max_symlink_hops: usize,
}

impl PathConfiner {
    pub fn new(max_symlink_hops: usize) -> Self {
        Self { max_symlink_hops }
    }

    pub fn from_config(config: &PathsConfig) -> Self {
        Self::new(config.max_symlink_hops)
    }

    /// Resolve `relative` inside `root`, following symlinks on every component
    pub fn resolve(
        &self,
        root: &ProjectRoot,
        relative: &str,
        mode: ResolveMode,
    ) -> Result<ResolvedPath> {
        let components = lexical_components(relative)?;
        let (absolute, exists) = self.walk(root, relative, components, mode)?;
        let is_root = absolute == root.path();
        Ok(ResolvedPath {
            absolute,
            relative: relative.to_string(),
            exists,
            is_root,
        })
    }

    /// Resolve the parent of `relative` fully but keep the final component
    /// unfollowed, so the result names the directory entry itself (a symlink
    /// stays a symlink). The entry must exist and cannot be the root.
    pub fn resolve_entry(&self, root: &ProjectRoot, relative: &str) -> Result<ResolvedPath> {
        let mut components = lexical_components(relative)?;
        let name = match components.pop() {
            Some(name) => name,
            None => return Err(Error::traversal(relative, TraversalReason::RootTarget)),
        };

        let (parent, _) = self.walk(root, relative, components, ResolveMode::Existing)?;
        let absolute = parent.join(&name);
        fs::symlink_metadata(&absolute).map_err(|e| Error::from_io(relative, e))?;

        Ok(ResolvedPath {
            absolute,
            relative: relative.to_string(),
            exists: true,
            is_root: false,
        })
    }

    fn walk(
        &self,
        root: &ProjectRoot,
        relative: &str,
        components: Vec<OsString>,
        mode: ResolveMode,
    ) -> Result<(PathBuf, bool)> {
        let escape = || Error::traversal(relative, TraversalReason::SymlinkEscape);

        let mut resolved = root.path().to_path_buf();
        let mut pending: VecDeque<OsString> = components.into();
        let mut hops = 0usize;

        while let Some(component) = pending.pop_front() {
            // `..` and `.` only arrive here from expanded symlink targets
            if component == ".." {
                if resolved.as_path() == root.path() {
                    return Err(escape());
                }
                resolved.pop();
                continue;
            }
            if component == "." {
                continue;
            }

            let candidate = resolved.join(&component);
            match fs::symlink_metadata(&candidate) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    hops += 1;
                    if hops > self.max_symlink_hops {
                        return Err(Error::traversal(relative, TraversalReason::SymlinkLoop));
                    }
                    let target = fs::read_link(&candidate).map_err(|e| Error::from_io(relative, e))?;
                    let expanded = expand_link_target(root, &target).ok_or_else(escape)?;
                    if target.is_absolute() {
                        resolved = root.path().to_path_buf();
                    }
                    for part in expanded.into_iter().rev() {
                        pending.push_front(part);
                    }
                }
                Ok(_) => resolved = candidate,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if mode == ResolveMode::Existing {
                        return Err(Error::NotFound {
                            path: relative.to_string(),
                        });
                    }
                    // Nothing below a missing component can exist, so the
                    // rest is resolved lexically.
                    resolved = candidate;
                    while let Some(rest) = pending.pop_front() {
                        if rest == ".." {
                            if resolved.as_path() == root.path() {
                                return Err(escape());
                            }
                            resolved.pop();
                        } else if rest != "." {
                            resolved.push(rest);
                        }
                    }
                    if !root.contains(&resolved) {
                        return Err(escape());
                    }
                    return Ok((resolved, false));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => {
                    return Err(Error::NotADirectory {
                        path: relative.to_string(),
                    });
                }
                Err(e) => return Err(Error::from_io(relative, e)),
            }

            if !root.contains(&resolved) {
                return Err(escape());
            }
        }

        Ok((resolved, true))
    }
}

impl Default for PathConfiner {
    fn default() -> Self {
        Self::from_config(&PathsConfig::default())
    }
}

/// Components to splice into the walk for a symlink target.
///
/// Relative targets are returned as-is (including `..`, which the walk
/// checks against the root). Absolute targets must point into the root;
/// they come back relative to it, or `None` when they point elsewhere.
fn expand_link_target(root: &ProjectRoot, target: &Path) -> Option<Vec<OsString>> {
    let rest = if target.is_absolute() {
        target.strip_prefix(root.path()).ok()?
    } else {
        target
    };

    let mut parts = Vec::new();
    for component in rest.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_os_string()),
            Component::CurDir => {}
            Component::ParentDir => parts.push(OsString::from("..")),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts)
}
