//! Path confinement
//!
//! Every filesystem path derived from client input goes through a
//! [`PathGuard`], which resolves it against a fixed root and refuses
//! anything that would land outside.

use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Path confinement errors. Messages never include the resolved path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Path escapes the storage root")]
    OutsideRoot,

    #[error("Invalid file name")]
    InvalidName,
}

/// Resolves client-supplied names inside a root directory
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Create a guard for `root`. The root is made absolute and normalized,
    /// and canonicalized when it already exists.
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref();
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        let normalized = normalize(&absolute);
        let root = match normalized.canonicalize() {
            Ok(canonical) => canonical,
            Err(e) if e.kind() == io::ErrorKind::NotFound => normalized,
            Err(e) => return Err(e),
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `name` below the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, PathError> {
        if name.is_empty() || name.contains('\0') {
            return Err(PathError::InvalidName);
        }

        let candidate = normalize(&self.root.join(name));
        if !candidate.starts_with(&self.root) {
            tracing::warn!(name, "Rejected path outside storage root");
            return Err(PathError::OutsideRoot);
        }
        if candidate == self.root {
            return Err(PathError::InvalidName);
        }
        Ok(candidate)
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
/// `..` never climbs above the filesystem root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
