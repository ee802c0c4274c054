//! File storage
//!
//! [`UploadRoot`] owns the directory holding one subdirectory per user;
//! [`UploadDir`] is one such subdirectory. All names coming from clients
//! are resolved through a [`PathGuard`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

mod path_guard;

pub use path_guard::{PathError, PathGuard};

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found")]
    NotFound,

    #[error("File already exists")]
    AlreadyExists,

    #[error("Access denied: {0}")]
    Security(#[from] PathError),

    #[error("Storage I/O error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound,
            io::ErrorKind::AlreadyExists => StorageError::AlreadyExists,
            _ => StorageError::Io(err),
        }
    }
}

/// Where decoded file parts are written
pub trait Destination {
    type File: Write;

    /// Create `name`, failing with [`StorageError::AlreadyExists`] when it is
    /// taken. Returns the resolved path with the open sink.
    fn create_new(&self, name: &str) -> Result<(PathBuf, Self::File), StorageError>;

    /// Remove a file previously returned by [`create_new`](Self::create_new).
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// A stored file as seen by listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// Directory holding the per-user upload directories
#[derive(Debug, Clone)]
pub struct UploadRoot {
    guard: PathGuard,
}

impl UploadRoot {
    /// Open the root, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        fs::create_dir_all(path.as_ref()).map_err(StorageError::Io)?;
        Ok(Self {
            guard: PathGuard::new(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.guard.root()
    }

    /// Upload directory of `username`, created on first use.
    pub fn user_dir(&self, username: &str) -> Result<UploadDir, StorageError> {
        let path = self.guard.resolve(username)?;
        UploadDir::open(path)
    }
}

/// One flat directory of uploaded files
#[derive(Debug, Clone)]
pub struct UploadDir {
    guard: PathGuard,
}

impl UploadDir {
    /// Open the directory, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        fs::create_dir_all(path.as_ref()).map_err(StorageError::Io)?;
        Ok(Self {
            guard: PathGuard::new(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.guard.root()
    }

    /// Resolve a client-supplied file name inside this directory.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        Ok(self.guard.resolve(name)?)
    }

    /// Regular files in the directory, newest first.
    pub fn list(&self) -> Result<Vec<FileEntry>, StorageError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.guard.root()).map_err(StorageError::Io)? {
            let entry = entry.map_err(StorageError::Io)?;
            let metadata = match entry.metadata() {
                Ok(m) => m,
                // Removed between read_dir and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };
            if !metadata.is_file() {
                continue;
            }
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    /// Locate an existing regular file for reading; returns its path and size.
    pub fn stat(&self, name: &str) -> Result<(PathBuf, u64), StorageError> {
        let path = self.resolve(name)?;
        let metadata = fs::metadata(&path)?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound);
        }
        Ok((path, metadata.len()))
    }

    /// Delete an existing regular file.
    pub fn delete(&self, name: &str) -> Result<(), StorageError> {
        let (path, _) = self.stat(name)?;
        fs::remove_file(&path)?;
        tracing::debug!(file = name, "Deleted file");
        Ok(())
    }
}

impl Destination for UploadDir {
    type File = File;

    fn create_new(&self, name: &str) -> Result<(PathBuf, File), StorageError> {
        let path = self.resolve(name)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok((path, file))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}
