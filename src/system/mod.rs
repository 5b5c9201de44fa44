//! FileSystem façade implementations
//!
//! The engine performs all disk access through the `FileSystem` trait so
//! that planning and execution can be tested against an in-memory double:
//! - `LocalFileSystem`: direct filesystem access
//! - `MockFileSystem`: in-memory implementation for testing (tests only)

mod local;

pub use local::LocalFileSystem;

#[cfg(test)]
pub mod mock;

#[cfg(test)]
pub use mock::MockFileSystem;

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cancel::CancellationToken;
use crate::error::PhotocopyError;
use crate::media::FileRef;

#[derive(Error, Debug)]
pub enum FileSystemError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Destination already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(PathBuf),

    #[error("Enumeration cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type FsResult<T> = std::result::Result<T, FileSystemError>;

impl From<FileSystemError> for PhotocopyError {
    fn from(err: FileSystemError) -> Self {
        match err {
            FileSystemError::Cancelled => PhotocopyError::Cancelled,
            FileSystemError::NotFound(path) => PhotocopyError::SourceNotFound(path),
            FileSystemError::Io(e) => PhotocopyError::Io(e),
            other => PhotocopyError::Io(io::Error::other(other.to_string())),
        }
    }
}

/// Basic metadata for a single file
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// All disk access used by the planner, executor and rollback service.
///
/// Paths are absolute. Implementations must be safe to call from many
/// threads at once; the engine never holds a façade-wide lock.
pub trait FileSystem: Send + Sync {
    /// Whether a directory exists at `path`
    fn directory_exists(&self, path: &Path) -> bool;

    /// Whether a file exists at `path`
    fn file_exists(&self, path: &Path) -> bool;

    /// Create a directory, including intermediates. Idempotent.
    fn create_directory(&self, path: &Path) -> FsResult<()>;

    /// Copy `src` to `dst`. Fails with `AlreadyExists` when `dst` is
    /// present and `overwrite` is false.
    fn copy_file(&self, src: &Path, dst: &Path, overwrite: bool) -> FsResult<()>;

    /// Move `src` to `dst`, replacing `dst` if present
    fn move_file(&self, src: &Path, dst: &Path) -> FsResult<()>;

    /// Delete a file
    fn delete_file(&self, path: &Path) -> FsResult<()>;

    /// Remove a directory. Fails with `DirectoryNotEmpty` when it still
    /// has children.
    fn remove_directory(&self, path: &Path) -> FsResult<()>;

    /// Enumerate all files under `path` in a stable order. Sidecar
    /// attachment and media metadata happen upstream; entries carry
    /// filesystem timestamps only.
    fn enumerate_files(&self, path: &Path, cancel: &CancellationToken) -> FsResult<Vec<FileRef>>;

    /// Metadata for one file
    fn get_file_info(&self, path: &Path) -> FsResult<FileInfo>;
}
