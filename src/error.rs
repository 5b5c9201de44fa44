/*!
 * Error types for Photocopy
 */

use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, PhotocopyError>;

#[derive(Debug)]
pub enum PhotocopyError {
    /// Source file or directory not found
    SourceNotFound(PathBuf),

    /// Invalid path
    InvalidPath(PathBuf),

    /// A caller passed an argument outside the accepted range
    InvalidArgument(String),

    /// I/O error
    Io(io::Error),

    /// Configuration error
    Config(String),

    /// Duplicate-name resolution gave up after the attempt cap
    DuplicatesExhausted { path: PathBuf, attempts: u32 },

    /// Checkpoint store error
    Checkpoint(String),

    /// Transaction log error
    Transaction(String),

    /// Rollback error
    Rollback(String),

    /// Parallel processing error
    Parallel(String),

    /// The run was cancelled
    Cancelled,

    /// Generic error with message
    Other(String),
}

impl PhotocopyError {
    /// Check if this error terminates the whole run rather than one unit
    pub fn is_fatal(&self) -> bool {
        match self {
            PhotocopyError::Cancelled => true,
            PhotocopyError::Config(_) => true,
            PhotocopyError::InvalidArgument(_) => true,

            PhotocopyError::SourceNotFound(_) => false,
            PhotocopyError::InvalidPath(_) => false,
            PhotocopyError::Io(_) => false,
            PhotocopyError::DuplicatesExhausted { .. } => false,
            PhotocopyError::Checkpoint(_) => false,
            PhotocopyError::Transaction(_) => false,
            PhotocopyError::Rollback(_) => false,
            PhotocopyError::Parallel(_) => false,
            PhotocopyError::Other(_) => false,
        }
    }

    /// Check if this error is a cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PhotocopyError::Cancelled)
    }

    /// Check if an I/O error is one of the expected per-operation kinds
    /// that must not abort the run
    pub fn is_recoverable_io(err: &io::Error) -> bool {
        use io::ErrorKind::*;
        matches!(
            err.kind(),
            NotFound
                | PermissionDenied
                | AlreadyExists
                | InvalidInput
                | StorageFull
                | Unsupported
                | FileTooLarge
        )
    }
}

impl fmt::Display for PhotocopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotocopyError::SourceNotFound(path) => {
                write!(f, "Source not found: {}", path.display())
            }
            PhotocopyError::InvalidPath(path) => {
                write!(f, "Invalid path: {}", path.display())
            }
            PhotocopyError::InvalidArgument(msg) => {
                write!(f, "Invalid argument: {}", msg)
            }
            PhotocopyError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            PhotocopyError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            PhotocopyError::DuplicatesExhausted { path, attempts } => {
                write!(
                    f,
                    "Could not find a free name for {} after {} attempts",
                    path.display(),
                    attempts
                )
            }
            PhotocopyError::Checkpoint(msg) => {
                write!(f, "Checkpoint error: {}", msg)
            }
            PhotocopyError::Transaction(msg) => {
                write!(f, "Transaction log error: {}", msg)
            }
            PhotocopyError::Rollback(msg) => {
                write!(f, "Rollback error: {}", msg)
            }
            PhotocopyError::Parallel(msg) => {
                write!(f, "Parallel processing error: {}", msg)
            }
            PhotocopyError::Cancelled => {
                write!(f, "Operation cancelled")
            }
            PhotocopyError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for PhotocopyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PhotocopyError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PhotocopyError {
    fn from(err: io::Error) -> Self {
        PhotocopyError::Io(err)
    }
}

impl From<serde_json::Error> for PhotocopyError {
    fn from(err: serde_json::Error) -> Self {
        PhotocopyError::Transaction(format!("JSON error: {}", err))
    }
}
