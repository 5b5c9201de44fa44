/*!
 * Photocopy - Crash-safe media organizer core
 *
 * Organizes a media corpus into a template-driven destination tree:
 * - Destination templates with conditional location variables
 * - Deterministic planning with reserved, de-duplicated destinations
 * - Parallel copy/move execution with per-file error isolation
 * - Binary checkpoints for resuming interrupted runs
 * - JSON transaction logs with full rollback
 * - Progress events and run statistics
 */

pub mod cancel;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod executor;
pub mod location;
pub mod logging;
pub mod media;
pub mod plan;
pub mod planner;
pub mod progress;
pub mod rollback;
pub mod resume;
pub mod system;
pub mod template;
pub mod transaction;
pub mod validate;

// Re-export commonly used types for convenience
pub use cancel::CancellationToken;
pub use checkpoint::{
    CheckpointState, CheckpointStatistics, CheckpointWriter, OperationResult, ResumeValidation,
};
pub use config::{ConfigFile, CopyConfig, CopyMode, LocationGranularity, LogLevel, PathCasing};
pub use error::{PhotocopyError, Result};
pub use executor::{CopyResult, ParallelExecutor};
pub use media::{FileDateTime, FileRef, LocationData};
pub use plan::{CopyError, CopyPlan, FileCopyPlan, UnknownFilesReport, ValidationFailure};
pub use planner::Planner;
pub use progress::{ProgressEvent, ProgressPublisher, ProgressSubscriber};
pub use resume::ResumeDecision;
pub use rollback::{RollbackResult, RollbackService};
pub use system::{FileSystem, FileSystemError, LocalFileSystem};
pub use template::PathTemplate;
pub use transaction::{TransactionLog, TransactionLogger, TransactionStatus};
pub use validate::{FileValidator, ValidatorChain, ValidatorOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
