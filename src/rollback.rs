/*!
 * Transaction rollback
 *
 * Undoes a recorded transaction by reversing its operations newest-first:
 * copied files are deleted, moved files are moved back, and directories
 * created by the run are removed when they end up empty. A successful
 * rollback rewrites the log status to `RolledBack`; a partial one leaves
 * the log untouched so it can be retried.
 */

use std::path::Path;

use crate::system::{FileSystem, FileSystemError};
use crate::transaction::{FileOperation, TransactionLog, TransactionStatus};

/// Outcome of one rollback attempt
#[derive(Debug, Clone, Default)]
pub struct RollbackResult {
    pub success: bool,
    pub files_restored: u64,
    pub files_failed: u64,
    pub directories_removed: u64,
    pub errors: Vec<String>,
}

impl RollbackResult {
    fn failed(message: &str) -> Self {
        Self {
            success: false,
            errors: vec![message.to_string()],
            ..Self::default()
        }
    }
}

/// Reverses transactions against the filesystem façade
pub struct RollbackService<'a> {
    fs: &'a dyn FileSystem,
}

impl<'a> RollbackService<'a> {
    pub fn new(fs: &'a dyn FileSystem) -> Self {
        Self { fs }
    }

    /// Roll back the transaction recorded at `log_path`
    pub fn rollback(&self, log_path: &Path) -> RollbackResult {
        if !log_path.exists() {
            return RollbackResult::failed("Transaction log not found");
        }

        let mut log = match TransactionLog::load(log_path) {
            Ok(log) => log,
            Err(e) => return RollbackResult::failed(&e.to_string()),
        };

        if log.is_dry_run {
            return RollbackResult::failed("Cannot rollback a dry run transaction");
        }

        tracing::info!(
            transaction = %log.transaction_id,
            operations = log.operations.len(),
            "rolling back transaction"
        );

        let mut result = RollbackResult::default();

        // Newest first, so later operations never block undoing earlier ones
        for entry in log.operations.iter().rev() {
            match entry.operation {
                FileOperation::Copy => {
                    if !self.fs.file_exists(&entry.destination_path) {
                        // Already gone; nothing to undo
                        continue;
                    }
                    match self.fs.delete_file(&entry.destination_path) {
                        Ok(()) => result.files_restored += 1,
                        Err(e) => {
                            result.files_failed += 1;
                            result.errors.push(format!(
                                "Failed to delete {}: {}",
                                entry.destination_path.display(),
                                e
                            ));
                        }
                    }
                }
                FileOperation::Move => {
                    if !self.fs.file_exists(&entry.destination_path) {
                        result.files_failed += 1;
                        result.errors.push(format!(
                            "Destination file not found: {}",
                            entry.destination_path.display()
                        ));
                        continue;
                    }
                    if let Err(e) = self.restore_move(&entry.destination_path, &entry.source_path)
                    {
                        result.files_failed += 1;
                        result.errors.push(format!(
                            "Failed to restore {}: {}",
                            entry.source_path.display(),
                            e
                        ));
                        continue;
                    }
                    result.files_restored += 1;
                }
            }
        }

        for dir in log.created_directories.iter().rev() {
            if !self.fs.directory_exists(dir) {
                continue;
            }
            match self.fs.remove_directory(dir) {
                Ok(()) => result.directories_removed += 1,
                Err(FileSystemError::DirectoryNotEmpty(_)) => {
                    // Files from other runs live here; leave it
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "could not remove directory");
                }
            }
        }

        result.success = result.files_failed == 0;

        if result.success {
            log.status = TransactionStatus::RolledBack;
            if let Err(e) = log.save(log_path) {
                result
                    .errors
                    .push(format!("Rolled back but failed to update log: {}", e));
            }
        }

        tracing::info!(
            restored = result.files_restored,
            failed = result.files_failed,
            directories_removed = result.directories_removed,
            success = result.success,
            "rollback finished"
        );

        result
    }

    fn restore_move(&self, dest: &Path, source: &Path) -> Result<(), FileSystemError> {
        if let Some(parent) = source.parent() {
            if !self.fs.directory_exists(parent) {
                self.fs.create_directory(parent)?;
            }
        }
        self.fs.move_file(dest, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::MockFileSystem;
    use crate::transaction::{FileOperationEntry, TransactionLogger};
    use chrono::Utc;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_log(
        temp: &TempDir,
        operations: Vec<FileOperationEntry>,
        created_directories: Vec<PathBuf>,
        is_dry_run: bool,
    ) -> PathBuf {
        let log = TransactionLog {
            transaction_id: "20240101-120000-deadbeef".to_string(),
            start_time: Utc::now(),
            end_time: Some(Utc::now()),
            source_directory: PathBuf::from("/src"),
            destination_pattern: "/dest/{year}".to_string(),
            is_dry_run,
            status: TransactionStatus::Completed,
            error_message: None,
            created_directories,
            operations,
        };
        let path = temp.path().join("photocopy-20240101-120000-deadbeef.json");
        log.save(&path).unwrap();
        path
    }

    fn copy_entry(source: &str, dest: &str) -> FileOperationEntry {
        FileOperationEntry {
            timestamp: Utc::now(),
            operation: FileOperation::Copy,
            source_path: PathBuf::from(source),
            destination_path: PathBuf::from(dest),
            file_size: 100,
            checksum: None,
        }
    }

    fn move_entry(source: &str, dest: &str) -> FileOperationEntry {
        FileOperationEntry {
            timestamp: Utc::now(),
            operation: FileOperation::Move,
            source_path: PathBuf::from(source),
            destination_path: PathBuf::from(dest),
            file_size: 100,
            checksum: None,
        }
    }

    #[test]
    fn test_missing_log() {
        let fs = MockFileSystem::new();
        let service = RollbackService::new(&fs);
        let result = service.rollback(Path::new("/nonexistent/photocopy-x.json"));
        assert!(!result.success);
        assert_eq!(result.errors, vec!["Transaction log not found"]);
    }

    #[test]
    fn test_dry_run_refused() {
        let temp = TempDir::new().unwrap();
        let path = write_log(&temp, Vec::new(), Vec::new(), true);

        let fs = MockFileSystem::new();
        let result = RollbackService::new(&fs).rollback(&path);
        assert!(!result.success);
        assert_eq!(result.errors, vec!["Cannot rollback a dry run transaction"]);
    }

    #[test]
    fn test_rollback_copy_deletes_destination() {
        let temp = TempDir::new().unwrap();
        let path = write_log(
            &temp,
            vec![copy_entry("/src/a.jpg", "/dest/2024/a.jpg")],
            vec![PathBuf::from("/dest/2024")],
            false,
        );

        let fs = MockFileSystem::new();
        fs.add_file("/src/a.jpg", 100);
        fs.add_file("/dest/2024/a.jpg", 100);

        let result = RollbackService::new(&fs).rollback(&path);
        assert!(result.success);
        assert_eq!(result.files_restored, 1);
        assert!(!fs.file_exists(Path::new("/dest/2024/a.jpg")));
        assert!(fs.file_exists(Path::new("/src/a.jpg")));
        assert_eq!(result.directories_removed, 1);

        let log = TransactionLog::load(&path).unwrap();
        assert_eq!(log.status, TransactionStatus::RolledBack);
    }

    #[test]
    fn test_rollback_move_restores_source() {
        let temp = TempDir::new().unwrap();
        let path = write_log(
            &temp,
            vec![move_entry("/src/x.jpg", "/dest/2024/01/x.jpg")],
            vec![PathBuf::from("/dest/2024/01")],
            false,
        );

        let fs = MockFileSystem::new();
        fs.add_file("/dest/2024/01/x.jpg", 100);

        let result = RollbackService::new(&fs).rollback(&path);
        assert!(result.success);
        assert_eq!(result.files_restored, 1);
        assert!(fs.file_exists(Path::new("/src/x.jpg")));
        assert!(!fs.file_exists(Path::new("/dest/2024/01/x.jpg")));
        assert!(!fs.directory_exists(Path::new("/dest/2024/01")));
    }

    #[test]
    fn test_rollback_move_missing_destination() {
        let temp = TempDir::new().unwrap();
        let path = write_log(
            &temp,
            vec![move_entry("/src/x.jpg", "/dest/2024/01/x.jpg")],
            Vec::new(),
            false,
        );

        let fs = MockFileSystem::new();

        let result = RollbackService::new(&fs).rollback(&path);
        assert!(!result.success);
        assert_eq!(result.files_failed, 1);
        assert!(result.errors[0].contains("Destination file not found: /dest/2024/01/x.jpg"));

        // Log keeps its original status when the rollback was partial
        let log = TransactionLog::load(&path).unwrap();
        assert_eq!(log.status, TransactionStatus::Completed);
    }

    #[test]
    fn test_rollback_missing_copy_destination_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let path = write_log(
            &temp,
            vec![copy_entry("/src/a.jpg", "/dest/a.jpg")],
            Vec::new(),
            false,
        );

        let fs = MockFileSystem::new();
        let result = RollbackService::new(&fs).rollback(&path);
        assert!(result.success);
        assert_eq!(result.files_restored, 0);
        assert_eq!(result.files_failed, 0);
    }

    #[test]
    fn test_non_empty_directory_is_kept() {
        let temp = TempDir::new().unwrap();
        let path = write_log(
            &temp,
            vec![copy_entry("/src/a.jpg", "/dest/2024/a.jpg")],
            vec![PathBuf::from("/dest/2024")],
            false,
        );

        let fs = MockFileSystem::new();
        fs.add_file("/dest/2024/a.jpg", 100);
        fs.add_file("/dest/2024/unrelated.jpg", 1);

        let result = RollbackService::new(&fs).rollback(&path);
        assert!(result.success);
        assert_eq!(result.directories_removed, 0);
        assert!(fs.directory_exists(Path::new("/dest/2024")));
    }

    #[test]
    fn test_double_rollback_is_disk_noop() {
        let temp = TempDir::new().unwrap();
        let path = write_log(
            &temp,
            vec![
                copy_entry("/src/a.jpg", "/dest/2024/a.jpg"),
                move_entry("/src/b.jpg", "/dest/2024/b.jpg"),
            ],
            vec![PathBuf::from("/dest/2024")],
            false,
        );

        let fs = MockFileSystem::new();
        fs.add_file("/dest/2024/a.jpg", 100);
        fs.add_file("/dest/2024/b.jpg", 100);

        let first = RollbackService::new(&fs).rollback(&path);
        assert!(first.success);

        let mutations_after_first = fs.mutations().len();
        let second = RollbackService::new(&fs).rollback(&path);
        // The move destination is gone now, so the second pass reports it,
        // but nothing on disk changes
        assert_eq!(fs.mutations().len(), mutations_after_first);
        assert_eq!(second.files_restored, 0);
    }

    #[test]
    fn test_rollback_of_logger_output() {
        let temp = TempDir::new().unwrap();
        let logger = TransactionLogger::new(temp.path().to_path_buf());
        logger
            .begin_transaction(Path::new("/src"), "/dest/{year}", false)
            .unwrap();
        logger.log_directory_created(Path::new("/dest/2024"));
        logger
            .log_operation(
                FileOperation::Copy,
                Path::new("/src/a.jpg"),
                Path::new("/dest/2024/a.jpg"),
                100,
            )
            .unwrap();
        let path = logger.complete().unwrap();

        let fs = MockFileSystem::new();
        fs.add_file("/dest/2024/a.jpg", 100);

        let result = RollbackService::new(&fs).rollback(&path);
        assert!(result.success);
        assert_eq!(result.files_restored, 1);
    }
}
