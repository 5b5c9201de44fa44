/*!
 * Transaction logging for rollback
 *
 * Every mutating step of a run (directory creation, copy, move) is
 * appended to an in-memory transaction and persisted as pretty-printed
 * JSON. The save is atomic (temp sibling, then rename) so a torn write
 * can never be mistaken for a valid log on the next start.
 */

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PhotocopyError, Result};

/// Cap on entries per log file; the executor stops recording when full
pub const MAX_OPERATIONS_PER_LOG: usize = 100_000;

/// Lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

/// Kind of a recorded mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOperation {
    Copy,
    Move,
}

/// One recorded file mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOperationEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: FileOperation,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// The persisted audit record of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLog {
    pub transaction_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub source_directory: PathBuf,
    pub destination_pattern: String,
    pub is_dry_run: bool,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_directories: Vec<PathBuf>,
    pub operations: Vec<FileOperationEntry>,
}

impl TransactionLog {
    /// Parse a transaction log file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PhotocopyError::Transaction(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| PhotocopyError::Transaction(format!("parse {}: {}", path.display(), e)))
    }

    /// Write as pretty JSON via a temp sibling and rename, so a partial
    /// write never parses as valid
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| PhotocopyError::Transaction(format!("create {}: {}", dir.display(), e)))?;

        let json = serde_json::to_string_pretty(self)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| PhotocopyError::Transaction(format!("create temp file: {}", e)))?;
        temp.write_all(json.as_bytes())
            .map_err(|e| PhotocopyError::Transaction(format!("write temp file: {}", e)))?;
        temp.flush()
            .map_err(|e| PhotocopyError::Transaction(format!("flush temp file: {}", e)))?;
        temp.persist(path)
            .map_err(|e| PhotocopyError::Transaction(format!("persist {}: {}", path.display(), e)))?;

        Ok(())
    }
}

/// Summary row for `list_transaction_logs`
#[derive(Debug, Clone)]
pub struct TransactionLogSummary {
    pub transaction_id: String,
    pub start_time: DateTime<Utc>,
    pub status: TransactionStatus,
    pub operation_count: usize,
    pub file_path: PathBuf,
}

/// Generate a `YYYYMMDD-HHMMSS-<8 hex>` transaction id
fn new_transaction_id() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        hex::encode(rand::random::<[u8; 4]>())
    )
}

/// Records one transaction at a time and persists it to the destination
/// root.
///
/// Calling `log_operation`/`log_directory_created` without an active
/// transaction is a caller bug and panics; starting a second transaction
/// while one is in progress is a recoverable error.
pub struct TransactionLogger {
    log_dir: PathBuf,
    current: Mutex<Option<TransactionLog>>,
    max_operations: usize,
}

impl TransactionLogger {
    /// Logger writing `photocopy-<id>.json` files into `log_dir`
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            current: Mutex::new(None),
            max_operations: MAX_OPERATIONS_PER_LOG,
        }
    }

    #[cfg(test)]
    fn with_capacity(log_dir: PathBuf, max_operations: usize) -> Self {
        Self {
            log_dir,
            current: Mutex::new(None),
            max_operations,
        }
    }

    /// Path the current transaction persists to
    pub fn transaction_log_path(&self) -> Option<PathBuf> {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|log| self.path_for(&log.transaction_id))
    }

    fn path_for(&self, transaction_id: &str) -> PathBuf {
        self.log_dir.join(format!("photocopy-{}.json", transaction_id))
    }

    /// Open a new transaction. Errors when one is already in progress.
    pub fn begin_transaction(
        &self,
        source: &Path,
        destination_pattern: &str,
        is_dry_run: bool,
    ) -> Result<String> {
        let mut current = self.current.lock().unwrap();
        if current.is_some() {
            return Err(PhotocopyError::Transaction(
                "a transaction is already in progress".to_string(),
            ));
        }

        let log = TransactionLog {
            transaction_id: new_transaction_id(),
            start_time: Utc::now(),
            end_time: None,
            source_directory: source.to_path_buf(),
            destination_pattern: destination_pattern.to_string(),
            is_dry_run,
            status: TransactionStatus::InProgress,
            error_message: None,
            created_directories: Vec::new(),
            operations: Vec::new(),
        };
        let id = log.transaction_id.clone();
        tracing::debug!(transaction = %id, "transaction started");
        *current = Some(log);
        Ok(id)
    }

    /// Record a directory created by the executor
    pub fn log_directory_created(&self, path: &Path) {
        let mut current = self.current.lock().unwrap();
        let log = current
            .as_mut()
            .expect("log_directory_created called without an active transaction");
        log.created_directories.push(path.to_path_buf());
    }

    /// Record one copy/move. Errors when the log reached its entry cap.
    pub fn log_operation(
        &self,
        operation: FileOperation,
        source: &Path,
        destination: &Path,
        file_size: u64,
    ) -> Result<()> {
        let mut current = self.current.lock().unwrap();
        let log = current
            .as_mut()
            .expect("log_operation called without an active transaction");

        if log.operations.len() >= self.max_operations {
            return Err(PhotocopyError::Transaction(format!(
                "transaction log is full ({} operations)",
                self.max_operations
            )));
        }

        log.operations.push(FileOperationEntry {
            timestamp: Utc::now(),
            operation,
            source_path: source.to_path_buf(),
            destination_path: destination.to_path_buf(),
            file_size,
            checksum: None,
        });
        Ok(())
    }

    /// Whether the entry cap is reached
    pub fn is_log_full(&self) -> bool {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|log| log.operations.len() >= self.max_operations)
            .unwrap_or(false)
    }

    /// Persist the current transaction. Snapshot under the lock, write
    /// outside it.
    pub fn save(&self) -> Result<()> {
        let snapshot = {
            let current = self.current.lock().unwrap();
            match current.as_ref() {
                Some(log) => log.clone(),
                None => return Ok(()),
            }
        };
        snapshot.save(&self.path_for(&snapshot.transaction_id))
    }

    /// Close the transaction as `Completed` and persist it
    pub fn complete(&self) -> Result<PathBuf> {
        self.finish(TransactionStatus::Completed, None)
    }

    /// Close the transaction as `Failed` and persist it
    pub fn fail(&self, message: &str) -> Result<PathBuf> {
        self.finish(TransactionStatus::Failed, Some(message.to_string()))
    }

    fn finish(&self, status: TransactionStatus, message: Option<String>) -> Result<PathBuf> {
        let snapshot = {
            let mut current = self.current.lock().unwrap();
            let Some(mut log) = current.take() else {
                return Err(PhotocopyError::Transaction(
                    "no transaction in progress".to_string(),
                ));
            };
            log.status = status;
            log.end_time = Some(Utc::now());
            log.error_message = message;
            log
        };

        let path = self.path_for(&snapshot.transaction_id);
        snapshot.save(&path)?;
        tracing::debug!(transaction = %snapshot.transaction_id, ?status, "transaction closed");
        Ok(path)
    }
}

/// Metadata for every `photocopy-*.json` log in `dir`.
///
/// Malformed files are skipped silently; a missing directory yields an
/// empty list. Ordering is the caller's concern.
pub fn list_transaction_logs(dir: &Path) -> Vec<TransactionLogSummary> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut summaries = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with("photocopy-") || !name.ends_with(".json") {
            continue;
        }
        let Ok(log) = TransactionLog::load(&path) else {
            continue;
        };
        summaries.push(TransactionLogSummary {
            transaction_id: log.transaction_id,
            start_time: log.start_time,
            status: log.status,
            operation_count: log.operations.len(),
            file_path: path,
        });
    }
    summaries
}
