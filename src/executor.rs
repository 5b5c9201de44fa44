/*!
 * Parallel plan executor
 *
 * Drives a `CopyPlan` over a bounded worker pool. Each work unit is one
 * primary file plus its sidecars, processed primary-first; units fail in
 * isolation and never abort the run. Completion is recorded per unit to
 * the checkpoint writer, every mutation goes to the transaction log when
 * rollback is enabled, and cancellation is observed before every blocking
 * step.
 */

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use rayon::prelude::*;

use crate::cancel::CancellationToken;
use crate::checkpoint::{CheckpointStatistics, CheckpointWriter, OperationResult};
use crate::config::{CopyConfig, CopyMode};
use crate::error::{PhotocopyError, Result};
use crate::plan::{CopyError, CopyPlan, FileCopyPlan, UnknownFilesReport};
use crate::progress::ProgressPublisher;
use crate::system::FileSystem;
use crate::transaction::{FileOperation, TransactionLogger};

/// Aggregate outcome of one executor run
#[derive(Debug, Default)]
pub struct CopyResult {
    /// Units that finished successfully in this run
    pub files_processed: u64,
    /// Units that failed in this run
    pub files_failed: u64,
    /// Units skipped because a prior session already completed them
    pub files_skipped: u64,
    /// Bytes accounted for, including resumed units
    pub bytes_processed: u64,
    pub errors: Vec<CopyError>,
    pub unknown_files: UnknownFilesReport,
    /// Checkpoint counters at the end of the run, when checkpointing was on
    pub statistics: Option<CheckpointStatistics>,
}

struct RunState {
    processed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    bytes: AtomicU64,
    errors: Mutex<Vec<CopyError>>,
    log_full_warned: AtomicBool,
}

impl RunState {
    fn new(seed_errors: Vec<CopyError>) -> Self {
        Self {
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            errors: Mutex::new(seed_errors),
            log_full_warned: AtomicBool::new(false),
        }
    }

    fn push_error(&self, error: CopyError) {
        self.errors.lock().unwrap().push(error);
    }
}

/// Executes copy plans against the filesystem façade
pub struct ParallelExecutor<'a> {
    fs: &'a dyn FileSystem,
    config: &'a CopyConfig,
    progress: ProgressPublisher,
    transactions: Option<&'a TransactionLogger>,
}

impl<'a> ParallelExecutor<'a> {
    pub fn new(fs: &'a dyn FileSystem, config: &'a CopyConfig) -> Self {
        Self {
            fs,
            config,
            progress: ProgressPublisher::noop(),
            transactions: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressPublisher) -> Self {
        self.progress = progress;
        self
    }

    /// Enable transaction logging for this run
    pub fn with_transaction_logger(mut self, logger: &'a TransactionLogger) -> Self {
        self.transactions = Some(logger);
        self
    }

    /// Run the plan to completion.
    ///
    /// Per-unit failures are collected, not propagated; only cancellation
    /// aborts, after in-flight units drain and the checkpoint flushes.
    pub fn execute(
        &self,
        plan: &CopyPlan,
        checkpoint: Option<&CheckpointWriter>,
        cancel: &CancellationToken,
    ) -> Result<CopyResult> {
        if self.config.dry_run {
            return Ok(self.dry_run(plan));
        }

        if let Some(logger) = self.transactions {
            logger.begin_transaction(&self.config.source, &self.config.destination, false)?;
        }

        let state = RunState::new(plan.planning_failures.clone());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.effective_parallelism())
            .build()
            .map_err(|e| PhotocopyError::Parallel(e.to_string()))?;

        let run = self.create_directories(plan, &state, cancel).and_then(|()| {
            pool.install(|| {
                plan.operations
                    .par_iter()
                    .enumerate()
                    .try_for_each(|(plan_index, op)| {
                        self.process_unit(plan_index as u64, op, checkpoint, &state, cancel)
                    })
            })
        });

        match run {
            Ok(()) => self.finish(plan, checkpoint, state),
            Err(err) if err.is_cancellation() => {
                tracing::warn!("execution cancelled, draining and flushing checkpoint");
                if let Some(cp) = checkpoint {
                    if let Err(e) = cp.flush() {
                        tracing::error!(error = %e, "checkpoint flush on cancel failed");
                    }
                }
                if let Some(logger) = self.transactions {
                    if let Err(e) = logger.fail("run cancelled") {
                        tracing::error!(error = %e, "failed to close transaction log");
                    }
                }
                Err(PhotocopyError::Cancelled)
            }
            Err(err) => Err(err),
        }
    }

    /// No mutation of the media tree: report the plan as if it had run.
    /// A transaction log is still written (marked dry-run) so the attempt
    /// is auditable; rollback refuses such logs.
    fn dry_run(&self, plan: &CopyPlan) -> CopyResult {
        if let Some(logger) = self.transactions {
            let opened = logger
                .begin_transaction(&self.config.source, &self.config.destination, true)
                .and_then(|_| logger.complete());
            if let Err(e) = opened {
                tracing::warn!(error = %e, "could not record dry-run transaction");
            }
        }

        for op in &plan.operations {
            tracing::info!(
                source = %op.source.display(),
                dest = %op.dest.display(),
                size = op.size,
                sidecars = op.sidecars.len(),
                "dry run: would {}",
                match self.config.mode {
                    CopyMode::Copy => "copy",
                    CopyMode::Move => "move",
                }
            );
        }
        for dir in &plan.directories {
            tracing::debug!(dir = %dir.display(), "dry run: would create directory");
        }

        CopyResult {
            files_processed: plan.operations.len() as u64,
            files_failed: 0,
            files_skipped: 0,
            bytes_processed: plan.total_bytes,
            errors: plan.planning_failures.clone(),
            unknown_files: plan.unknown_files.clone(),
            statistics: None,
        }
    }

    fn create_directories(
        &self,
        plan: &CopyPlan,
        state: &RunState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for dir in &plan.directories {
            cancel.check()?;
            if self.fs.directory_exists(dir) {
                continue;
            }
            match self.fs.create_directory(dir) {
                Ok(()) => self.log_directory(dir, state),
                Err(e) => {
                    tracing::error!(dir = %dir.display(), error = %e, "directory creation failed");
                    state.push_error(CopyError {
                        file_path: dir.clone(),
                        destination_path: None,
                        message: format!("Failed to create directory: {}", e),
                    });
                }
            }
        }
        Ok(())
    }

    fn log_directory(&self, dir: &Path, state: &RunState) {
        if let Some(logger) = self.transactions {
            if logger.is_log_full() {
                self.warn_log_full(state);
            } else {
                logger.log_directory_created(dir);
            }
        }
    }

    fn log_operation(&self, source: &Path, dest: &Path, size: u64, state: &RunState) {
        let Some(logger) = self.transactions else {
            return;
        };
        if logger.is_log_full() {
            self.warn_log_full(state);
            return;
        }
        let operation = match self.config.mode {
            CopyMode::Copy => FileOperation::Copy,
            CopyMode::Move => FileOperation::Move,
        };
        if let Err(e) = logger.log_operation(operation, source, dest, size) {
            tracing::warn!(error = %e, "could not record operation");
        }
    }

    fn warn_log_full(&self, state: &RunState) {
        if !state.log_full_warned.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                "transaction log is full; further operations will not be recorded"
            );
        }
    }

    /// One work unit: the primary, then its sidecars in order.
    /// Returns Err only for cancellation.
    fn process_unit(
        &self,
        index: u64,
        op: &FileCopyPlan,
        checkpoint: Option<&CheckpointWriter>,
        state: &RunState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancel.check()?;

        // Work finished by a previous session counts toward progress but
        // must not touch the disk again.
        if let Some(cp) = checkpoint {
            if cp.was_completed_at_open(index) {
                state.skipped.fetch_add(1, Ordering::SeqCst);
                state.bytes.fetch_add(op.size, Ordering::SeqCst);
                self.progress.file_skipped(
                    index,
                    file_name_of(&op.source),
                    op.size,
                );
                return Ok(());
            }
        }

        self.progress
            .file_start(index, op.source.clone(), op.dest.clone(), op.size);

        match self.transfer_primary(op, state, cancel) {
            Ok(()) => {}
            Err(UnitError::Cancelled) => return Err(PhotocopyError::Cancelled),
            Err(PendingDelete(message)) => {
                if let Some(cp) = checkpoint {
                    if let Err(e) = cp.record_pending_delete(index, op.size, &message) {
                        tracing::error!(error = %e, "failed to record pending delete");
                    }
                }
                self.fail_unit(index, op, message, state);
                return Ok(());
            }
            Err(Failure(message)) => {
                if let Some(cp) = checkpoint {
                    if let Err(e) = cp.record_failure(index, op.size, &message) {
                        tracing::error!(error = %e, "failed to record failure");
                    }
                }
                self.fail_unit(index, op, message, state);
                return Ok(());
            }
        }

        // Sidecar failures stay attributed to the sidecar; the primary is
        // already safe at its destination.
        for sidecar in &op.sidecars {
            cancel.check()?;
            if let Err(e) = self.transfer_file(&sidecar.source, &sidecar.dest, sidecar.size, state)
            {
                tracing::warn!(
                    sidecar = %sidecar.source.display(),
                    error = %e,
                    "sidecar transfer failed"
                );
                state.push_error(CopyError {
                    file_path: sidecar.source.clone(),
                    destination_path: Some(sidecar.dest.clone()),
                    message: e,
                });
            }
        }

        if let Some(cp) = checkpoint {
            if let Err(e) = cp.record_completion(index, OperationResult::Completed, op.size) {
                tracing::error!(error = %e, "failed to record completion");
            }
        }

        let processed = state.processed.fetch_add(1, Ordering::SeqCst) + 1;
        let bytes = state.bytes.fetch_add(op.size, Ordering::SeqCst) + op.size;
        self.progress
            .file_completed(index, file_name_of(&op.source), op.size, processed, bytes);

        Ok(())
    }

    fn fail_unit(&self, index: u64, op: &FileCopyPlan, message: String, state: &RunState) {
        tracing::error!(
            file = %op.source.display(),
            dest = %op.dest.display(),
            %message,
            "file operation failed"
        );
        state.failed.fetch_add(1, Ordering::SeqCst);
        state.push_error(CopyError {
            file_path: op.source.clone(),
            destination_path: Some(op.dest.clone()),
            message: message.clone(),
        });
        self.progress
            .file_failed(index, file_name_of(&op.source), message);
    }

    /// Copy or move the primary into place
    fn transfer_primary(
        &self,
        op: &FileCopyPlan,
        state: &RunState,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), UnitError> {
        if let Some(parent) = op.dest.parent() {
            if !self.fs.directory_exists(parent) {
                self.fs
                    .create_directory(parent)
                    .map_err(|e| Failure(e.to_string()))?;
                self.log_directory(parent, state);
            }
        }

        cancel
            .check()
            .map_err(|_| UnitError::Cancelled)?;

        self.fs
            .copy_file(&op.source, &op.dest, self.config.overwrite)
            .map_err(|e| Failure(e.to_string()))?;
        self.log_operation(&op.source, &op.dest, op.size, state);

        if self.config.mode == CopyMode::Move {
            if let Err(e) = self.fs.delete_file(&op.source) {
                return Err(PendingDelete(format!(
                    "copy succeeded but source delete failed: {}",
                    e
                )));
            }
        }

        Ok(())
    }

    /// Copy or move one sidecar; the transaction entry mirrors the mode
    fn transfer_file(
        &self,
        source: &Path,
        dest: &Path,
        size: u64,
        state: &RunState,
    ) -> std::result::Result<(), String> {
        if let Some(parent) = dest.parent() {
            if !self.fs.directory_exists(parent) {
                self.fs
                    .create_directory(parent)
                    .map_err(|e| e.to_string())?;
                self.log_directory(parent, state);
            }
        }

        self.fs
            .copy_file(source, dest, self.config.overwrite)
            .map_err(|e| e.to_string())?;
        self.log_operation(source, dest, size, state);

        if self.config.mode == CopyMode::Move {
            self.fs.delete_file(source).map_err(|e| e.to_string())?;
        }

        Ok(())
    }

    fn finish(
        &self,
        plan: &CopyPlan,
        checkpoint: Option<&CheckpointWriter>,
        state: RunState,
    ) -> Result<CopyResult> {
        let failed = state.failed.load(Ordering::SeqCst);
        let statistics = match checkpoint {
            Some(cp) => {
                cp.flush()?;
                let stats = cp.get_statistics();
                if failed == 0 {
                    cp.complete()?;
                } else {
                    cp.fail(&format!("{} files failed", failed))?;
                }
                Some(stats)
            }
            None => None,
        };

        if let Some(logger) = self.transactions {
            let outcome = if failed == 0 {
                logger.complete()
            } else {
                logger.fail(&format!("{} files failed", failed))
            };
            if let Err(e) = outcome {
                tracing::error!(error = %e, "failed to close transaction log");
            }
        }

        let result = CopyResult {
            files_processed: state.processed.load(Ordering::SeqCst),
            files_failed: failed,
            files_skipped: state.skipped.load(Ordering::SeqCst),
            bytes_processed: state.bytes.load(Ordering::SeqCst),
            errors: state.errors.into_inner().unwrap(),
            unknown_files: plan.unknown_files.clone(),
            statistics,
        };

        self.progress.run_complete(
            result.files_processed,
            result.files_failed,
            result.files_skipped,
            result.bytes_processed,
        );

        tracing::info!(
            processed = result.files_processed,
            failed = result.files_failed,
            skipped = result.files_skipped,
            bytes = result.bytes_processed,
            "execution finished"
        );

        Ok(result)
    }
}

/// Internal unit outcome; only the executor sees it
enum UnitError {
    Failure(String),
    /// Move copy landed, source delete did not
    PendingDelete(String),
    Cancelled,
}

use UnitError::{Failure, PendingDelete};

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}
