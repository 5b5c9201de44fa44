//! Asynchronous checkpoint writer
//!
//! The executor records per-file completion from many worker threads at
//! once. Updates land in memory through atomics (word-level `fetch_or` on
//! the bitset, atomic adds on the counters) and a background flush thread
//! coalesces them to disk every few hundred milliseconds, so the write
//! amplification per completed file stays bounded. `flush()` forces a
//! durable write; data survives a crash up to the last completed flush.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender};

use super::{
    bitmap_to_bytes, CheckpointState, CheckpointStatistics, Layout, OperationRecord,
    OperationResult,
};
use crate::error::{PhotocopyError, Result};

/// Upper bound on flush lag
const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

enum ControlMessage {
    Flush(Sender<std::io::Result<()>>),
    Shutdown,
}

struct Shared {
    total_files: u64,
    bits: Vec<AtomicU64>,
    /// Bitmap snapshot taken when the writer opened; distinguishes work
    /// completed by a previous session from this one's
    preloaded: Vec<u64>,
    files_completed: AtomicU64,
    files_failed: AtomicU64,
    files_skipped: AtomicU64,
    bytes_completed: AtomicU64,
    dirty: AtomicBool,
    pending_records: Mutex<Vec<OperationRecord>>,
    failed: Mutex<HashMap<u64, String>>,
    layout: Layout,
}

impl Shared {
    fn from_state(state: &CheckpointState) -> Self {
        Self {
            total_files: state.total_files,
            bits: state.completed.iter().map(|w| AtomicU64::new(*w)).collect(),
            preloaded: state.completed.clone(),
            files_completed: AtomicU64::new(state.statistics.files_completed),
            files_failed: AtomicU64::new(state.statistics.files_failed),
            files_skipped: AtomicU64::new(state.statistics.files_skipped),
            bytes_completed: AtomicU64::new(state.statistics.bytes_completed),
            dirty: AtomicBool::new(false),
            pending_records: Mutex::new(Vec::new()),
            failed: Mutex::new(state.failed.clone()),
            layout: Layout::for_state(state),
        }
    }

    /// Set bit `index`; true when this call flipped it
    fn set_bit(&self, index: u64) -> bool {
        let word = (index / 64) as usize;
        let mask = 1u64 << (index % 64);
        let previous = self.bits[word].fetch_or(mask, Ordering::SeqCst);
        previous & mask == 0
    }

    fn bit_is_set(&self, index: u64) -> bool {
        let word = (index / 64) as usize;
        let mask = 1u64 << (index % 64);
        self.bits[word].load(Ordering::SeqCst) & mask != 0
    }

    fn bitmap_words(&self) -> Vec<u64> {
        self.bits.iter().map(|w| w.load(Ordering::SeqCst)).collect()
    }

    fn statistics(&self) -> CheckpointStatistics {
        CheckpointStatistics {
            files_completed: self.files_completed.load(Ordering::SeqCst),
            files_failed: self.files_failed.load(Ordering::SeqCst),
            files_skipped: self.files_skipped.load(Ordering::SeqCst),
            bytes_completed: self.bytes_completed.load(Ordering::SeqCst),
            last_updated_utc: Utc::now().timestamp_millis() as u64,
        }
    }
}

/// Single owner of one checkpoint file during a run.
///
/// `record_*` and `is_completed` are callable from many threads; flushing
/// happens on a dedicated background thread that owns the file handle.
pub struct CheckpointWriter {
    shared: Arc<Shared>,
    control: Sender<ControlMessage>,
    handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    path: PathBuf,
}

impl CheckpointWriter {
    /// Create a new checkpoint file for a fresh run and start the flush
    /// thread. The file is written in full (header, zero bitset,
    /// statistics) before this returns.
    pub fn create(path: &Path, state: &CheckpointState) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PhotocopyError::Checkpoint(format!("create directory: {}", e)))?;
        }

        let mut file = File::create(path)
            .map_err(|e| PhotocopyError::Checkpoint(format!("create {}: {}", path.display(), e)))?;
        file.write_all(&state.encode())
            .map_err(|e| PhotocopyError::Checkpoint(format!("write header: {}", e)))?;
        file.sync_data()
            .map_err(|e| PhotocopyError::Checkpoint(format!("sync header: {}", e)))?;

        Self::start(path.to_path_buf(), file, state, 0)
    }

    /// Reopen an existing checkpoint for a resumed run. The trailer keeps
    /// growing from its current end.
    pub fn resume(path: &Path, state: &CheckpointState) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| PhotocopyError::Checkpoint(format!("open {}: {}", path.display(), e)))?;

        let layout = Layout::for_state(state);
        let len = file
            .metadata()
            .map_err(|e| PhotocopyError::Checkpoint(format!("stat checkpoint: {}", e)))?
            .len();
        let existing_records = len.saturating_sub(layout.records_offset) / super::RECORD_SIZE as u64;

        Self::start(path.to_path_buf(), file, state, existing_records)
    }

    fn start(
        path: PathBuf,
        file: File,
        state: &CheckpointState,
        existing_records: u64,
    ) -> Result<Self> {
        let shared = Arc::new(Shared::from_state(state));
        let (tx, rx) = bounded::<ControlMessage>(16);

        let flush_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("checkpoint-flush".to_string())
            .spawn(move || flush_loop(file, flush_shared, rx, existing_records))
            .map_err(|e| PhotocopyError::Checkpoint(format!("spawn flush thread: {}", e)))?;

        Ok(Self {
            shared,
            control: tx,
            handle: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a terminal success for one plan index
    pub fn record_completion(&self, index: u64, result: OperationResult, bytes: u64) -> Result<()> {
        if !matches!(result, OperationResult::Completed | OperationResult::Skipped) {
            return Err(PhotocopyError::InvalidArgument(format!(
                "record_completion does not accept {:?}",
                result
            )));
        }
        self.record(index, result, bytes, None)
    }

    /// Record a terminal failure with its message
    pub fn record_failure(&self, index: u64, bytes: u64, message: &str) -> Result<()> {
        self.record(index, OperationResult::Failed, bytes, Some(message))
    }

    /// Record a move whose copy landed but whose source delete failed.
    /// The unit counts as failed; the trailer keeps the intermediate state
    /// so the pending delete survives a reload.
    pub fn record_pending_delete(&self, index: u64, bytes: u64, message: &str) -> Result<()> {
        self.record(index, OperationResult::CopyDonePendingDelete, bytes, Some(message))
    }

    fn record(
        &self,
        index: u64,
        result: OperationResult,
        bytes: u64,
        message: Option<&str>,
    ) -> Result<()> {
        if index >= self.shared.total_files {
            return Err(PhotocopyError::InvalidArgument(format!(
                "index {} out of range ({} files)",
                index, self.shared.total_files
            )));
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(PhotocopyError::Checkpoint("writer is closed".to_string()));
        }

        // The bit flips exactly once per index; repeated records for the
        // same index neither double-count statistics nor grow the trailer.
        if !self.shared.set_bit(index) {
            return Ok(());
        }

        match result {
            OperationResult::Completed => {
                self.shared.files_completed.fetch_add(1, Ordering::SeqCst);
                self.shared.bytes_completed.fetch_add(bytes, Ordering::SeqCst);
            }
            OperationResult::Skipped => {
                self.shared.files_skipped.fetch_add(1, Ordering::SeqCst);
            }
            OperationResult::Failed | OperationResult::CopyDonePendingDelete => {
                self.shared.files_failed.fetch_add(1, Ordering::SeqCst);
                if let Some(message) = message {
                    self.shared
                        .failed
                        .lock()
                        .unwrap()
                        .insert(index, message.to_string());
                }
            }
        }

        self.shared.pending_records.lock().unwrap().push(OperationRecord {
            index,
            result,
            file_size: bytes,
            timestamp: Utc::now().timestamp_millis() as u64,
        });
        self.shared.dirty.store(true, Ordering::SeqCst);

        Ok(())
    }

    /// Whether an index is in a terminal state. Out-of-range indices are
    /// simply not completed.
    pub fn is_completed(&self, index: u64) -> bool {
        if index >= self.shared.total_files {
            return false;
        }
        self.shared.bit_is_set(index)
    }

    /// Whether an index was already terminal when this writer opened,
    /// i.e. completed by a previous session
    pub fn was_completed_at_open(&self, index: u64) -> bool {
        if index >= self.shared.total_files {
            return false;
        }
        let word = (index / 64) as usize;
        self.shared.preloaded[word] & (1 << (index % 64)) != 0
    }

    /// Snapshot of the aggregate counters
    pub fn get_statistics(&self) -> CheckpointStatistics {
        self.shared.statistics()
    }

    /// Failure messages recorded in this session (plus placeholders loaded
    /// from a resumed checkpoint)
    pub fn failed_files(&self) -> HashMap<u64, String> {
        self.shared.failed.lock().unwrap().clone()
    }

    /// Force a durable write of everything recorded so far
    pub fn flush(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let (ack_tx, ack_rx) = bounded(1);
        self.control
            .send(ControlMessage::Flush(ack_tx))
            .map_err(|_| PhotocopyError::Checkpoint("flush thread is gone".to_string()))?;
        match ack_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PhotocopyError::Checkpoint(format!("flush failed: {}", e))),
            Err(_) => Err(PhotocopyError::Checkpoint("flush thread is gone".to_string())),
        }
    }

    /// Flush and stop the flush thread; the run finished cleanly
    pub fn complete(&self) -> Result<()> {
        self.flush()?;
        self.shutdown()
    }

    /// Flush and stop the flush thread; the run finished with failures
    pub fn fail(&self, message: &str) -> Result<()> {
        tracing::warn!(checkpoint = %self.path.display(), message, "run failed");
        self.flush()?;
        self.shutdown()
    }

    fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.control.send(ControlMessage::Shutdown);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle
                .join()
                .map_err(|_| PhotocopyError::Checkpoint("flush thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for CheckpointWriter {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn flush_loop(
    mut file: File,
    shared: Arc<Shared>,
    rx: Receiver<ControlMessage>,
    mut written_records: u64,
) {
    loop {
        match rx.recv_timeout(FLUSH_INTERVAL) {
            Ok(ControlMessage::Flush(ack)) => {
                let result = flush_once(&mut file, &shared, &mut written_records, true);
                let _ = ack.send(result);
            }
            Ok(ControlMessage::Shutdown) => {
                if let Err(e) = flush_once(&mut file, &shared, &mut written_records, true) {
                    tracing::error!(error = %e, "final checkpoint flush failed");
                }
                break;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if let Err(e) = flush_once(&mut file, &shared, &mut written_records, false) {
                    tracing::error!(error = %e, "periodic checkpoint flush failed");
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                let _ = flush_once(&mut file, &shared, &mut written_records, true);
                break;
            }
        }
    }
}

fn flush_once(
    file: &mut File,
    shared: &Shared,
    written_records: &mut u64,
    force: bool,
) -> std::io::Result<()> {
    let records: Vec<OperationRecord> =
        std::mem::take(&mut *shared.pending_records.lock().unwrap());

    if !force && records.is_empty() && !shared.dirty.swap(false, Ordering::SeqCst) {
        return Ok(());
    }
    shared.dirty.store(false, Ordering::SeqCst);

    if !records.is_empty() {
        file.seek(SeekFrom::Start(
            shared.layout.records_offset + *written_records * super::RECORD_SIZE as u64,
        ))?;
        for record in &records {
            file.write_all(&record.encode())?;
        }
        *written_records += records.len() as u64;
    }

    let words = shared.bitmap_words();
    file.seek(SeekFrom::Start(shared.layout.bitset_offset))?;
    file.write_all(&bitmap_to_bytes(&words, shared.layout.bitset_len))?;

    let stats = shared.statistics();
    file.seek(SeekFrom::Start(shared.layout.stats_offset))?;
    file.write_all(&stats.files_completed.to_le_bytes())?;
    file.write_all(&stats.files_failed.to_le_bytes())?;
    file.write_all(&stats.files_skipped.to_le_bytes())?;
    file.write_all(&stats.bytes_completed.to_le_bytes())?;
    file.write_all(&stats.last_updated_utc.to_le_bytes())?;

    file.sync_data()
}
