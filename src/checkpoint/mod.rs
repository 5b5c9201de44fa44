/*!
 * Binary checkpoint store
 *
 * One checkpoint file records which plan indices have reached a terminal
 * state, plus aggregate statistics, in a fixed little-endian layout:
 *
 * ```text
 * offset  size  field
 * 0       8     magic "PCHK\x00\x01\x00\x00"
 * 8       4     schema version (u32)
 * 12      16    session id
 * 28      8     started_utc (ms since epoch, u64)
 * 36      8     total_files (u64)
 * 44      8     total_bytes (u64)
 * 52      32    config_hash
 * 84      32    plan_hash
 * 116     4     source_dir length n1
 * 120     n1    UTF-8 source_dir
 * ..      4     destination_pattern length n2
 * ..      n2    UTF-8 destination_pattern
 * P       ⌈n/8⌉ completion bitset (bit i = file i complete)
 * S       40    files_completed, files_failed, files_skipped,
 *               bytes_completed, last_updated_utc (u64 each)
 * R       ..    fixed-size OperationRecord trailer, in completion order
 * ```
 *
 * Rewrites touch only the bitset, statistics and trailer, so write
 * amplification per flush is bounded by the bitset size. A truncated or
 * foreign file loads as `None` and is treated as "no checkpoint".
 */

mod validate;
mod writer;

pub use validate::{
    check_plan_hash, compute_config_hash, compute_plan_hash, validate, ResumeValidation,
};
pub use writer::CheckpointWriter;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::CopyConfig;

/// Identifies the format and its major version
pub const MAGIC: [u8; 8] = *b"PCHK\x00\x01\x00\x00";

/// Schema version written into new checkpoints
pub const SCHEMA_VERSION: u32 = 1;

/// Bytes per trailer record: index + result code + file size + timestamp
pub const RECORD_SIZE: usize = 25;

/// File extension for checkpoint files
pub const CHECKPOINT_EXTENSION: &str = "pchk";

/// Smallest parseable file: fixed header plus two zero-length strings
const MIN_FILE_LEN: usize = 124;

/// Terminal (or intermediate, for moves) state of one plan index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Completed,
    Skipped,
    Failed,
    /// A move whose copy landed but whose source delete is unconfirmed
    CopyDonePendingDelete,
}

impl OperationResult {
    pub fn code(self) -> u8 {
        match self {
            OperationResult::Completed => 0,
            OperationResult::Skipped => 1,
            OperationResult::Failed => 2,
            OperationResult::CopyDonePendingDelete => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(OperationResult::Completed),
            1 => Some(OperationResult::Skipped),
            2 => Some(OperationResult::Failed),
            3 => Some(OperationResult::CopyDonePendingDelete),
            _ => None,
        }
    }
}

/// One trailer entry, appended when a file reaches a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationRecord {
    pub index: u64,
    pub result: OperationResult,
    pub file_size: u64,
    pub timestamp: u64,
}

impl OperationRecord {
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..8].copy_from_slice(&self.index.to_le_bytes());
        buf[8] = self.result.code();
        buf[9..17].copy_from_slice(&self.file_size.to_le_bytes());
        buf[17..25].copy_from_slice(&self.timestamp.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RECORD_SIZE {
            return None;
        }
        Some(Self {
            index: u64::from_le_bytes(buf[0..8].try_into().ok()?),
            result: OperationResult::from_code(buf[8])?,
            file_size: u64::from_le_bytes(buf[9..17].try_into().ok()?),
            timestamp: u64::from_le_bytes(buf[17..25].try_into().ok()?),
        })
    }
}

/// Aggregate counters persisted alongside the bitset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointStatistics {
    pub files_completed: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
    pub bytes_completed: u64,
    pub last_updated_utc: u64,
}

/// Byte offsets of the rewritable regions, derived from the header
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    pub bitset_offset: u64,
    pub bitset_len: usize,
    pub stats_offset: u64,
    pub records_offset: u64,
}

impl Layout {
    pub(crate) fn for_state(state: &CheckpointState) -> Self {
        let header_len =
            120 + state.source_dir.len() as u64 + 4 + state.destination_pattern.len() as u64;
        let bitset_len = state.total_files.div_ceil(8) as usize;
        let stats_offset = header_len + bitset_len as u64;
        Self {
            bitset_offset: header_len,
            bitset_len,
            stats_offset,
            records_offset: stats_offset + 40,
        }
    }
}

/// In-memory image of one checkpoint file
#[derive(Debug, Clone)]
pub struct CheckpointState {
    pub version: u32,
    pub session_id: [u8; 16],
    pub started_utc: u64,
    pub source_dir: String,
    pub destination_pattern: String,
    pub config_hash: [u8; 32],
    pub plan_hash: [u8; 32],
    pub total_files: u64,
    pub total_bytes: u64,
    /// Completion bitmap, 64 indices per word, LSB first
    pub completed: Vec<u64>,
    /// Failed indices and their messages. Messages survive only within a
    /// session; reloaded checkpoints carry a placeholder.
    pub failed: HashMap<u64, String>,
    pub statistics: CheckpointStatistics,
    /// Moves whose copy landed but whose source delete never confirmed
    pub pending_source_deletion: HashSet<u64>,
}

impl CheckpointState {
    /// Fresh state covering `total_files` plan indices
    pub fn new(
        total_files: u64,
        total_bytes: u64,
        source_dir: String,
        destination_pattern: String,
        config_hash: [u8; 32],
        plan_hash: [u8; 32],
    ) -> Self {
        let words = total_files.div_ceil(64) as usize;
        Self {
            version: SCHEMA_VERSION,
            session_id: rand::random(),
            started_utc: Utc::now().timestamp_millis() as u64,
            source_dir,
            destination_pattern,
            config_hash,
            plan_hash,
            total_files,
            total_bytes,
            completed: vec![0; words],
            failed: HashMap::new(),
            statistics: CheckpointStatistics::default(),
            pending_source_deletion: HashSet::new(),
        }
    }

    pub fn is_completed(&self, index: u64) -> bool {
        if index >= self.total_files {
            return false;
        }
        let word = (index / 64) as usize;
        let bit = index % 64;
        self.completed
            .get(word)
            .map(|w| w & (1 << bit) != 0)
            .unwrap_or(false)
    }

    pub fn set_completed(&mut self, index: u64) {
        if index >= self.total_files {
            return;
        }
        let word = (index / 64) as usize;
        let bit = index % 64;
        self.completed[word] |= 1 << bit;
    }

    /// Number of indices in a terminal state
    pub fn completed_count(&self) -> u64 {
        self.completed.iter().map(|w| w.count_ones() as u64).sum()
    }

    pub fn all_completed(&self) -> bool {
        self.total_files > 0 && self.completed_count() == self.total_files
    }

    /// Default file name for this session's checkpoint
    pub fn file_name(&self) -> String {
        format!("{}.{}", hex::encode(self.session_id), CHECKPOINT_EXTENSION)
    }

    /// Serialize header + bitset + statistics (no trailer)
    pub(crate) fn encode(&self) -> Vec<u8> {
        let layout = Layout::for_state(self);
        let mut buf = Vec::with_capacity(layout.records_offset as usize);

        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.session_id);
        buf.extend_from_slice(&self.started_utc.to_le_bytes());
        buf.extend_from_slice(&self.total_files.to_le_bytes());
        buf.extend_from_slice(&self.total_bytes.to_le_bytes());
        buf.extend_from_slice(&self.config_hash);
        buf.extend_from_slice(&self.plan_hash);
        buf.extend_from_slice(&(self.source_dir.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.source_dir.as_bytes());
        buf.extend_from_slice(&(self.destination_pattern.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.destination_pattern.as_bytes());

        buf.extend_from_slice(&bitmap_to_bytes(&self.completed, layout.bitset_len));

        buf.extend_from_slice(&self.statistics.files_completed.to_le_bytes());
        buf.extend_from_slice(&self.statistics.files_failed.to_le_bytes());
        buf.extend_from_slice(&self.statistics.files_skipped.to_le_bytes());
        buf.extend_from_slice(&self.statistics.bytes_completed.to_le_bytes());
        buf.extend_from_slice(&self.statistics.last_updated_utc.to_le_bytes());

        buf
    }
}

/// Flatten bitmap words into the on-disk byte form
pub(crate) fn bitmap_to_bytes(words: &[u64], len: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 8);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes.truncate(len);
    bytes.resize(len, 0);
    bytes
}

fn bytes_to_bitmap(bytes: &[u8], total_files: u64) -> Vec<u64> {
    let words = total_files.div_ceil(64) as usize;
    let mut out = vec![0u64; words];
    for (i, byte) in bytes.iter().enumerate() {
        out[i / 8] |= (*byte as u64) << ((i % 8) * 8);
    }
    out
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(
        buf.get(offset..offset + 4)?.try_into().ok()?,
    ))
}

fn read_u64(buf: &[u8], offset: usize) -> Option<u64> {
    Some(u64::from_le_bytes(
        buf.get(offset..offset + 8)?.try_into().ok()?,
    ))
}

/// Parse a checkpoint file.
///
/// Returns `None` for a missing, truncated or foreign file; a missing
/// record trailer is tolerated. Failure messages are not stored on disk,
/// so reloaded failures carry a placeholder message.
pub fn load(path: &Path) -> Option<CheckpointState> {
    let buf = fs::read(path).ok()?;
    if buf.len() < MIN_FILE_LEN || buf[0..8] != MAGIC {
        return None;
    }

    let version = read_u32(&buf, 8)?;
    let mut session_id = [0u8; 16];
    session_id.copy_from_slice(buf.get(12..28)?);
    let started_utc = read_u64(&buf, 28)?;
    let total_files = read_u64(&buf, 36)?;
    let total_bytes = read_u64(&buf, 44)?;
    let mut config_hash = [0u8; 32];
    config_hash.copy_from_slice(buf.get(52..84)?);
    let mut plan_hash = [0u8; 32];
    plan_hash.copy_from_slice(buf.get(84..116)?);

    let n1 = read_u32(&buf, 116)? as usize;
    let source_dir = String::from_utf8(buf.get(120..120 + n1)?.to_vec()).ok()?;
    let dest_len_offset = 120 + n1;
    let n2 = read_u32(&buf, dest_len_offset)? as usize;
    let dest_offset = dest_len_offset + 4;
    let destination_pattern = String::from_utf8(buf.get(dest_offset..dest_offset + n2)?.to_vec()).ok()?;

    let bitset_offset = dest_offset + n2;
    let bitset_len = total_files.div_ceil(8) as usize;
    let bitset = buf.get(bitset_offset..bitset_offset + bitset_len)?;
    let completed = bytes_to_bitmap(bitset, total_files);

    let stats_offset = bitset_offset + bitset_len;
    let statistics = CheckpointStatistics {
        files_completed: read_u64(&buf, stats_offset)?,
        files_failed: read_u64(&buf, stats_offset + 8)?,
        files_skipped: read_u64(&buf, stats_offset + 16)?,
        bytes_completed: read_u64(&buf, stats_offset + 24)?,
        last_updated_utc: read_u64(&buf, stats_offset + 32)?,
    };

    let mut failed = HashMap::new();
    let mut pending_source_deletion = HashSet::new();
    let records_offset = stats_offset + 40;
    if buf.len() > records_offset {
        for chunk in buf[records_offset..].chunks_exact(RECORD_SIZE) {
            let Some(record) = OperationRecord::decode(chunk) else {
                break;
            };
            match record.result {
                OperationResult::Failed => {
                    failed.insert(record.index, "failed in a previous session".to_string());
                }
                OperationResult::CopyDonePendingDelete => {
                    failed.insert(record.index, "source delete unconfirmed".to_string());
                    pending_source_deletion.insert(record.index);
                }
                _ => {}
            }
        }
    }

    Some(CheckpointState {
        version,
        session_id,
        started_utc,
        source_dir,
        destination_pattern,
        config_hash,
        plan_hash,
        total_files,
        total_bytes,
        completed,
        failed,
        statistics,
        pending_source_deletion,
    })
}

/// Directory where checkpoints for this destination live: the configured
/// override, or `.photocopy/` at the longest literal prefix of the
/// destination pattern.
pub fn checkpoint_directory(config: &CopyConfig) -> PathBuf {
    match config.checkpoint_dir {
        Some(ref dir) => dir.clone(),
        None => config.destination_root().join(".photocopy"),
    }
}

/// Slashes forward, trailing separators stripped; used when comparing
/// stored paths against the current configuration
pub fn normalize_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Newest checkpoint in the configured directory matching this run's
/// source and destination pattern
pub fn find_latest(config: &CopyConfig) -> Option<(PathBuf, CheckpointState)> {
    let dir = checkpoint_directory(config);
    let entries = fs::read_dir(&dir).ok()?;

    let source = normalize_path(&config.source.to_string_lossy());
    let pattern = normalize_path(&config.destination);

    let mut best: Option<(PathBuf, CheckpointState)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(CHECKPOINT_EXTENSION) {
            continue;
        }
        let Some(state) = load(&path) else {
            tracing::debug!(path = %path.display(), "skipping unreadable checkpoint");
            continue;
        };
        if normalize_path(&state.source_dir) != source
            || normalize_path(&state.destination_pattern) != pattern
        {
            continue;
        }
        let newer = match best {
            Some((_, ref current)) => state.started_utc > current.started_utc,
            None => true,
        };
        if newer {
            best = Some((path, state));
        }
    }
    best
}
