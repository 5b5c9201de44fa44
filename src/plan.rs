/*!
 * Plan data structures produced by the planner and consumed by the executor
 */

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

/// A sidecar operation attached to a primary plan entry
#[derive(Debug, Clone)]
pub struct RelatedFilePlan {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub size: u64,
}

/// One planned copy/move: a primary file plus its sidecars.
///
/// `file_index` points back into the planner's input slice; sidecars
/// reference their parent through this index rather than back-pointers.
#[derive(Debug, Clone)]
pub struct FileCopyPlan {
    pub file_index: usize,
    pub source: PathBuf,
    pub dest: PathBuf,
    pub size: u64,
    pub sidecars: Vec<RelatedFilePlan>,
}

/// A file rejected before planning its destination
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub file: PathBuf,
    pub validator: String,
    pub reason: String,
}

/// A non-fatal per-file error, surfaced with enough context to render
#[derive(Debug, Clone)]
pub struct CopyError {
    pub file_path: PathBuf,
    pub destination_path: Option<PathBuf>,
    pub message: String,
}

/// Tally of files routed through fallback locations because required
/// metadata was absent
#[derive(Debug, Clone, Default)]
pub struct UnknownFilesReport {
    pub total: u64,
    pub reasons: HashMap<String, u64>,
}

impl UnknownFilesReport {
    pub fn record(&mut self, reason: &str) {
        self.total += 1;
        *self.reasons.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// The deterministic, pre-resolved operation list for one run.
///
/// Immutable after planning: destinations are unique, directories are the
/// full pre-create set, and `total_bytes` sums the primary sizes.
#[derive(Debug, Clone, Default)]
pub struct CopyPlan {
    pub operations: Vec<FileCopyPlan>,
    pub skipped: Vec<ValidationFailure>,
    pub planning_failures: Vec<CopyError>,
    pub directories: BTreeSet<PathBuf>,
    pub total_bytes: u64,
    pub unknown_files: UnknownFilesReport,
}

impl CopyPlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
