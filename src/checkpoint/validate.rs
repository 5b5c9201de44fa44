//! Resume validation and the hashes it compares
//!
//! A checkpoint may only seed a resume when it provably belongs to the
//! same run: same source, same destination pattern, same
//! placement-affecting configuration. Anything else restarts fresh.

use chrono::Utc;
use sha2::{Digest, Sha256};

use super::{normalize_path, CheckpointState};
use crate::config::CopyConfig;
use crate::media::FileRef;

/// Days before a checkpoint draws an age warning
const STALE_AFTER_DAYS: i64 = 30;

/// Outcome of checking a checkpoint against the current configuration
#[derive(Debug, Clone)]
pub struct ResumeValidation {
    pub is_valid: bool,
    pub total_operations: u64,
    pub completed_operations: u64,
    pub pending_operations: u64,
    pub invalid_reason: Option<String>,
    pub warnings: Vec<String>,
}

impl ResumeValidation {
    fn invalid(checkpoint: &CheckpointState, reason: &str) -> Self {
        let completed = checkpoint.completed_count();
        Self {
            is_valid: false,
            total_operations: checkpoint.total_files,
            completed_operations: completed,
            pending_operations: checkpoint.total_files - completed,
            invalid_reason: Some(reason.to_string()),
            warnings: Vec::new(),
        }
    }
}

/// Apply the resume rules in order: directory match, pattern match,
/// configuration hash, completion state; then append warnings.
pub fn validate(checkpoint: &CheckpointState, config: &CopyConfig) -> ResumeValidation {
    if normalize_path(&checkpoint.source_dir) != normalize_path(&config.source.to_string_lossy()) {
        return ResumeValidation::invalid(checkpoint, "Source directory mismatch");
    }

    if normalize_path(&checkpoint.destination_pattern) != normalize_path(&config.destination) {
        return ResumeValidation::invalid(checkpoint, "Destination pattern mismatch");
    }

    if compute_config_hash(config) != checkpoint.config_hash {
        return ResumeValidation::invalid(checkpoint, "Configuration has changed");
    }

    if checkpoint.all_completed() {
        return ResumeValidation::invalid(checkpoint, "Already completed");
    }

    let mut warnings = Vec::new();
    let age_ms = Utc::now().timestamp_millis() - checkpoint.started_utc as i64;
    let age_days = age_ms / (24 * 60 * 60 * 1000);
    if age_days > STALE_AFTER_DAYS {
        warnings.push(format!("Checkpoint is {} days old", age_days));
    }

    let completed = checkpoint.completed_count();
    ResumeValidation {
        is_valid: true,
        total_operations: checkpoint.total_files,
        completed_operations: completed,
        pending_operations: checkpoint.total_files - completed,
        invalid_reason: None,
        warnings,
    }
}

/// Warning when the enumerated file set no longer matches the checkpoint.
/// A changed plan does not invalidate the resume by itself (completed
/// indices are still skipped) but the user should know.
pub fn check_plan_hash(checkpoint: &CheckpointState, plan_hash: [u8; 32]) -> Option<String> {
    if checkpoint.plan_hash != plan_hash {
        Some("File set has changed since the checkpoint was created".to_string())
    } else {
        None
    }
}

/// Hash of the placement-affecting configuration only.
///
/// Fields that do not influence where a file lands (parallelism, logging,
/// progress) are excluded, so changing them never forfeits a resume.
pub fn compute_config_hash(config: &CopyConfig) -> [u8; 32] {
    let canonical = format!(
        "destination={}\nmode={:?}\nduplicates_format={}\npath_casing={:?}\n\
         use_full_country_names={}\nlocation_granularity={:?}\n\
         unknown_location_fallback={}\nmin_date={}\nmax_date={}\n\
         skip_existing={}\noverwrite={}\n",
        config.destination,
        config.mode,
        config.duplicates_format,
        config.path_casing,
        config.use_full_country_names,
        config.location_granularity,
        config.unknown_location_fallback,
        config.min_date.map(|d| d.to_string()).unwrap_or_default(),
        config.max_date.map(|d| d.to_string()).unwrap_or_default(),
        config.skip_existing,
        config.overwrite,
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.finalize().into()
}

/// Hash of the ordered `(path, length)` sequence of the enumerated files
pub fn compute_plan_hash(files: &[FileRef]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for file in files {
        hasher.update(file.path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(file.size.to_le_bytes());
    }
    hasher.finalize().into()
}
