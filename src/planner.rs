/*!
 * Copy plan builder
 *
 * Walks the enumerated file set in order, applies the validator chain,
 * expands the destination template and reserves a unique destination for
 * every surviving file. The resulting `CopyPlan` is deterministic for a
 * given input order and immutable afterwards.
 */

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::CopyConfig;
use crate::error::{PhotocopyError, Result};
use crate::location::LocationStatistics;
use crate::media::FileRef;
use crate::plan::{CopyError, CopyPlan, FileCopyPlan, RelatedFilePlan};
use crate::system::FileSystem;
use crate::template::PathTemplate;
use crate::validate::ValidatorChain;

/// Attempt cap for duplicate-name resolution
const MAX_DUPLICATE_ATTEMPTS: u32 = 10_000;

/// Destination paths committed to during planning but not yet written.
///
/// Shared-mutable with insert-if-absent semantics so the sequential and
/// parallel planning paths behave identically.
#[derive(Debug, Default)]
struct ReservedPaths {
    inner: Mutex<HashSet<PathBuf>>,
}

impl ReservedPaths {
    fn try_reserve(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().insert(path.to_path_buf())
    }

    fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

/// Builds `CopyPlan`s for one run configuration
pub struct Planner<'a> {
    fs: &'a dyn FileSystem,
    config: &'a CopyConfig,
    template: PathTemplate,
    location_stats: Arc<LocationStatistics>,
    reserved: ReservedPaths,
}

impl<'a> Planner<'a> {
    pub fn new(fs: &'a dyn FileSystem, config: &'a CopyConfig) -> Self {
        let location_stats = Arc::new(LocationStatistics::new());
        let context: Arc<dyn crate::location::PathGeneratorContext> = location_stats.clone();
        let template = PathTemplate::new(&config.destination, config).with_context(context);

        Self {
            fs,
            config,
            template,
            location_stats,
            reserved: ReservedPaths::default(),
        }
    }

    /// Produce the operation list for `files`, in input order.
    ///
    /// Validation skips and duplicate-resolution failures are recorded in
    /// the plan rather than aborting it; planning only fails on invariant
    /// violations.
    pub fn build_plan(&self, files: &[FileRef], validators: &ValidatorChain) -> Result<CopyPlan> {
        self.reserved.clear();
        self.location_stats.reset();

        // Conditional template variables need run-wide counts, so the
        // histograms are complete before the first expansion.
        for file in files {
            if let Some(ref location) = file.location {
                self.location_stats.record(location);
            }
        }

        let mut plan = CopyPlan::default();

        for (index, file) in files.iter().enumerate() {
            if file.location.as_ref().map_or(true, |l| l.is_empty()) {
                let reason = file
                    .unknown_reason
                    .as_deref()
                    .unwrap_or("no location data");
                plan.unknown_files.record(reason);
            }

            if let Some(failure) = validators.check(file) {
                tracing::debug!(file = %file.path.display(), validator = %failure.validator,
                    reason = %failure.reason, "file rejected by validator");
                plan.skipped.push(failure);
                continue;
            }

            let candidate = PathBuf::from(self.template.expand(file));
            let dest = match self.resolve_duplicate(&candidate) {
                Ok(Some(dest)) => dest,
                Ok(None) => {
                    tracing::debug!(file = %file.path.display(),
                        dest = %candidate.display(), "destination exists, skipping");
                    plan.skipped.push(crate::plan::ValidationFailure {
                        file: file.path.clone(),
                        validator: "skip-existing".to_string(),
                        reason: format!("destination {} already exists", candidate.display()),
                    });
                    continue;
                }
                Err(err @ PhotocopyError::DuplicatesExhausted { .. }) => {
                    plan.planning_failures.push(CopyError {
                        file_path: file.path.clone(),
                        destination_path: Some(candidate.clone()),
                        message: err.to_string(),
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };

            if let Some(parent) = dest.parent() {
                plan.directories.insert(parent.to_path_buf());
            }
            plan.total_bytes += file.size;

            let mut sidecars = Vec::with_capacity(file.sidecars.len());
            for sidecar in &file.sidecars {
                let sidecar_dest = self.template.expand_for_sidecar(file, &dest, sidecar);
                if let Some(parent) = sidecar_dest.parent() {
                    plan.directories.insert(parent.to_path_buf());
                }
                sidecars.push(RelatedFilePlan {
                    source: sidecar.path.clone(),
                    dest: sidecar_dest,
                    size: sidecar.size,
                });
            }

            plan.operations.push(FileCopyPlan {
                file_index: index,
                source: file.path.clone(),
                dest,
                size: file.size,
                sidecars,
            });
        }

        tracing::info!(
            operations = plan.operations.len(),
            skipped = plan.skipped.len(),
            total_bytes = plan.total_bytes,
            "plan built"
        );

        Ok(plan)
    }

    /// Find a destination that is free on disk and unclaimed by this plan.
    ///
    /// Behavior follows the configuration: skip when the destination exists
    /// and `skip_existing` is set, reuse the path verbatim when `overwrite`
    /// is set, otherwise probe `base<suffix>ext` candidates until one is
    /// free, up to the attempt cap.
    fn resolve_duplicate(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !self.fs.file_exists(path) && self.reserved.try_reserve(path) {
            return Ok(Some(path.to_path_buf()));
        }

        if self.config.skip_existing {
            return Ok(None);
        }

        if self.config.overwrite {
            return Ok(Some(path.to_path_buf()));
        }

        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        for counter in 1..=MAX_DUPLICATE_ATTEMPTS {
            let candidate = parent.join(format!(
                "{}{}{}",
                stem,
                format_duplicate_suffix(&self.config.duplicates_format, counter),
                ext
            ));
            if !self.fs.file_exists(&candidate) && self.reserved.try_reserve(&candidate) {
                return Ok(Some(candidate));
            }
        }

        Err(PhotocopyError::DuplicatesExhausted {
            path: path.to_path_buf(),
            attempts: MAX_DUPLICATE_ATTEMPTS,
        })
    }
}

/// Render the duplicate suffix for one attempt.
///
/// A format without the `{number}` placeholder would generate the same
/// candidate forever, so the counter is appended instead.
fn format_duplicate_suffix(format: &str, counter: u32) -> String {
    if format.contains("{number}") {
        format.replace("{number}", &counter.to_string())
    } else {
        format!("{}{}", format, counter)
    }
}
