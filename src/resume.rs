/*!
 * Resume orchestration
 *
 * Decides, before planning, whether a run starts fresh, resumes a prior
 * checkpoint, or needs the user to choose. The interactive prompt itself
 * belongs to the CLI; the engine only reports that one is required.
 */

use std::path::PathBuf;

use crate::checkpoint::{
    self, compute_config_hash, compute_plan_hash, CheckpointState, ResumeValidation,
};
use crate::config::CopyConfig;
use crate::media::FileRef;
use crate::plan::CopyPlan;

/// How the run should begin
#[derive(Debug)]
pub enum ResumeDecision {
    /// No usable checkpoint; start over
    StartFresh { reason: String },
    /// Valid checkpoint and `--resume` given; continue it
    ResumeFromCheckpoint {
        path: PathBuf,
        checkpoint: CheckpointState,
        validation: ResumeValidation,
    },
    /// Valid checkpoint but no explicit flag; the caller must ask
    PromptUser {
        path: PathBuf,
        checkpoint: CheckpointState,
        validation: ResumeValidation,
    },
}

impl ResumeDecision {
    pub fn is_resume(&self) -> bool {
        matches!(self, ResumeDecision::ResumeFromCheckpoint { .. })
    }
}

/// Decide how to start given the configuration and any stored checkpoint
pub fn decide(config: &CopyConfig) -> ResumeDecision {
    if config.fresh_start {
        return ResumeDecision::StartFresh {
            reason: "--fresh flag".to_string(),
        };
    }

    let Some((path, checkpoint)) = checkpoint::find_latest(config) else {
        return ResumeDecision::StartFresh {
            reason: "No previous checkpoint found".to_string(),
        };
    };

    let validation = checkpoint::validate(&checkpoint, config);
    if !validation.is_valid {
        let reason = validation
            .invalid_reason
            .clone()
            .unwrap_or_else(|| "Checkpoint invalid".to_string());
        tracing::info!(checkpoint = %path.display(), %reason, "not resuming");
        return ResumeDecision::StartFresh { reason };
    }

    if config.resume {
        tracing::info!(
            checkpoint = %path.display(),
            completed = validation.completed_operations,
            pending = validation.pending_operations,
            "resuming from checkpoint"
        );
        ResumeDecision::ResumeFromCheckpoint {
            path,
            checkpoint,
            validation,
        }
    } else {
        ResumeDecision::PromptUser {
            path,
            checkpoint,
            validation,
        }
    }
}

/// Fresh checkpoint state sized to the plan, hashed against the current
/// configuration and file set
pub fn create_checkpoint_state(
    plan: &CopyPlan,
    config: &CopyConfig,
    files: &[FileRef],
) -> CheckpointState {
    CheckpointState::new(
        plan.operations.len() as u64,
        plan.total_bytes,
        config.source.to_string_lossy().to_string(),
        config.destination.clone(),
        compute_config_hash(config),
        compute_plan_hash(files),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CopyMode;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(dir: &TempDir) -> CopyConfig {
        CopyConfig {
            source: PathBuf::from("/src"),
            destination: "/dest/{year}/{name}{ext}".to_string(),
            checkpoint_dir: Some(dir.path().to_path_buf()),
            ..CopyConfig::default()
        }
    }

    fn store_checkpoint(dir: &TempDir, config: &CopyConfig, completed: u64, total: u64) {
        let mut state = CheckpointState::new(
            total,
            total * 100,
            config.source.to_string_lossy().to_string(),
            config.destination.clone(),
            compute_config_hash(config),
            [0u8; 32],
        );
        for i in 0..completed {
            state.set_completed(i);
        }
        fs::write(dir.path().join(state.file_name()), state.encode()).unwrap();
    }

    #[test]
    fn test_fresh_flag_short_circuits() {
        let temp = TempDir::new().unwrap();
        let mut config = config_for(&temp);
        config.fresh_start = true;
        store_checkpoint(&temp, &config, 5, 10);

        match decide(&config) {
            ResumeDecision::StartFresh { reason } => assert_eq!(reason, "--fresh flag"),
            other => panic!("expected StartFresh, got {:?}", other),
        }
    }

    #[test]
    fn test_no_checkpoint_found() {
        let temp = TempDir::new().unwrap();
        let config = config_for(&temp);

        match decide(&config) {
            ResumeDecision::StartFresh { reason } => {
                assert_eq!(reason, "No previous checkpoint found")
            }
            other => panic!("expected StartFresh, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_checkpoint_starts_fresh() {
        let temp = TempDir::new().unwrap();
        let config = config_for(&temp);
        store_checkpoint(&temp, &config, 5, 10);

        let changed = CopyConfig {
            mode: CopyMode::Move,
            ..config
        };
        match decide(&changed) {
            ResumeDecision::StartFresh { reason } => {
                assert_eq!(reason, "Configuration has changed")
            }
            other => panic!("expected StartFresh, got {:?}", other),
        }
    }

    #[test]
    fn test_resume_flag_resumes() {
        let temp = TempDir::new().unwrap();
        let mut config = config_for(&temp);
        config.resume = true;
        store_checkpoint(&temp, &config, 5, 10);

        match decide(&config) {
            ResumeDecision::ResumeFromCheckpoint { validation, .. } => {
                assert_eq!(validation.completed_operations, 5);
                assert_eq!(validation.pending_operations, 5);
            }
            other => panic!("expected ResumeFromCheckpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_prompt_without_flags() {
        let temp = TempDir::new().unwrap();
        let config = config_for(&temp);
        store_checkpoint(&temp, &config, 5, 10);

        assert!(matches!(decide(&config), ResumeDecision::PromptUser { .. }));
    }

    #[test]
    fn test_create_checkpoint_state_dimensions() {
        use crate::media::test_support::file_ref;
        use crate::plan::FileCopyPlan;

        let temp = TempDir::new().unwrap();
        let config = config_for(&temp);
        let files = vec![
            file_ref("/src/a.jpg", 100, None),
            file_ref("/src/b.jpg", 200, None),
        ];
        let plan = CopyPlan {
            operations: vec![
                FileCopyPlan {
                    file_index: 0,
                    source: PathBuf::from("/src/a.jpg"),
                    dest: PathBuf::from("/dest/a.jpg"),
                    size: 100,
                    sidecars: Vec::new(),
                },
                FileCopyPlan {
                    file_index: 1,
                    source: PathBuf::from("/src/b.jpg"),
                    dest: PathBuf::from("/dest/b.jpg"),
                    size: 200,
                    sidecars: Vec::new(),
                },
            ],
            total_bytes: 300,
            ..CopyPlan::default()
        };

        let state = create_checkpoint_state(&plan, &config, &files);
        assert_eq!(state.total_files, 2);
        assert_eq!(state.total_bytes, 300);
        assert_eq!(state.completed_count(), 0);
        assert_eq!(state.config_hash, compute_config_hash(&config));
        assert_eq!(state.plan_hash, compute_plan_hash(&files));
    }
}
