//! Checkpoint persistence.
//!
//! A checkpoint is a directory named by the run's decimal cumulative
//! timestep count, holding both model weight files, both optimizer state
//! files, and a stats JSON. Loading picks the numerically highest
//! directory under the root; retention deletes the lowest once the count
//! exceeds the configured keep limit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;

use crate::core::WelfordRunningStat;
use crate::learner::PPOLearner;

/// Stats JSON filename inside each checkpoint directory.
pub const STATS_FILE_NAME: &str = "RUNNING_STATS.json";

/// Error on the checkpoint save or load path.
#[derive(Debug)]
pub enum CheckpointError {
    /// Filesystem failure.
    Io(io::Error),
    /// Model/optimizer (de)serialization failure.
    Recorder(String),
    /// Stats JSON failure.
    Json(serde_json::Error),
    /// Load path is not a directory.
    NotADirectory(PathBuf),
    /// The policy weight file is absent.
    MissingModelFile(PathBuf),
    /// Loaded parameters disagree with the current architecture.
    ShapeMismatch {
        current: Vec<usize>,
        saved: Vec<usize>,
    },
    /// Saving was requested without a configured save folder.
    NoSaveFolder,
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "Checkpointer: IO error: {}", e),
            CheckpointError::Recorder(e) => write!(f, "Checkpointer: recorder error: {}", e),
            CheckpointError::Json(e) => write!(f, "Checkpointer: stats JSON error: {}", e),
            CheckpointError::NotADirectory(path) => {
                write!(f, "Checkpointer: {} is not a directory", path.display())
            }
            CheckpointError::MissingModelFile(path) => write!(
                f,
                "Checkpointer: model file {} does not exist or can't be accessed",
                path.display()
            ),
            CheckpointError::ShapeMismatch { current, saved } => write!(
                f,
                "Checkpointer: saved model has different parameter sizes than the current \
                 architecture: current {:?}, saved {:?}",
                current, saved
            ),
            CheckpointError::NoSaveFolder => {
                write!(f, "Checkpointer: no checkpoint save folder configured")
            }
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

impl From<serde_json::Error> for CheckpointError {
    fn from(e: serde_json::Error) -> Self {
        CheckpointError::Json(e)
    }
}

/// Run counters and running statistics persisted beside the models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Total environment timesteps consumed.
    pub cumulative_timesteps: u64,
    /// Total optimizer batches applied.
    pub cumulative_model_updates: u64,
    /// Total learn epochs run.
    pub epoch: u64,
    /// Welford statistics over returns.
    pub reward_running_stats: WelfordRunningStat,
    /// Skill rating carried from an external tracker, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_rating: Option<f64>,
    /// Metrics-sink run identifier, if metrics are enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// Writes and restores timestep-named checkpoint directories.
pub struct Checkpointer {
    root: PathBuf,
    /// Checkpoints kept on disk; `None` keeps all.
    keep: Option<usize>,
}

impl Checkpointer {
    /// Create a checkpointer rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, keep: Option<usize>) -> Self {
        Self {
            root: root.into(),
            keep,
        }
    }

    /// Checkpoint root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save models, optimizer state, and stats under
    /// `<root>/<cumulative_timesteps>/`, then apply retention.
    pub fn save<B: AutodiffBackend>(
        &self,
        learner: &PPOLearner<B>,
        stats: &TrainingStats,
    ) -> Result<PathBuf, CheckpointError> {
        let folder = self.root.join(stats.cumulative_timesteps.to_string());
        fs::create_dir_all(&folder)?;

        let json = serde_json::to_string_pretty(stats)?;
        fs::write(folder.join(STATS_FILE_NAME), json)?;

        learner.save_to(&folder)?;

        self.prune()?;
        Ok(folder)
    }

    /// Restore from the numerically highest checkpoint directory.
    ///
    /// Returns `None` when the root holds no checkpoints.
    pub fn load<B: AutodiffBackend>(
        &self,
        learner: &mut PPOLearner<B>,
    ) -> Result<Option<TrainingStats>, CheckpointError> {
        let Some((timesteps, folder)) = self.latest_checkpoint()? else {
            return Ok(None);
        };
        log::info!(
            "Checkpointer: restoring from {} ({} timesteps)",
            folder.display(),
            timesteps
        );

        let stats_text = fs::read_to_string(folder.join(STATS_FILE_NAME))?;
        let stats: TrainingStats = serde_json::from_str(&stats_text)?;

        learner.load_from(&folder)?;
        learner.set_cumulative_model_updates(stats.cumulative_model_updates);

        Ok(Some(stats))
    }

    /// The highest-numbered checkpoint directory, if any.
    pub fn latest_checkpoint(&self) -> Result<Option<(u64, PathBuf)>, CheckpointError> {
        Ok(self
            .numbered_checkpoints()?
            .into_iter()
            .max_by_key(|&(n, _)| n))
    }

    /// Every `<root>/<number>/` directory.
    fn numbered_checkpoints(&self) -> Result<Vec<(u64, PathBuf)>, CheckpointError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(number) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u64>().ok())
            {
                found.push((number, entry.path()));
            }
        }
        Ok(found)
    }

    /// Delete the lowest-numbered checkpoint while over the keep limit.
    fn prune(&self) -> Result<(), CheckpointError> {
        let Some(keep) = self.keep else {
            return Ok(());
        };

        let mut checkpoints = self.numbered_checkpoints()?;
        checkpoints.sort_by_key(|&(n, _)| n);

        while checkpoints.len() > keep {
            let (number, path) = checkpoints.remove(0);
            log::info!(
                "Checkpointer: removing old checkpoint {} ({})",
                number,
                path.display()
            );
            fs::remove_dir_all(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PolicyPublisher;
    use crate::learner::PPOLearnerConfig;
    use burn::backend::{Autodiff, NdArray};
    use std::sync::Arc;

    type B = Autodiff<NdArray<f32>>;

    fn make_learner() -> PPOLearner<B> {
        let config = PPOLearnerConfig::default()
            .with_batch_size(8)
            .with_mini_batch_size(4)
            .with_policy_layer_sizes(vec![8])
            .with_critic_layer_sizes(vec![8]);
        PPOLearner::new(
            3,
            3,
            config,
            Default::default(),
            Arc::new(PolicyPublisher::new()),
        )
        .unwrap()
    }

    fn stats(timesteps: u64) -> TrainingStats {
        let mut rrs = WelfordRunningStat::new(1);
        rrs.increment(&[1.0, 2.0, 3.0], usize::MAX);
        TrainingStats {
            cumulative_timesteps: timesteps,
            cumulative_model_updates: 17,
            epoch: 4,
            reward_running_stats: rrs,
            skill_rating: Some(1032.5),
            run_id: Some("run-a1".to_string()),
        }
    }

    #[test]
    fn test_save_creates_timestep_directory() {
        let dir = tempfile::tempdir().unwrap();
        let learner = make_learner();
        let ckpt = Checkpointer::new(dir.path(), None);

        let folder = ckpt.save(&learner, &stats(12345)).unwrap();
        assert_eq!(folder, dir.path().join("12345"));
        assert!(folder.join(STATS_FILE_NAME).exists());
        assert!(folder.join("PPO_POLICY.bin").exists());
        assert!(folder.join("PPO_CRITIC.bin").exists());
        assert!(folder.join("PPO_POLICY_OPTIM.bin").exists());
        assert!(folder.join("PPO_CRITIC_OPTIM.bin").exists());
    }

    #[test]
    fn test_round_trip_restores_stats_and_params() {
        let dir = tempfile::tempdir().unwrap();
        let learner = make_learner();
        let ckpt = Checkpointer::new(dir.path(), None);
        ckpt.save(&learner, &stats(500)).unwrap();

        let mut restored_learner = make_learner();
        let restored = ckpt.load(&mut restored_learner).unwrap().unwrap();

        assert_eq!(restored.cumulative_timesteps, 500);
        assert_eq!(restored.cumulative_model_updates, 17);
        assert_eq!(restored.epoch, 4);
        assert_eq!(restored.skill_rating, Some(1032.5));
        assert_eq!(restored.run_id.as_deref(), Some("run-a1"));
        assert_eq!(restored.reward_running_stats.count(), 3);
        assert_eq!(
            restored_learner.policy().flat_params(),
            learner.policy().flat_params()
        );
        assert_eq!(restored_learner.cumulative_model_updates(), 17);
    }

    #[test]
    fn test_load_picks_highest_timestep() {
        let dir = tempfile::tempdir().unwrap();
        let learner = make_learner();
        let ckpt = Checkpointer::new(dir.path(), None);

        ckpt.save(&learner, &stats(100)).unwrap();
        ckpt.save(&learner, &stats(900)).unwrap();
        ckpt.save(&learner, &stats(250)).unwrap();

        let mut target = make_learner();
        let restored = ckpt.load(&mut target).unwrap().unwrap();
        assert_eq!(restored.cumulative_timesteps, 900);
    }

    #[test]
    fn test_retention_removes_lowest() {
        let dir = tempfile::tempdir().unwrap();
        let learner = make_learner();
        let ckpt = Checkpointer::new(dir.path(), Some(2));

        ckpt.save(&learner, &stats(100)).unwrap();
        ckpt.save(&learner, &stats(200)).unwrap();
        ckpt.save(&learner, &stats(300)).unwrap();

        assert!(!dir.path().join("100").exists());
        assert!(dir.path().join("200").exists());
        assert!(dir.path().join("300").exists());
    }

    #[test]
    fn test_load_empty_root_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path().join("missing"), None);
        let mut learner = make_learner();
        assert!(ckpt.load(&mut learner).unwrap().is_none());
    }

    #[test]
    fn test_non_numeric_directories_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("notanumber")).unwrap();

        let ckpt = Checkpointer::new(dir.path(), None);
        assert!(ckpt.latest_checkpoint().unwrap().is_none());
    }
}
