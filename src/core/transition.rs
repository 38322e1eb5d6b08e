//! Transition and trajectory types for experience collection.
//!
//! Collector workers append one [`Transition`] per player per simulator
//! step into per-player [`TrajectorySegment`]s. At harvest time the pool
//! fixes each segment's final boundary flag and concatenates every
//! non-empty segment into one flat [`GameTrajectory`], which the trainer
//! turns into tensors.
//!
//! `done` and `truncated` are distinct on purpose: `done` marks a real
//! terminal (no bootstrap), `truncated` marks a time-limit cutoff of a
//! still-running episode (bootstrap through the boundary).

use std::fmt;

/// One step of experience for one player.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Observation the action was chosen from.
    pub obs: Vec<f32>,
    /// Discrete action index.
    pub action: u32,
    /// Log probability of the action under the behavior policy.
    pub log_prob: f32,
    /// Reward received for the step.
    pub reward: f32,
    /// Observation after the step.
    pub next_obs: Vec<f32>,
    /// Episode reached a terminal state.
    pub done: bool,
    /// Episode was cut off by a time limit.
    pub truncated: bool,
}

/// Ordered transitions for one player within one game instance.
///
/// Grows monotonically until harvested. At harvest the final transition's
/// `truncated` flag is forced to `!done` so the advantage computation sees
/// a closed boundary at the end of every segment.
#[derive(Debug, Clone, Default)]
pub struct TrajectorySegment {
    transitions: Vec<Transition>,
}

impl TrajectorySegment {
    /// Create an empty segment.
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
        }
    }

    /// Append one step.
    pub fn push(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    /// Number of steps collected.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Whether the segment holds no steps.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Iterate over the collected steps.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    /// Close the segment boundary and take its contents, leaving the
    /// segment empty for further collection.
    ///
    /// The last transition's `truncated` flag is set exactly when its
    /// `done` flag is unset.
    pub fn harvest(&mut self) -> Vec<Transition> {
        if let Some(last) = self.transitions.last_mut() {
            last.truncated = !last.done;
        }
        std::mem::take(&mut self.transitions)
    }
}

/// Error concatenating harvested segments.
#[derive(Debug)]
pub enum TrajectoryError {
    /// A transition's observation length disagrees with the batch.
    ObsSizeMismatch { expected: usize, found: usize },
    /// Concatenated length disagrees with the sum of segment lengths.
    LengthMismatch { expected: usize, found: usize },
}

impl fmt::Display for TrajectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrajectoryError::ObsSizeMismatch { expected, found } => write!(
                f,
                "GameTrajectory: observation size mismatch (expected {}, found {})",
                expected, found
            ),
            TrajectoryError::LengthMismatch { expected, found } => write!(
                f,
                "GameTrajectory: timestep concatenation failed ({} != {})",
                found, expected
            ),
        }
    }
}

impl std::error::Error for TrajectoryError {}

/// Flat batch of transitions harvested from every worker.
///
/// Row order across segments is unspecified; every segment ends in a
/// closed boundary, so the advantage computation never mixes segments.
#[derive(Debug, Clone, Default)]
pub struct GameTrajectory {
    /// Observations, row-major `[len * obs_size]`.
    pub states: Vec<f32>,
    /// Discrete action indices `[len]`.
    pub actions: Vec<u32>,
    /// Behavior-policy log probabilities `[len]`.
    pub log_probs: Vec<f32>,
    /// Step rewards `[len]`.
    pub rewards: Vec<f32>,
    /// Next observations, row-major `[len * obs_size]`.
    pub next_states: Vec<f32>,
    /// Terminal flags `[len]`.
    pub dones: Vec<bool>,
    /// Truncation flags `[len]`.
    pub truncateds: Vec<bool>,
    /// Observation vector length.
    pub obs_size: usize,
    /// Number of rows.
    pub len: usize,
}

impl GameTrajectory {
    /// Concatenate harvested segments into one batch.
    ///
    /// The batch length must equal the sum of segment lengths and every
    /// observation must share one size; either failure is fatal upstream.
    pub fn from_segments(
        segments: Vec<Vec<Transition>>,
    ) -> Result<GameTrajectory, TrajectoryError> {
        let expected: usize = segments.iter().map(|s| s.len()).sum();

        let mut traj = GameTrajectory::default();
        traj.states.reserve(expected);
        traj.actions.reserve(expected);

        for segment in &segments {
            for t in segment {
                if traj.len == 0 {
                    traj.obs_size = t.obs.len();
                }
                if t.obs.len() != traj.obs_size || t.next_obs.len() != traj.obs_size {
                    return Err(TrajectoryError::ObsSizeMismatch {
                        expected: traj.obs_size,
                        found: t.obs.len().max(t.next_obs.len()),
                    });
                }

                traj.states.extend_from_slice(&t.obs);
                traj.actions.push(t.action);
                traj.log_probs.push(t.log_prob);
                traj.rewards.push(t.reward);
                traj.next_states.extend_from_slice(&t.next_obs);
                traj.dones.push(t.done);
                traj.truncateds.push(t.truncated);
                traj.len += 1;
            }
        }

        if traj.len != expected {
            return Err(TrajectoryError::LengthMismatch {
                expected,
                found: traj.len,
            });
        }

        Ok(traj)
    }

    /// Whether the batch holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(obs: Vec<f32>, reward: f32, done: bool) -> Transition {
        Transition {
            next_obs: obs.iter().map(|x| x + 1.0).collect(),
            obs,
            action: 2,
            log_prob: -0.5,
            reward,
            done,
            truncated: false,
        }
    }

    #[test]
    fn test_harvest_truncates_open_segment() {
        let mut segment = TrajectorySegment::new();
        segment.push(transition(vec![0.0, 0.0], 1.0, false));
        segment.push(transition(vec![1.0, 1.0], 1.0, false));

        let steps = segment.harvest();
        assert!(segment.is_empty());
        assert!(!steps[0].truncated);
        assert!(steps[1].truncated);
        assert!(!steps[1].done);
    }

    #[test]
    fn test_harvest_keeps_terminal_boundary() {
        let mut segment = TrajectorySegment::new();
        segment.push(transition(vec![0.0], 1.0, true));

        let steps = segment.harvest();
        assert!(steps[0].done);
        assert!(!steps[0].truncated);
    }

    #[test]
    fn test_from_segments_concatenates() {
        let a = vec![
            transition(vec![0.0, 1.0], 1.0, false),
            transition(vec![2.0, 3.0], 2.0, true),
        ];
        let b = vec![transition(vec![4.0, 5.0], 3.0, false)];

        let traj = GameTrajectory::from_segments(vec![a, b]).unwrap();
        assert_eq!(traj.len, 3);
        assert_eq!(traj.obs_size, 2);
        assert_eq!(traj.states, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(traj.rewards, vec![1.0, 2.0, 3.0]);
        assert_eq!(traj.dones, vec![false, true, false]);
    }

    #[test]
    fn test_from_segments_rejects_mixed_obs_sizes() {
        let a = vec![transition(vec![0.0, 1.0], 1.0, false)];
        let b = vec![transition(vec![4.0], 3.0, false)];

        let err = GameTrajectory::from_segments(vec![a, b]).unwrap_err();
        assert!(matches!(err, TrajectoryError::ObsSizeMismatch { .. }));
    }

    #[test]
    fn test_empty_segments() {
        let traj = GameTrajectory::from_segments(vec![]).unwrap();
        assert!(traj.is_empty());
    }
}
