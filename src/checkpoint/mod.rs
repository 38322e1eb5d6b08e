//! Checkpoint persistence: timestep-named directories of model weights,
//! optimizer state, and run statistics.

pub mod checkpointer;

pub use checkpointer::{CheckpointError, Checkpointer, TrainingStats, STATS_FILE_NAME};
