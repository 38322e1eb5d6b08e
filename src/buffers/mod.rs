//! Experience storage for the PPO learner.

pub mod experience_buffer;

pub use experience_buffer::{BufferError, ExperienceBuffer, ExperienceTensors, SampleSet};
