//! Simulator boundary.
//!
//! The training engine drives game instances through the [`Gym`] trait and
//! never sees simulator internals: observations are fixed-length float
//! vectors, actions are discrete indices. A factory closure produces fresh
//! instances for each collector worker.
//!
//! Rendering and metrics are optional outward interfaces: a [`RenderSink`]
//! receives the previous simulator state at a capped wall-clock rate, and
//! the trainer probes observation/action sizes once at construction.

use std::sync::Arc;
use std::time::Duration;

/// Result of stepping one game instance.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next observation per player.
    pub next_obs: Vec<Vec<f32>>,
    /// Reward per player.
    pub rewards: Vec<f32>,
    /// Whether the episode reached a terminal state.
    pub done: bool,
}

/// One simulated game with a fixed set of players.
///
/// `reset` returns one observation vector per player; `step` consumes one
/// action per player in the same order. Observation vectors keep a single
/// length for the lifetime of the instance.
pub trait Gym: Send {
    /// Reset the game, returning initial per-player observations.
    fn reset(&mut self) -> Vec<Vec<f32>>;

    /// Advance the game by one tick with one action per player.
    fn step(&mut self, actions: &[u32]) -> StepResult;

    /// Number of players in this game.
    fn player_count(&self) -> usize;

    /// Size of the discrete action space.
    fn action_count(&self) -> usize;

    /// Simulator ticks consumed per step, for render pacing.
    fn tick_skip(&self) -> u32 {
        1
    }

    /// Previous state and actions for the render sink.
    fn render_frame(&self) -> RenderFrame {
        RenderFrame::default()
    }
}

/// Factory producing game instances.
pub type EnvCreateFn = Arc<dyn Fn() -> Box<dyn Gym> + Send + Sync>;

/// Snapshot handed to the render sink: the simulator's previous state in
/// its flattened encoding, plus the previous per-player actions.
#[derive(Debug, Clone, Default)]
pub struct RenderFrame {
    /// Flattened previous simulator state.
    pub state: Vec<f32>,
    /// Previous action per player.
    pub actions: Vec<u32>,
}

/// Receives render frames from the rendering worker.
pub trait RenderSink: Send {
    /// Deliver one frame.
    fn send(&mut self, frame: RenderFrame);
}

/// Wall-clock pacing for render mode.
///
/// The pacing state travels with the rendering worker rather than living
/// in hidden global state, so two render sessions never share timing.
pub struct RenderPacer {
    time_scale: f64,
}

/// Base simulator rate before `tick_skip`, in ticks per second.
const SIM_TICK_RATE: f64 = 120.0;

impl RenderPacer {
    /// Create a pacer with the given playback speed multiplier.
    pub fn new(time_scale: f64) -> Self {
        Self {
            time_scale: time_scale.max(f64::MIN_POSITIVE),
        }
    }

    /// Sleep off whatever remains of the current tick period.
    ///
    /// `elapsed` is the time the step itself took; the target period is
    /// `tick_skip / 120 / time_scale` seconds.
    pub fn pace(&mut self, tick_skip: u32, elapsed: Duration) {
        let target = (1.0 / SIM_TICK_RATE) * tick_skip as f64 / self.time_scale;
        let remaining = target - elapsed.as_secs_f64();
        if remaining > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(remaining));
        }
    }
}

/// Probe result from constructing one throwaway game instance.
#[derive(Debug, Clone, Copy)]
pub struct EnvProbe {
    /// Observation vector length.
    pub obs_size: usize,
    /// Discrete action space size.
    pub action_count: usize,
}

/// Create one game instance and read its observation/action sizes.
pub fn probe_env(create_fn: &EnvCreateFn) -> EnvProbe {
    let mut gym = create_fn();
    let obs = gym.reset();
    EnvProbe {
        obs_size: obs.first().map(|o| o.len()).unwrap_or(0),
        action_count: gym.action_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct StubGym {
        players: usize,
    }

    impl Gym for StubGym {
        fn reset(&mut self) -> Vec<Vec<f32>> {
            vec![vec![0.0; 5]; self.players]
        }

        fn step(&mut self, actions: &[u32]) -> StepResult {
            StepResult {
                next_obs: vec![vec![0.0; 5]; self.players],
                rewards: vec![actions[0] as f32; self.players],
                done: false,
            }
        }

        fn player_count(&self) -> usize {
            self.players
        }

        fn action_count(&self) -> usize {
            8
        }
    }

    #[test]
    fn test_probe_env() {
        let create: EnvCreateFn = Arc::new(|| Box::new(StubGym { players: 2 }));
        let probe = probe_env(&create);
        assert_eq!(probe.obs_size, 5);
        assert_eq!(probe.action_count, 8);
    }

    #[test]
    fn test_pacer_sleeps_to_target() {
        let mut pacer = RenderPacer::new(4.0);
        let start = Instant::now();
        // Target period: 8 ticks / 120 / 4x = ~16.7ms.
        pacer.pace(8, Duration::ZERO);
        assert!(start.elapsed() >= Duration::from_millis(14));
    }
}
