//! Collector pool: spawns workers, gathers their trajectories, and
//! aggregates their metrics.
//!
//! [`CollectorPool::collect`] spin-waits until the workers' combined step
//! counters reach the iteration target, then harvests every non-empty
//! trajectory segment under each worker's trajectory lock. Harvesting
//! closes each segment's final boundary (`truncated = !done`), so the
//! concatenated batch is safe for per-segment advantage computation.

use burn::tensor::backend::Backend;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::core::{GameTrajectory, PolicyPublisher, TrajectoryError};
use crate::environment::{EnvCreateFn, RenderPacer, RenderSink};
use crate::metrics::Report;
use crate::nn::DiscretePolicy;

use super::worker::{
    AvgTracker, CollectorWorker, RenderHandle, WorkerContext, WorkerTimes,
};

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct CollectorPoolConfig {
    /// Number of collector threads.
    pub worker_count: usize,
    /// Game instances per worker.
    pub games_per_worker: usize,
    /// Combined step budget; each worker pauses at its share.
    pub max_collect: u64,
    /// Argmax actions instead of sampling.
    pub deterministic: bool,
    /// Serialize inference through one pool-wide mutex.
    pub block_concurrent_infer: bool,
    /// Keep non-rendering workers collecting while worker 0 renders.
    pub render_during_training: bool,
    /// Render playback speed multiplier.
    pub render_time_scale: f64,
    /// Base seed for per-worker action sampling.
    pub rng_seed: u64,
}

impl Default for CollectorPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            games_per_worker: 16,
            max_collect: 150_000,
            deterministic: false,
            block_concurrent_infer: false,
            render_during_training: false,
            render_time_scale: 1.0,
            rng_seed: 0,
        }
    }
}

/// Worker pool over the inference backend.
pub struct CollectorPool<B: Backend> {
    config: CollectorPoolConfig,
    workers: Vec<CollectorWorker<B>>,
    publisher: Arc<PolicyPublisher<DiscretePolicy<B>>>,
    disable_collection: Arc<AtomicBool>,
    infer_mutex: Option<Arc<Mutex<()>>>,
    iteration_timer: Instant,
    last_iteration_time: f64,
}

impl<B: Backend> CollectorPool<B> {
    /// Create an empty pool sharing `publisher` with the learner.
    pub fn new(
        config: CollectorPoolConfig,
        publisher: Arc<PolicyPublisher<DiscretePolicy<B>>>,
    ) -> Self {
        let infer_mutex = config
            .block_concurrent_infer
            .then(|| Arc::new(Mutex::new(())));

        Self {
            config,
            workers: Vec::new(),
            publisher,
            disable_collection: Arc::new(AtomicBool::new(false)),
            infer_mutex,
            iteration_timer: Instant::now(),
            last_iteration_time: 0.0,
        }
    }

    /// Pool configuration.
    pub fn config(&self) -> &CollectorPoolConfig {
        &self.config
    }

    /// Instantiate every worker's games and register their policy slots.
    ///
    /// When a render sink is supplied together with
    /// `render_during_training`, worker 0 renders with a single game while
    /// the rest keep collecting.
    pub fn create_workers(
        &mut self,
        create_fn: &EnvCreateFn,
        device: B::Device,
        mut render_sink: Option<Box<dyn RenderSink>>,
    ) {
        let per_worker_budget = self.config.max_collect / self.config.worker_count.max(1) as u64;

        for index in 0..self.config.worker_count {
            let render = if index == 0 {
                render_sink.take().map(|sink| RenderHandle {
                    sink,
                    pacer: RenderPacer::new(self.config.render_time_scale),
                })
            } else {
                None
            };

            let game_count = if render.is_some() && self.config.render_during_training {
                1
            } else {
                self.config.games_per_worker
            };
            let games = (0..game_count).map(|_| create_fn()).collect();

            let ctx = WorkerContext {
                policy_slot: self.publisher.register(),
                disable_collection: Arc::clone(&self.disable_collection),
                infer_mutex: self.infer_mutex.clone(),
                deterministic: self.config.deterministic,
                device: device.clone(),
                rng_seed: self.config.rng_seed.wrapping_add(index as u64),
            };

            self.workers
                .push(CollectorWorker::new(index, games, ctx, per_worker_budget, render));
        }
    }

    /// Start every worker thread.
    pub fn start(&mut self) {
        for worker in &mut self.workers {
            worker.start();
        }
        self.iteration_timer = Instant::now();
    }

    /// Cooperatively stop every worker thread.
    pub fn stop(&mut self) {
        for worker in &mut self.workers {
            worker.stop();
        }
    }

    /// Freeze or unfreeze collection across all workers.
    pub fn set_collection_disabled(&self, disabled: bool) {
        self.disable_collection.store(disabled, Ordering::Release);
    }

    /// Combined step counters across workers.
    pub fn total_steps_collected(&self) -> u64 {
        self.workers.iter().map(|w| w.steps_collected()).sum()
    }

    /// Wall-clock duration of the previous collect-to-collect interval.
    pub fn last_iteration_time(&self) -> f64 {
        self.last_iteration_time
    }

    /// Block until at least `target_steps` are collected, then harvest
    /// every non-empty segment into one batch and reset the counters.
    pub fn collect(&mut self, target_steps: u64) -> Result<GameTrajectory, TrajectoryError> {
        while self.total_steps_collected() < target_steps {
            std::thread::yield_now();
        }

        let mut segments = Vec::new();
        for worker in &self.workers {
            let shared = worker.shared();
            let mut trajectories = shared.trajectories.lock();
            for game_segments in trajectories.iter_mut() {
                for segment in game_segments.iter_mut() {
                    if !segment.is_empty() {
                        segments.push(segment.harvest());
                    }
                }
            }
            shared.steps_collected.store(0, Ordering::Relaxed);
        }

        let trajectory = GameTrajectory::from_segments(segments)?;

        self.last_iteration_time = self.iteration_timer.elapsed().as_secs_f64();
        self.iteration_timer = Instant::now();

        Ok(trajectory)
    }

    /// Aggregate per-game reward averages and per-worker timing averages.
    pub fn get_metrics(&self, report: &mut Report) {
        let mut avg_step = AvgTracker::default();
        let mut avg_episode = AvgTracker::default();
        let mut times = WorkerTimes::default();

        for worker in &self.workers {
            let shared = worker.shared();
            for metrics in shared.game_metrics.lock().iter() {
                avg_step.merge(&metrics.avg_step_reward);
                avg_episode.merge(&metrics.avg_episode_reward);
            }
            let worker_times = *shared.times.lock();
            times.env_step_time += worker_times.env_step_time;
            times.policy_infer_time += worker_times.policy_infer_time;
            times.traj_append_time += worker_times.traj_append_time;
        }

        let n = self.workers.len().max(1) as f64;
        report.set("Average Step Reward", avg_step.get());
        report.set("Average Episode Reward", avg_episode.get());
        report.set("Env Step Time", times.env_step_time / n);
        report.set(
            "Policy Infer Time",
            (times.policy_infer_time + times.traj_append_time) / n,
        );
    }

    /// Zero every worker's timing and reward metrics.
    pub fn reset_metrics(&self) {
        for worker in &self.workers {
            let shared = worker.shared();
            *shared.times.lock() = WorkerTimes::default();
            for metrics in shared.game_metrics.lock().iter_mut() {
                metrics.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Gym, StepResult};
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    struct ToyGym {
        step: u32,
    }

    impl Gym for ToyGym {
        fn reset(&mut self) -> Vec<Vec<f32>> {
            self.step = 0;
            vec![vec![0.0, 0.0], vec![0.0, 1.0]]
        }

        fn step(&mut self, _actions: &[u32]) -> StepResult {
            self.step += 1;
            StepResult {
                next_obs: vec![
                    vec![self.step as f32, 0.0],
                    vec![self.step as f32, 1.0],
                ],
                rewards: vec![1.0, 1.0],
                done: self.step % 5 == 0,
            }
        }

        fn player_count(&self) -> usize {
            2
        }

        fn action_count(&self) -> usize {
            3
        }
    }

    fn make_pool(worker_count: usize) -> CollectorPool<B> {
        let publisher = Arc::new(PolicyPublisher::new());
        let policy = DiscretePolicy::<B>::new(2, 3, &[4], 1.0, &Default::default());
        publisher.publish(&policy);

        let config = CollectorPoolConfig {
            worker_count,
            games_per_worker: 2,
            max_collect: 10_000,
            ..Default::default()
        };
        let mut pool = CollectorPool::new(config, publisher);

        let create: EnvCreateFn = Arc::new(|| Box::new(ToyGym { step: 0 }));
        pool.create_workers(&create, Default::default(), None);
        pool
    }

    #[test]
    fn test_collect_returns_target_and_resets_counters() {
        let mut pool = make_pool(2);
        pool.start();

        let traj = pool.collect(40).unwrap();
        pool.set_collection_disabled(true);
        std::thread::sleep(std::time::Duration::from_millis(10));

        assert!(traj.len >= 40);
        assert_eq!(traj.obs_size, 2);
        // Counters were reset at harvest; only an in-flight tick may have
        // landed since.
        assert!(pool.total_steps_collected() < 40);

        pool.stop();
    }

    #[test]
    fn test_harvest_closes_segment_boundaries() {
        let mut pool = make_pool(1);
        pool.start();
        let traj = pool.collect(24).unwrap();
        pool.stop();

        // done and truncated never overlap, and the batch contains one
        // closed boundary per harvested segment (2 games x 2 players).
        let mut boundaries = 0;
        for i in 0..traj.len {
            assert!(!(traj.dones[i] && traj.truncateds[i]));
            if traj.dones[i] || traj.truncateds[i] {
                boundaries += 1;
            }
        }
        assert!(boundaries >= 4);
    }

    #[test]
    fn test_metrics_aggregation() {
        let mut pool = make_pool(1);
        pool.start();
        let _ = pool.collect(16).unwrap();
        pool.stop();

        let mut report = Report::new();
        pool.get_metrics(&mut report);

        // Toy rewards are all 1, so the per-step average must be exactly 1.
        assert_eq!(report.get("Average Step Reward"), Some(1.0));
        assert!(report.contains("Env Step Time"));
        assert!(report.contains("Policy Infer Time"));

        pool.reset_metrics();
        let mut fresh = Report::new();
        pool.get_metrics(&mut fresh);
        assert_eq!(fresh.get("Average Step Reward"), Some(0.0));
    }

    #[test]
    fn test_consecutive_collects() {
        let mut pool = make_pool(2);
        pool.start();

        let first = pool.collect(20).unwrap();
        let second = pool.collect(20).unwrap();
        pool.stop();

        assert!(first.len >= 20);
        assert!(second.len >= 20);
        assert!(pool.last_iteration_time() >= 0.0);
    }
}
