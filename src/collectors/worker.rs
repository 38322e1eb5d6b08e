//! Collector worker: one thread driving a set of game instances.
//!
//! Per tick the worker batches every player's observation into one tensor,
//! infers actions with its local policy copy, steps each game, and appends
//! one transition per player into that player's trajectory segment. The
//! pool harvests segments under the worker's trajectory lock.
//!
//! The worker receives everything it needs through [`WorkerContext`] — a
//! policy slot, shared flags, an optional inference mutex — rather than a
//! reference back to the pool. Cancellation is cooperative: `stop()` clears
//! the run flag and spins until the thread observes it.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::core::{SharedPolicySlot, TrajectorySegment, Transition};
use crate::environment::{Gym, RenderPacer, RenderSink};
use crate::nn::DiscretePolicy;

/// Running mean over an observed stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvgTracker {
    sum: f64,
    count: u64,
}

impl AvgTracker {
    /// Fold in one sample.
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Merge another tracker's samples.
    pub fn merge(&mut self, other: &AvgTracker) {
        self.sum += other.sum;
        self.count += other.count;
    }

    /// Current mean, or 0 with no samples.
    pub fn get(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Drop all samples.
    pub fn reset(&mut self) {
        *self = AvgTracker::default();
    }
}

/// Per-game reward metrics.
#[derive(Debug, Clone, Default)]
pub struct GameMetrics {
    /// Mean per-step reward (averaged over players).
    pub avg_step_reward: AvgTracker,
    /// Mean total episode reward.
    pub avg_episode_reward: AvgTracker,
    cur_episode_reward: f64,
}

impl GameMetrics {
    fn record_step(&mut self, rewards: &[f32], done: bool) {
        let mean = if rewards.is_empty() {
            0.0
        } else {
            rewards.iter().map(|&r| r as f64).sum::<f64>() / rewards.len() as f64
        };
        self.avg_step_reward.add(mean);
        self.cur_episode_reward += mean;

        if done {
            self.avg_episode_reward.add(self.cur_episode_reward);
            self.cur_episode_reward = 0.0;
        }
    }

    pub(crate) fn reset(&mut self) {
        self.avg_step_reward.reset();
        self.avg_episode_reward.reset();
        // The in-flight episode accumulator survives metric resets.
    }
}

/// Per-worker timing accumulators, in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerTimes {
    /// Time spent stepping game instances.
    pub env_step_time: f64,
    /// Time spent in policy inference.
    pub policy_infer_time: f64,
    /// Time spent appending transitions under the trajectory lock.
    pub traj_append_time: f64,
}

/// Capabilities a worker needs from the rest of the system.
pub struct WorkerContext<B: Backend> {
    /// Slot delivering fresh policy snapshots.
    pub policy_slot: SharedPolicySlot<DiscretePolicy<B>>,
    /// Pool-wide collection freeze flag.
    pub disable_collection: Arc<AtomicBool>,
    /// Serializes inference across workers when set.
    pub infer_mutex: Option<Arc<Mutex<()>>>,
    /// Argmax actions instead of sampling.
    pub deterministic: bool,
    /// Device observations are batched onto for inference.
    pub device: B::Device,
    /// RNG seed for this worker's action sampling.
    pub rng_seed: u64,
}

/// Render-mode equipment for the rendering worker.
pub struct RenderHandle {
    /// Frame consumer.
    pub sink: Box<dyn RenderSink>,
    /// Wall-clock pacing state.
    pub pacer: RenderPacer,
}

/// State shared between the worker thread and the pool.
pub(crate) struct WorkerShared {
    pub(crate) should_run: AtomicBool,
    pub(crate) is_running: AtomicBool,
    pub(crate) steps_collected: AtomicU64,
    /// Trajectory segments indexed `[game][player]`.
    pub(crate) trajectories: Mutex<Vec<Vec<TrajectorySegment>>>,
    pub(crate) times: Mutex<WorkerTimes>,
    pub(crate) game_metrics: Mutex<Vec<GameMetrics>>,
}

struct WorkerLaunch<B: Backend> {
    games: Vec<Box<dyn Gym>>,
    ctx: WorkerContext<B>,
    max_collect: u64,
    render: Option<RenderHandle>,
}

/// One collector thread plus its shared state.
pub struct CollectorWorker<B: Backend> {
    index: usize,
    shared: Arc<WorkerShared>,
    launch: Option<WorkerLaunch<B>>,
    handle: Option<JoinHandle<()>>,
}

impl<B: Backend> CollectorWorker<B> {
    /// Create a worker owning `games`; the thread starts on
    /// [`CollectorWorker::start`].
    pub fn new(
        index: usize,
        games: Vec<Box<dyn Gym>>,
        ctx: WorkerContext<B>,
        max_collect: u64,
        render: Option<RenderHandle>,
    ) -> Self {
        let trajectories = games
            .iter()
            .map(|g| vec![TrajectorySegment::new(); g.player_count()])
            .collect();
        let game_metrics = games.iter().map(|_| GameMetrics::default()).collect();

        Self {
            index,
            shared: Arc::new(WorkerShared {
                should_run: AtomicBool::new(false),
                is_running: AtomicBool::new(false),
                steps_collected: AtomicU64::new(0),
                trajectories: Mutex::new(trajectories),
                times: Mutex::new(WorkerTimes::default()),
                game_metrics: Mutex::new(game_metrics),
            }),
            launch: Some(WorkerLaunch {
                games,
                ctx,
                max_collect,
                render,
            }),
            handle: None,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<WorkerShared> {
        &self.shared
    }

    /// Timesteps appended since the last harvest.
    pub fn steps_collected(&self) -> u64 {
        self.shared.steps_collected.load(Ordering::Relaxed)
    }

    /// Spawn the collection thread.
    pub fn start(&mut self) {
        let Some(launch) = self.launch.take() else {
            return;
        };
        self.shared.should_run.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(format!("collector-{}", self.index))
            .spawn(move || run_worker(launch, shared))
            .expect("spawn collector thread");
        self.handle = Some(handle);
    }

    /// Request cooperative shutdown and wait for the thread to observe it.
    pub fn stop(&mut self) {
        self.shared.should_run.store(false, Ordering::Release);
        while self.shared.is_running.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Thread body: tick loop per the collection protocol.
fn run_worker<B: Backend>(launch: WorkerLaunch<B>, shared: Arc<WorkerShared>) {
    let WorkerLaunch {
        mut games,
        ctx,
        max_collect,
        mut render,
    } = launch;

    shared.is_running.store(true, Ordering::Release);

    if games.is_empty() {
        shared.is_running.store(false, Ordering::Release);
        return;
    }

    let mut rng = StdRng::seed_from_u64(ctx.rng_seed);
    let device = ctx.device.clone();

    // Per game, per player current observations.
    let mut cur_obs: Vec<Vec<Vec<f32>>> = games.iter_mut().map(|g| g.reset()).collect();
    let obs_size = cur_obs[0][0].len();

    // Wait for the first published snapshot.
    let mut policy = loop {
        if let Some(p) = ctx.policy_slot.take() {
            break p;
        }
        if !shared.should_run.load(Ordering::Acquire) {
            shared.is_running.store(false, Ordering::Release);
            return;
        }
        std::thread::yield_now();
    };

    while shared.should_run.load(Ordering::Acquire) {
        let tick_start = Instant::now();

        while shared.steps_collected.load(Ordering::Relaxed) > max_collect
            && shared.should_run.load(Ordering::Acquire)
        {
            std::thread::yield_now();
        }
        while ctx.disable_collection.load(Ordering::Acquire)
            && shared.should_run.load(Ordering::Acquire)
        {
            std::thread::yield_now();
        }
        if !shared.should_run.load(Ordering::Acquire) {
            break;
        }

        if let Some(fresh) = ctx.policy_slot.take() {
            policy = fresh;
        }

        // Batched observation tensor over every game's players.
        let total_players: usize = cur_obs.iter().map(|g| g.len()).sum();
        let mut obs_flat = Vec::with_capacity(total_players * obs_size);
        for game_obs in &cur_obs {
            for player_obs in game_obs {
                obs_flat.extend_from_slice(player_obs);
            }
        }
        let obs_tensor = Tensor::<B, 1>::from_floats(obs_flat.as_slice(), &device)
            .reshape([total_players, obs_size]);

        let infer_timer = Instant::now();
        let action_result = {
            let _guard = ctx.infer_mutex.as_ref().map(|m| m.lock());
            policy.get_action(obs_tensor, ctx.deterministic, &mut rng)
        };
        let infer_time = infer_timer.elapsed().as_secs_f64();

        // Step every game with its slice of the action batch.
        let step_timer = Instant::now();
        let mut step_results = Vec::with_capacity(games.len());
        let mut offset = 0;
        for game in &mut games {
            let players = game.player_count();
            let actions = &action_result.actions[offset..offset + players];
            step_results.push(game.step(actions));
            offset += players;
        }
        let env_time = step_timer.elapsed().as_secs_f64();

        {
            let mut times = shared.times.lock();
            times.policy_infer_time += infer_time;
            times.env_step_time += env_time;
        }

        match &mut render {
            None => {
                let append_timer = Instant::now();
                {
                    let mut trajectories = shared.trajectories.lock();
                    let mut metrics = shared.game_metrics.lock();
                    let mut added = 0u64;
                    let mut offset = 0;

                    for (gi, result) in step_results.iter().enumerate() {
                        let players = games[gi].player_count();
                        for p in 0..players {
                            trajectories[gi][p].push(Transition {
                                obs: cur_obs[gi][p].clone(),
                                action: action_result.actions[offset + p],
                                log_prob: action_result.log_probs[offset + p],
                                reward: result.rewards[p],
                                next_obs: result.next_obs[p].clone(),
                                done: result.done,
                                truncated: false,
                            });
                        }
                        metrics[gi].record_step(&result.rewards, result.done);
                        added += players as u64;
                        offset += players;
                    }
                    shared.steps_collected.fetch_add(added, Ordering::Relaxed);
                }
                shared.times.lock().traj_append_time += append_timer.elapsed().as_secs_f64();
            }
            Some(render) => {
                render.sink.send(games[0].render_frame());
                render.pacer.pace(games[0].tick_skip(), tick_start.elapsed());
            }
        }

        // Advance observations; a finished episode restarts its game.
        for (gi, result) in step_results.into_iter().enumerate() {
            cur_obs[gi] = if result.done {
                games[gi].reset()
            } else {
                result.next_obs
            };
        }
    }

    shared.is_running.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PolicyPublisher, PolicySlot};
    use crate::environment::StepResult;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    /// Two-player game with a fixed episode length.
    struct ToyGym {
        step: u32,
        episode_len: u32,
    }

    impl Gym for ToyGym {
        fn reset(&mut self) -> Vec<Vec<f32>> {
            self.step = 0;
            vec![vec![0.0, 0.0], vec![0.0, 1.0]]
        }

        fn step(&mut self, actions: &[u32]) -> StepResult {
            self.step += 1;
            StepResult {
                next_obs: vec![
                    vec![self.step as f32, 0.0],
                    vec![self.step as f32, 1.0],
                ],
                rewards: actions.iter().map(|&a| a as f32).collect(),
                done: self.step >= self.episode_len,
            }
        }

        fn player_count(&self) -> usize {
            2
        }

        fn action_count(&self) -> usize {
            3
        }
    }

    fn context(publisher: &PolicyPublisher<DiscretePolicy<B>>) -> WorkerContext<B> {
        WorkerContext {
            policy_slot: publisher.register(),
            disable_collection: Arc::new(AtomicBool::new(false)),
            infer_mutex: None,
            deterministic: false,
            device: Default::default(),
            rng_seed: 5,
        }
    }

    fn publish_policy(publisher: &PolicyPublisher<DiscretePolicy<B>>) {
        let policy = DiscretePolicy::new(2, 3, &[4], 1.0, &Default::default());
        publisher.publish(&policy);
    }

    #[test]
    fn test_worker_collects_transitions() {
        let publisher = PolicyPublisher::new();
        publish_policy(&publisher);

        let games: Vec<Box<dyn Gym>> = vec![Box::new(ToyGym {
            step: 0,
            episode_len: 4,
        })];
        let mut worker = CollectorWorker::new(0, games, context(&publisher), 1_000, None);
        worker.start();

        while worker.steps_collected() < 20 {
            std::thread::yield_now();
        }
        worker.stop();

        let trajectories = worker.shared().trajectories.lock();
        assert_eq!(trajectories.len(), 1);
        assert_eq!(trajectories[0].len(), 2); // one segment per player
        assert!(!trajectories[0][0].is_empty());

        // Both players advanced in lockstep.
        assert_eq!(trajectories[0][0].len(), trajectories[0][1].len());
    }

    #[test]
    fn test_step_budget_pauses_collection() {
        let publisher = PolicyPublisher::new();
        publish_policy(&publisher);

        let games: Vec<Box<dyn Gym>> = vec![Box::new(ToyGym {
            step: 0,
            episode_len: 8,
        })];
        let mut worker = CollectorWorker::new(0, games, context(&publisher), 10, None);
        worker.start();

        while worker.steps_collected() <= 10 {
            std::thread::yield_now();
        }
        let after_budget = worker.steps_collected();
        std::thread::sleep(std::time::Duration::from_millis(20));

        // One tick may overshoot the budget (two players per step), but
        // collection must not keep growing past it.
        assert_eq!(worker.steps_collected(), after_budget);
        worker.stop();
    }

    #[test]
    fn test_stop_without_policy_terminates() {
        let publisher: PolicyPublisher<DiscretePolicy<B>> = PolicyPublisher::new();
        // No snapshot ever published; the worker must still stop cleanly.
        let games: Vec<Box<dyn Gym>> = vec![Box::new(ToyGym {
            step: 0,
            episode_len: 4,
        })];
        let mut worker = CollectorWorker::new(0, games, context(&publisher), 100, None);
        worker.start();
        worker.stop();
        assert_eq!(worker.steps_collected(), 0);
    }

    #[test]
    fn test_disable_collection_freezes_worker() {
        let publisher = PolicyPublisher::new();
        publish_policy(&publisher);

        let ctx = context(&publisher);
        let disable = Arc::clone(&ctx.disable_collection);
        let games: Vec<Box<dyn Gym>> = vec![Box::new(ToyGym {
            step: 0,
            episode_len: 8,
        })];
        let mut worker = CollectorWorker::new(0, games, ctx, 1_000_000, None);
        worker.start();

        while worker.steps_collected() < 4 {
            std::thread::yield_now();
        }
        disable.store(true, Ordering::Release);
        // Drain the tick that may be in flight.
        std::thread::sleep(std::time::Duration::from_millis(10));
        let frozen = worker.steps_collected();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(worker.steps_collected(), frozen);

        disable.store(false, Ordering::Release);
        while worker.steps_collected() <= frozen {
            std::thread::yield_now();
        }
        worker.stop();
    }

    #[test]
    fn test_avg_tracker() {
        let mut tracker = AvgTracker::default();
        assert_eq!(tracker.get(), 0.0);
        tracker.add(2.0);
        tracker.add(4.0);
        assert_eq!(tracker.get(), 3.0);

        let mut other = AvgTracker::default();
        other.add(6.0);
        tracker.merge(&other);
        assert_eq!(tracker.get(), 4.0);
    }

    #[test]
    fn test_game_metrics_episode_boundaries() {
        let mut metrics = GameMetrics::default();
        metrics.record_step(&[1.0, 3.0], false); // mean 2
        metrics.record_step(&[2.0, 2.0], true); // mean 2, episode total 4

        assert_eq!(metrics.avg_step_reward.get(), 2.0);
        assert_eq!(metrics.avg_episode_reward.get(), 4.0);

        metrics.record_step(&[0.0, 0.0], true);
        assert_eq!(metrics.avg_episode_reward.get(), 2.0);
    }

    #[test]
    fn test_slot_takes_latest_policy() {
        let slot = Arc::new(PolicySlot::new());
        let policy_a = DiscretePolicy::<B>::new(2, 3, &[4], 1.0, &Default::default());
        let policy_b = DiscretePolicy::<B>::new(2, 3, &[4], 1.0, &Default::default());
        slot.publish(policy_a);
        slot.publish(policy_b.clone());

        let taken = slot.take().unwrap();
        assert_eq!(taken.flat_params(), policy_b.flat_params());
    }
}
