//! Experience collection: worker threads driving game instances and the
//! pool that coordinates them.

pub mod pool;
pub mod worker;

pub use pool::{CollectorPool, CollectorPoolConfig};
pub use worker::{
    AvgTracker, CollectorWorker, GameMetrics, RenderHandle, WorkerContext, WorkerTimes,
};
