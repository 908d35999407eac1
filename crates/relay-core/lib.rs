//! Atomic dequeue/release protocol, failure lifecycle, and fleet
//! coordination for a Redis-backed job queue: priority-sampled dequeue with
//! per-type concurrency caps, retry/dead forwarding with backoff, a
//! requeuer for due retry/scheduled items, a periodic (cron) enqueuer that
//! dedups across the fleet, and a dead-pool reaper that reclaims orphaned
//! in-progress work.

mod backoff;
mod config;
mod context;
mod error;
mod handler;
mod heartbeat;
mod job;
mod keys;
mod observer;
mod periodic;
mod pool;
mod reaper;
mod requeuer;
mod sampler;
mod scripts;
mod worker;

pub use config::{JobType, PeriodicJob, WorkerPoolConfig};
pub use error::{Error, Result};
pub use handler::JobHandler;
pub use job::Job;
pub use pool::WorkerPool;

pub use scripts::{
    DeleteSingleScript, EnqueueOutcome, EnqueueUniqueInScript, EnqueueUniqueScript,
    GetUnknownPoolsScript, PromoteOutcome, PromoteScript, ReapStaleLocksScript,
    RemoveDanglingLocksScript, RequeueAllDeadScript, RequeueSingleDeadScript,
};
