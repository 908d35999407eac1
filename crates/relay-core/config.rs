use std::sync::Arc;

use crate::backoff::default_backoff;
use crate::handler::JobHandler;
use crate::job::Job;

type BackoffFn = Arc<dyn Fn(&Job) -> i64 + Send + Sync>;

/// A registered job type: its handler plus every tunable from the data
/// model (priority, retry cap, concurrency cap, backoff).
#[derive(Clone)]
pub struct JobType {
    pub name: String,
    pub priority: u32,
    pub max_fails: u32,
    pub skip_dead: bool,
    pub max_concurrency: u32,
    pub backoff: BackoffFn,
    pub handler: Arc<dyn JobHandler>,
}

impl JobType {
    pub fn new(name: impl Into<String>, handler: Arc<dyn JobHandler>) -> Self {
        JobType {
            name: name.into(),
            priority: 1,
            max_fails: 4,
            skip_dead: false,
            max_concurrency: 0,
            backoff: Arc::new(|job| default_backoff(job.fails)),
            handler,
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_fails(mut self, max_fails: u32) -> Self {
        self.max_fails = max_fails;
        self
    }

    pub fn skip_dead(mut self, skip_dead: bool) -> Self {
        self.skip_dead = skip_dead;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: u32) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn backoff(mut self, backoff: impl Fn(&Job) -> i64 + Send + Sync + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }
}

/// A periodic (cron) job definition, resolved and enqueued by the periodic
/// enqueuer rather than run directly by a worker.
#[derive(Clone)]
pub struct PeriodicJob {
    pub name: String,
    pub schedule: cron::Schedule,
    pub args: serde_json::Value,
}

impl PeriodicJob {
    pub fn new(
        name: impl Into<String>,
        schedule_expr: &str,
        args: serde_json::Value,
    ) -> crate::error::Result<Self> {
        let schedule = schedule_expr.parse::<cron::Schedule>()?;
        Ok(PeriodicJob {
            name: name.into(),
            schedule,
            args,
        })
    }
}

/// Tunables for an entire worker pool, passed to the supervisor at
/// construction.
pub struct WorkerPoolConfig {
    pub namespace: String,
    pub concurrency: usize,
    pub job_types: Vec<JobType>,
    pub periodic_jobs: Vec<PeriodicJob>,
    pub heartbeat_interval: std::time::Duration,
    pub requeue_interval: std::time::Duration,
    pub periodic_enqueue_period: std::time::Duration,
    pub reap_period: std::time::Duration,
}

impl WorkerPoolConfig {
    pub fn new(namespace: impl Into<String>, concurrency: usize) -> Self {
        WorkerPoolConfig {
            namespace: namespace.into(),
            concurrency,
            job_types: Vec::new(),
            periodic_jobs: Vec::new(),
            heartbeat_interval: std::time::Duration::from_secs(5),
            requeue_interval: std::time::Duration::from_secs(1),
            periodic_enqueue_period: std::time::Duration::from_secs(38),
            reap_period: std::time::Duration::from_secs(600),
        }
    }

    pub fn register(mut self, job_type: JobType) -> Self {
        self.job_types.push(job_type);
        self
    }

    pub fn periodic(mut self, periodic_job: PeriodicJob) -> Self {
        self.periodic_jobs.push(periodic_job);
        self
    }
}
