use std::collections::HashSet;
use std::sync::Arc;

use redis::AsyncCommands;
use relay_shutdown::GracefulShutdown;
use relay_store::RedisPool;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{PeriodicJob, WorkerPoolConfig};
use crate::context::Shared;
use crate::error::{Error, Result};
use crate::heartbeat::Heartbeater;
use crate::observer::Observer;
use crate::periodic::PeriodicEnqueuer;
use crate::reaper::DeadPoolReaper;
use crate::requeuer::Requeuer;
use crate::worker::Worker;

/// Wires a key schema, a set of registered job types, and every background
/// component (workers, heartbeat, requeuers, periodic enqueuer, dead-pool
/// reaper) into one running pool. Registration may only happen before
/// `start()`; the pool owns every task it spawns and joins them on `stop()`.
pub struct WorkerPool {
    shared: Arc<Shared>,
    periodic_jobs: Vec<PeriodicJob>,
    heartbeat_interval: std::time::Duration,
    requeue_interval: std::time::Duration,
    periodic_enqueue_period: std::time::Duration,
    reap_period: std::time::Duration,
    worker_ids: Vec<String>,

    shutdown: GracefulShutdown,
    drain_tx: watch::Sender<bool>,
    drain_rx: watch::Receiver<bool>,
    drain_ack_tx: mpsc::Sender<String>,
    drain_ack_rx: Option<mpsc::Receiver<String>>,

    worker_handles: Vec<JoinHandle<()>>,
    task_handles: Vec<JoinHandle<()>>,
    started: bool,
}

impl WorkerPool {
    pub fn new(redis: RedisPool, config: WorkerPoolConfig) -> Self {
        let pool_id = Uuid::new_v4().to_string();
        let worker_ids: Vec<String> = (0..config.concurrency.max(1))
            .map(|_| Uuid::new_v4().to_string())
            .collect();
        let shared = Shared::new(pool_id, redis, &config.namespace, config.job_types);

        let (drain_tx, drain_rx) = watch::channel(false);
        let (drain_ack_tx, drain_ack_rx) = mpsc::channel(worker_ids.len().max(1));

        WorkerPool {
            shared,
            periodic_jobs: config.periodic_jobs,
            heartbeat_interval: config.heartbeat_interval,
            requeue_interval: config.requeue_interval,
            periodic_enqueue_period: config.periodic_enqueue_period,
            reap_period: config.reap_period,
            worker_ids,
            shutdown: GracefulShutdown::new(),
            drain_tx,
            drain_rx,
            drain_ack_tx,
            drain_ack_rx: Some(drain_ack_rx),
            worker_handles: Vec::new(),
            task_handles: Vec::new(),
            started: false,
        }
    }

    pub fn pool_id(&self) -> &str {
        &self.shared.pool_id
    }

    /// Declare every registered job type's name and concurrency cap, start
    /// every worker and background task. Must be called exactly once.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        self.register_job_types().await?;

        let observer = Arc::new(Observer::new(self.shared.clone()));
        for worker_id in self.worker_ids.clone() {
            let worker = Worker::new(worker_id, self.shared.clone(), observer.clone());
            let handle = worker.spawn(
                self.shutdown.consumer(),
                self.drain_rx.clone(),
                self.drain_ack_tx.clone(),
            );
            self.worker_handles.push(handle);
        }

        self.task_handles.push(
            Heartbeater::new(self.shared.clone(), self.heartbeat_interval, self.worker_ids.clone())
                .spawn(self.shutdown.consumer()),
        );
        self.task_handles.push(
            Requeuer::for_retry(self.shared.clone(), self.requeue_interval).spawn(self.shutdown.consumer()),
        );
        self.task_handles.push(
            Requeuer::for_scheduled(self.shared.clone(), self.requeue_interval)
                .spawn(self.shutdown.consumer()),
        );
        if !self.periodic_jobs.is_empty() {
            self.task_handles.push(
                PeriodicEnqueuer::new(
                    self.shared.clone(),
                    self.periodic_jobs.clone(),
                    self.periodic_enqueue_period,
                )
                .spawn(self.shutdown.consumer()),
            );
        }
        self.task_handles
            .push(DeadPoolReaper::new(self.shared.clone(), self.reap_period).spawn(self.shutdown.consumer()));

        Ok(())
    }

    async fn register_job_types(&self) -> Result<()> {
        let mut conn = self.shared.redis.get().await?;
        let known_jobs_key = self.shared.keys.known_jobs();
        for job_type in &self.shared.job_types {
            let _: () = conn.sadd(&known_jobs_key, &job_type.name).await?;
            if job_type.max_concurrency > 0 {
                let _: () = conn
                    .set(
                        self.shared.keys.max_concurrency(&job_type.name),
                        job_type.max_concurrency,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Signal every worker to stop claiming new work once its current queue
    /// empties, and wait until all of them have acknowledged.
    pub async fn drain(&mut self) {
        let _ = self.drain_tx.send(true);
        let mut acked: HashSet<String> = HashSet::new();
        let expected: HashSet<String> = self.worker_ids.iter().cloned().collect();

        if let Some(rx) = self.drain_ack_rx.as_mut() {
            while acked.len() < expected.len() {
                match rx.recv().await {
                    Some(worker_id) => {
                        acked.insert(worker_id);
                    }
                    None => break,
                }
            }
        }
    }

    /// Stop every worker and background task and wait for them to finish.
    /// Running handlers are allowed to complete; nothing here cancels
    /// in-flight work.
    pub async fn stop(mut self) {
        self.shutdown.shutdown();

        for handle in self.worker_handles.drain(..) {
            let _ = handle.await;
        }
        for handle in self.task_handles.drain(..) {
            let _ = handle.await;
        }
        let _ = self.shutdown.shutdown_finished.await;
    }

    /// Push a job directly onto its ready queue.
    pub async fn enqueue(&self, job: &crate::Job) -> Result<()> {
        let mut conn = self.shared.redis.get().await?;
        let list = self.shared.keys.jobs_list(&job.name);
        let _: () = conn.lpush(&list, job.to_bytes()?).await?;
        Ok(())
    }

    /// Push a job onto its ready queue, unless an identical `(name, args)`
    /// unique job is already enqueued or scheduled.
    pub async fn enqueue_unique(&self, job: &crate::Job) -> Result<crate::EnqueueOutcome> {
        let mut conn = self.shared.redis.get().await?;
        let unique_key = self.shared.keys.unique(&job.name, &job.args.to_string());
        let list = self.shared.keys.jobs_list(&job.name);
        self.shared
            .enqueue_unique_script
            .run(&mut conn, &unique_key, &list, &job.to_bytes()?)
            .await
    }

    /// Schedule a job to become ready at `run_at` (epoch seconds).
    pub async fn enqueue_scheduled(&self, job: &crate::Job, run_at: i64) -> Result<()> {
        let mut conn = self.shared.redis.get().await?;
        let scheduled = self.shared.keys.scheduled();
        let _: () = conn.zadd(&scheduled, job.to_bytes()?, run_at).await?;
        Ok(())
    }

    /// Remove a single job by id from the retry or scheduled sorted set.
    pub async fn delete_pending(&self, from_retry_set: bool, job_id: &str) -> Result<Option<crate::Job>> {
        let mut conn = self.shared.redis.get().await?;
        let set = if from_retry_set {
            self.shared.keys.retry()
        } else {
            self.shared.keys.scheduled()
        };
        let bytes = self.shared.delete_single_script.run(&mut conn, &set, job_id).await?;
        Ok(bytes.map(|b| crate::Job::from_bytes(&b)).transpose()?)
    }

    /// Resurrect a single dead job, clearing its failure history.
    pub async fn requeue_dead(&self, job_id: &str) -> Result<bool> {
        let mut conn = self.shared.redis.get().await?;
        let dead = self.shared.keys.dead();
        let jobs_prefix = self.shared.keys.jobs_prefix();
        self.shared
            .requeue_single_dead_script
            .run(&mut conn, &dead, job_id, &jobs_prefix, now())
            .await
    }

    /// Resurrect up to `limit` dead jobs, oldest first.
    pub async fn requeue_all_dead(&self, limit: i64) -> Result<i64> {
        let mut conn = self.shared.redis.get().await?;
        let dead = self.shared.keys.dead();
        let jobs_prefix = self.shared.keys.jobs_prefix();
        self.shared
            .requeue_all_dead_script
            .run(&mut conn, &dead, &jobs_prefix, now(), limit)
            .await
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
