use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_shutdown::GracefulShutdownConsumer;
use tokio::sync::{mpsc, watch};

use crate::backoff::idle_backoff;
use crate::context::Shared;
use crate::job::Job;
use crate::observer::Observer;
use crate::sampler::Sampler;
use crate::scripts::FetchCandidate;

/// One worker: a single-threaded fetch/execute/release loop claiming from
/// whichever job type its sampler picks each attempt.
pub struct Worker {
    id: String,
    shared: Arc<Shared>,
    observer: Arc<Observer>,
}

impl Worker {
    pub fn new(id: impl Into<String>, shared: Arc<Shared>, observer: Arc<Observer>) -> Self {
        Worker {
            id: id.into(),
            shared,
            observer,
        }
    }

    pub fn spawn(
        self,
        mut shutdown: GracefulShutdownConsumer,
        mut drain_rx: watch::Receiver<bool>,
        drain_ack: mpsc::Sender<String>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut idle_count: usize = 0;
            let mut acked_drain = false;

            loop {
                if shutdown.shutting_down() {
                    break;
                }

                match self.fetch().await {
                    Ok(Some((job, queue_type, ready_key, inprogress_key))) => {
                        idle_count = 0;
                        acked_drain = false;
                        self.execute_and_release(job, &queue_type, &ready_key, &inprogress_key)
                            .await;
                    }
                    Ok(None) => {
                        if *drain_rx.borrow() && !acked_drain {
                            let _ = drain_ack.send(self.id.clone()).await;
                            acked_drain = true;
                        }
                        idle_count += 1;
                        tokio::select! {
                            biased;
                            _ = shutdown.wait_for_shutdown() => break,
                            _ = drain_rx.changed() => {}
                            _ = tokio::time::sleep(idle_backoff(idle_count)) => {}
                        }
                    }
                    Err(e) => {
                        tracing::error!(worker = %self.id, error = %e, "job fetch failed");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Returns the dequeued job, the registered job type whose ready queue
    /// it was claimed from (which owns the concurrency lock regardless of
    /// what the job body's own `name` field says), and the ready/in-progress
    /// list keys used for that claim.
    async fn fetch(&self) -> crate::error::Result<Option<(Job, crate::config::JobType, String, String)>> {
        if self.shared.job_types.is_empty() {
            return Ok(None);
        }

        let sampler = Sampler::new(self.shared.job_types.iter().map(|jt| jt.priority).collect());
        let order = sampler.sample_order();

        let ready_keys: Vec<String> = self
            .shared
            .job_types
            .iter()
            .map(|jt| self.shared.keys.jobs_list(&jt.name))
            .collect();
        let inprogress_keys: Vec<String> = self
            .shared
            .job_types
            .iter()
            .map(|jt| self.shared.keys.inprogress_list(&jt.name, &self.shared.pool_id))
            .collect();
        let paused_keys: Vec<String> = self
            .shared
            .job_types
            .iter()
            .map(|jt| self.shared.keys.paused(&jt.name))
            .collect();
        let lock_keys: Vec<String> = self
            .shared
            .job_types
            .iter()
            .map(|jt| self.shared.keys.lock(&jt.name))
            .collect();
        let lock_info_keys: Vec<String> = self
            .shared
            .job_types
            .iter()
            .map(|jt| self.shared.keys.lock_info(&jt.name))
            .collect();
        let max_concurrency_keys: Vec<String> = self
            .shared
            .job_types
            .iter()
            .map(|jt| self.shared.keys.max_concurrency(&jt.name))
            .collect();

        let candidates: Vec<FetchCandidate> = order
            .iter()
            .map(|&idx| FetchCandidate {
                jobs_list: &ready_keys[idx],
                inprogress_list: &inprogress_keys[idx],
                paused: &paused_keys[idx],
                lock: &lock_keys[idx],
                lock_info: &lock_info_keys[idx],
                max_concurrency: &max_concurrency_keys[idx],
            })
            .collect();

        let mut conn = self.shared.redis.get().await?;
        let result = self
            .shared
            .fetch_script
            .run(&mut conn, &candidates, &self.shared.pool_id)
            .await?;

        Ok(match result {
            Some((bytes, ready_key, inprogress_key)) => {
                // The script returns whichever candidate's ready-list key won;
                // recover which registered job type that was so release() can
                // credit the right lock counter regardless of the job body's
                // own `name` field.
                let idx = ready_keys
                    .iter()
                    .position(|k| *k == ready_key)
                    .expect("fetch script returned a ready-list key we didn't pass in");
                let queue_type = self.shared.job_types[idx].clone();
                Some((Job::from_bytes(&bytes)?, queue_type, ready_key, inprogress_key))
            }
            None => None,
        })
    }

    async fn execute_and_release(
        &self,
        mut job: Job,
        queue_type: &crate::config::JobType,
        ready_key: &str,
        inprogress_key: &str,
    ) {
        if job.unique {
            let unique_key = self.shared.keys.unique(&job.name, &job.args.to_string());
            if let Ok(mut conn) = self.shared.redis.get().await {
                let _: Result<(), _> = redis::cmd("DEL").arg(&unique_key).query_async(&mut *conn).await;
            }
        }

        let claimed_bytes = job.to_bytes().unwrap_or_default();
        let _ = self.observer.record_start(&self.id, &job).await;

        // Handler dispatch is by the job body's own name, which normally
        // matches the queue it came from but may not (a stray job).
        let handler_type = self.shared.job_type(&job.name);
        let run_err = match handler_type {
            None => Some(anyhow::anyhow!("stray job: no handler registered for {}", job.name)),
            Some(jt) => {
                let handler = jt.handler.clone();
                let job_for_handler = job.clone();
                // Run the handler on its own task so a panic unwinds there
                // instead of taking this worker's loop down with it.
                match tokio::spawn(async move { handler.handle(&job_for_handler).await }).await {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e),
                    Err(join_err) => Some(anyhow::anyhow!("handler panicked: {}", describe_panic(join_err))),
                }
            }
        };

        let succeeded = run_err.is_none();
        let _ = self.observer.record_finish(&self.id, &job, succeeded).await;

        let forward = match (handler_type, &run_err) {
            (_, None) => None,
            (None, Some(_)) => None,
            (Some(_), Some(e)) => {
                job.fails += 1;
                job.err = Some(e.to_string());
                job.failed_at = Some(Utc::now().timestamp());

                if queue_type.skip_dead {
                    None
                } else if job.fails < queue_type.max_fails {
                    let backoff_secs = (queue_type.backoff)(&job);
                    Some((self.shared.keys.retry(), Utc::now().timestamp() + backoff_secs))
                } else {
                    Some((self.shared.keys.dead(), Utc::now().timestamp()))
                }
            }
        };

        self.release(inprogress_key, ready_key, queue_type, &job, forward, &claimed_bytes)
            .await;
    }

    async fn release(
        &self,
        inprogress_key: &str,
        ready_key: &str,
        queue_type: &crate::config::JobType,
        job: &Job,
        forward: Option<(String, i64)>,
        claimed_bytes: &[u8],
    ) {
        let lock_key = self.shared.keys.lock(&queue_type.name);
        let lock_info_key = self.shared.keys.lock_info(&queue_type.name);

        let forward_bytes = job.to_bytes().unwrap_or_default();
        let mut idle_count = 0usize;
        loop {
            let attempt = async {
                let mut conn = self.shared.redis.get().await?;
                self.shared
                    .release_script
                    .run(
                        &mut conn,
                        inprogress_key,
                        &lock_key,
                        &lock_info_key,
                        forward
                            .as_ref()
                            .map(|(queue, _)| queue.as_str())
                            .unwrap_or(ready_key),
                        &self.shared.pool_id,
                        claimed_bytes,
                        forward.as_ref().map(|(_, score)| (*score, forward_bytes.as_slice())),
                    )
                    .await
            };

            match attempt.await {
                Ok(_) => return,
                Err(e) => {
                    tracing::error!(worker = %self.id, job_id = %job.id, error = %e, "release failed, retrying");
                    idle_count += 1;
                    tokio::time::sleep(idle_backoff(idle_count)).await;
                }
            }
        }
    }
}

fn describe_panic(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
