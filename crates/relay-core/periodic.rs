use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redis::AsyncCommands;
use relay_shutdown::GracefulShutdownConsumer;
use sha1::{Digest, Sha1};

use crate::config::PeriodicJob;
use crate::context::Shared;
use crate::job::Job;
use crate::scripts::EnqueueOutcome;

/// Look-ahead window for computing upcoming firings, and the deadline grace
/// period a firing is still considered live after it was due.
const LOOK_AHEAD_MULTIPLE: u32 = 2;
const DEADLINE_GRACE_SECS: i64 = 59;

/// Enqueues each registered periodic job's upcoming firings into the
/// scheduled set, deduplicated fleet-wide by a deterministic job id plus a
/// watermark that only one pool advances per tick.
pub struct PeriodicEnqueuer {
    shared: Arc<Shared>,
    jobs: Vec<PeriodicJob>,
    enqueue_period: Duration,
}

impl PeriodicEnqueuer {
    pub fn new(shared: Arc<Shared>, jobs: Vec<PeriodicJob>, enqueue_period: Duration) -> Self {
        PeriodicEnqueuer {
            shared,
            jobs,
            enqueue_period,
        }
    }

    pub fn spawn(self, mut shutdown: GracefulShutdownConsumer) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = self.tick().await {
                    tracing::error!(error = %e, "periodic enqueue tick failed");
                }

                tokio::select! {
                    biased;
                    _ = shutdown.wait_for_shutdown() => break,
                    _ = tokio::time::sleep(self.enqueue_period) => {}
                }
            }
        })
    }

    async fn tick(&self) -> crate::error::Result<()> {
        if self.jobs.is_empty() {
            return Ok(());
        }

        let now = Utc::now().timestamp();
        let watermark_key = self.shared.keys.last_periodic_enqueue();
        let mut conn = self.shared.redis.get().await?;

        let watermark: Option<i64> = conn.get(&watermark_key).await?;
        let period_secs = self.enqueue_period.as_secs() as i64;
        if let Some(w) = watermark {
            if w > now - period_secs {
                // Another pool already advanced this tick.
                return Ok(());
            }
        }
        let _: () = conn.set(&watermark_key, now).await?;

        let look_ahead = period_secs * LOOK_AHEAD_MULTIPLE as i64;
        for job in &self.jobs {
            self.enqueue_upcoming(job, now, look_ahead).await?;
        }

        Ok(())
    }

    async fn enqueue_upcoming(
        &self,
        periodic: &PeriodicJob,
        now: i64,
        look_ahead_secs: i64,
    ) -> crate::error::Result<()> {
        let window_end = chrono::DateTime::<Utc>::from_timestamp(now + look_ahead_secs, 0)
            .unwrap_or_else(Utc::now);

        let firings = periodic.schedule.upcoming(Utc).take_while(|t| *t <= window_end);
        for firing in firings {
            let fire_at = firing.timestamp();
            let deterministic_id = deterministic_periodic_id(&periodic.name, fire_at);

            let job = Job::new(periodic.name.clone(), periodic.args.clone())
                .with_id(deterministic_id)
                .with_deadline(fire_at + DEADLINE_GRACE_SECS)
                .unique();

            let job_bytes = job.to_bytes()?;
            // Scoped by (name, fire_at) via the deterministic id, not by
            // (name, args): args never vary across firings of the same
            // periodic job, so an args-keyed latch would only ever let the
            // first firing in a look-ahead window win it.
            let unique_key = self.shared.keys.unique(&job.name, &fire_at.to_string());
            let scheduled_key = self.shared.keys.scheduled();

            let mut conn = self.shared.redis.get().await?;
            let outcome = self
                .shared
                .enqueue_unique_in_script
                .run(&mut conn, &unique_key, &scheduled_key, &job_bytes, fire_at)
                .await?;

            if outcome == EnqueueOutcome::Enqueued {
                tracing::debug!(job = %periodic.name, fire_at, "enqueued periodic firing");
            }
        }

        Ok(())
    }
}

fn deterministic_periodic_id(name: &str, fire_at: i64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(name.as_bytes());
    hasher.update(b"|");
    hasher.update(fire_at.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_id_is_stable_for_same_inputs() {
        let a = deterministic_periodic_id("cleanup", 1000);
        let b = deterministic_periodic_id("cleanup", 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn deterministic_id_differs_by_firing_time() {
        let a = deterministic_periodic_id("cleanup", 1000);
        let b = deterministic_periodic_id("cleanup", 1001);
        assert_ne!(a, b);
    }
}
