use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use relay_shutdown::GracefulShutdownConsumer;

use crate::context::Shared;
use crate::scripts::PromoteOutcome;

/// Promotes due items from one scored set (retry or scheduled) onto their
/// ready queues. One instance runs per set; both share the same promotion
/// script and differ only in which key they target.
pub struct Requeuer {
    shared: Arc<Shared>,
    source_set: String,
    tick: Duration,
}

impl Requeuer {
    pub fn for_retry(shared: Arc<Shared>, tick: Duration) -> Self {
        let source_set = shared.keys.retry();
        Requeuer {
            shared,
            source_set,
            tick,
        }
    }

    pub fn for_scheduled(shared: Arc<Shared>, tick: Duration) -> Self {
        let source_set = shared.keys.scheduled();
        Requeuer {
            shared,
            source_set,
            tick,
        }
    }

    pub fn spawn(self, mut shutdown: GracefulShutdownConsumer) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                loop {
                    match self.drain_one().await {
                        Ok(PromoteOutcome::Empty) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            tracing::error!(source = %self.source_set, error = %e, "requeue tick failed");
                            break;
                        }
                    }
                }

                let jitter_ms: i64 = rand::thread_rng().gen_range(-250..250);
                let sleep_for = Duration::from_millis((self.tick.as_millis() as i64 + jitter_ms).max(0) as u64);
                tokio::select! {
                    biased;
                    _ = shutdown.wait_for_shutdown() => break,
                    _ = tokio::time::sleep(sleep_for) => {}
                }
            }
        })
    }

    async fn drain_one(&self) -> crate::error::Result<PromoteOutcome> {
        let mut conn = self.shared.redis.get().await?;
        let dead = self.shared.keys.dead();
        let known_jobs = self.shared.keys.known_jobs();
        let jobs_prefix = self.shared.keys.jobs_prefix();
        let now = Utc::now().timestamp();

        let outcome = self
            .shared
            .promote_script
            .run(&mut conn, &self.source_set, &dead, &known_jobs, &jobs_prefix, now)
            .await?;

        if let PromoteOutcome::Dead = outcome {
            tracing::warn!(source = %self.source_set, "forwarded a job with no registered job type to dead");
        }

        Ok(outcome)
    }
}
