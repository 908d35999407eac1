use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redis::AsyncCommands;
use relay_shutdown::GracefulShutdownConsumer;

use crate::context::Shared;

/// Publishes this pool's liveness to the store on a fixed interval and
/// removes it on a graceful stop. A dead-pool reaper elsewhere in the fleet
/// relies on this hash's TTL alone when a pool vanishes without stopping
/// cleanly.
pub struct Heartbeater {
    shared: Arc<Shared>,
    interval: Duration,
    started_at: i64,
    worker_ids: Vec<String>,
}

impl Heartbeater {
    pub fn new(shared: Arc<Shared>, interval: Duration, worker_ids: Vec<String>) -> Self {
        Heartbeater {
            shared,
            interval,
            started_at: Utc::now().timestamp(),
            worker_ids,
        }
    }

    pub fn spawn(self, mut shutdown: GracefulShutdownConsumer) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = self.beat().await {
                    tracing::error!(pool_id = %self.shared.pool_id, error = %e, "heartbeat failed");
                }

                tokio::select! {
                    biased;
                    _ = shutdown.wait_for_shutdown() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }

            if let Err(e) = self.remove().await {
                tracing::error!(pool_id = %self.shared.pool_id, error = %e, "heartbeat removal failed");
            }
        })
    }

    async fn beat(&self) -> crate::error::Result<()> {
        let mut conn = self.shared.redis.get().await?;
        let key = self.shared.keys.worker_pool_heartbeat(&self.shared.pool_id);
        let mut job_names: Vec<&str> = self.shared.job_types.iter().map(|jt| jt.name.as_str()).collect();
        job_names.sort_unstable();
        let job_names = job_names.join(",");

        let mut worker_ids: Vec<&str> = self.worker_ids.iter().map(String::as_str).collect();
        worker_ids.sort_unstable();
        let worker_ids = worker_ids.join(",");
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_default();

        let () = conn
            .hset_multiple(
                &key,
                &[
                    ("heartbeat_at", Utc::now().timestamp().to_string()),
                    ("started_at", self.started_at.to_string()),
                    ("job_names", job_names),
                    ("concurrency", self.worker_ids.len().to_string()),
                    ("worker_ids", worker_ids),
                    ("host", host),
                    ("pid", std::process::id().to_string()),
                ],
            )
            .await?;

        let ttl = (self.interval.as_secs() * 6).max(1);
        let _: () = conn.expire(&key, ttl as usize).await?;
        let _: () = conn.sadd(self.shared.keys.worker_pools(), &self.shared.pool_id).await?;

        Ok(())
    }

    async fn remove(&self) -> crate::error::Result<()> {
        let mut conn = self.shared.redis.get().await?;
        let key = self.shared.keys.worker_pool_heartbeat(&self.shared.pool_id);
        let _: () = conn.srem(self.shared.keys.worker_pools(), &self.shared.pool_id).await?;
        let _: () = conn.del(&key).await?;
        Ok(())
    }
}
