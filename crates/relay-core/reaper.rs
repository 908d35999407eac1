use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use redis::AsyncCommands;
use relay_shutdown::GracefulShutdownConsumer;
use uuid::Uuid;

use crate::context::Shared;
use crate::scripts::ReenqueueCandidate;

/// Detects pools whose heartbeat has expired, re-enqueues whatever they left
/// in-progress, and repairs lock accounting left behind by their absence.
/// Only one pool in the fleet performs a reap at a time, serialized through
/// a short-lived distributed lock.
pub struct DeadPoolReaper {
    shared: Arc<Shared>,
    period: Duration,
}

impl DeadPoolReaper {
    pub fn new(shared: Arc<Shared>, period: Duration) -> Self {
        DeadPoolReaper { shared, period }
    }

    pub fn spawn(self, mut shutdown: GracefulShutdownConsumer) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "dead-pool reap failed");
                }

                let jitter = self.period.as_secs() as i64 / 10;
                let jitter_secs = if jitter > 0 {
                    rand::thread_rng().gen_range(-jitter..=jitter)
                } else {
                    0
                };
                let sleep_for =
                    Duration::from_secs((self.period.as_secs() as i64 + jitter_secs).max(1) as u64);

                tokio::select! {
                    biased;
                    _ = shutdown.wait_for_shutdown() => break,
                    _ = tokio::time::sleep(sleep_for) => {}
                }
            }
        })
    }

    async fn run_once(&self) -> crate::error::Result<()> {
        let lock_key = self.shared.keys.reaper_lock();
        let token = Uuid::new_v4().to_string();
        let mut conn = self.shared.redis.get().await?;

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&lock_key)
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(self.period.as_secs().max(1))
            .query_async(&mut *conn)
            .await?;
        if acquired.is_none() {
            return Ok(());
        }

        let result = self.reap(&mut conn).await;

        // Best-effort unlock; a held lock simply expires on its own TTL.
        let held: Option<String> = conn.get(&lock_key).await.ok();
        if held.as_deref() == Some(token.as_str()) {
            let _: Result<(), _> = conn.del(&lock_key).await;
        }

        result
    }

    async fn reap(&self, conn: &mut deadpool_redis::Connection) -> crate::error::Result<()> {
        let worker_pools_key = self.shared.keys.worker_pools();
        let member_ids: Vec<String> = conn.smembers(&worker_pools_key).await?;

        let mut dead_pools = Vec::new();
        for pool_id in &member_ids {
            let heartbeat_key = self.shared.keys.worker_pool_heartbeat(pool_id);
            let alive: bool = conn.exists(&heartbeat_key).await?;
            if !alive {
                dead_pools.push(pool_id.clone());
            }
        }

        let lock_info_keys: Vec<String> = self
            .shared
            .job_types
            .iter()
            .map(|jt| self.shared.keys.lock_info(&jt.name))
            .collect();
        let lock_info_refs: Vec<&str> = lock_info_keys.iter().map(String::as_str).collect();
        let unknown = self
            .shared
            .get_unknown_pools_script
            .run(conn, &worker_pools_key, &lock_info_refs)
            .await?;
        for (pool_id, _) in unknown {
            if !dead_pools.contains(&pool_id) {
                dead_pools.push(pool_id);
            }
        }

        let lock_pairs_owned: Vec<(String, String)> = self
            .shared
            .job_types
            .iter()
            .map(|jt| (self.shared.keys.lock(&jt.name), self.shared.keys.lock_info(&jt.name)))
            .collect();
        let lock_pairs: Vec<(&str, &str)> = lock_pairs_owned
            .iter()
            .map(|(l, li)| (l.as_str(), li.as_str()))
            .collect();

        for dead_pool_id in &dead_pools {
            let job_names = self.job_names_for_dead_pool(conn, dead_pool_id).await?;
            self.reclaim_in_progress(conn, dead_pool_id, &job_names).await?;

            let clamped = self
                .shared
                .reap_stale_locks_script
                .run(conn, &lock_pairs, dead_pool_id)
                .await?;
            if !clamped.is_empty() {
                tracing::warn!(pool_id = %dead_pool_id, ?clamped, "clamped negative lock counters");
            }

            let _: () = conn.srem(&worker_pools_key, dead_pool_id).await?;
        }

        let fixed = self
            .shared
            .remove_dangling_locks_script
            .run(conn, &lock_pairs)
            .await?;
        if !fixed.is_empty() {
            tracing::warn!(?fixed, "corrected dangling lock drift");
        }

        Ok(())
    }

    /// The dead pool's own declared job names, read from its last heartbeat
    /// hash if it hasn't expired away yet; otherwise falls back to this
    /// pool's own registry, which may miss names the dead pool alone knew
    /// about.
    async fn job_names_for_dead_pool(
        &self,
        conn: &mut deadpool_redis::Connection,
        dead_pool_id: &str,
    ) -> crate::error::Result<Vec<String>> {
        let heartbeat_key = self.shared.keys.worker_pool_heartbeat(dead_pool_id);
        let job_names: Option<String> = conn.hget(&heartbeat_key, "job_names").await?;
        Ok(match job_names.filter(|s| !s.is_empty()) {
            Some(names) => names.split(',').map(str::to_string).collect(),
            None => self.shared.job_types.iter().map(|jt| jt.name.clone()).collect(),
        })
    }

    async fn reclaim_in_progress(
        &self,
        conn: &mut deadpool_redis::Connection,
        dead_pool_id: &str,
        job_names: &[String],
    ) -> crate::error::Result<()> {
        let candidates: Vec<(String, String, String, String)> = job_names
            .iter()
            .map(|name| {
                (
                    self.shared.keys.inprogress_list(name, dead_pool_id),
                    self.shared.keys.jobs_list(name),
                    self.shared.keys.lock(name),
                    self.shared.keys.lock_info(name),
                )
            })
            .collect();
        let candidate_refs: Vec<ReenqueueCandidate> = candidates
            .iter()
            .map(|(inp, ready, lock, li)| ReenqueueCandidate {
                inprogress_list: inp,
                jobs_list: ready,
                lock,
                lock_info: li,
            })
            .collect();

        loop {
            let result = self
                .shared
                .reenqueue_script
                .run(conn, &candidate_refs, dead_pool_id)
                .await?;
            if result.is_none() {
                break;
            }
        }

        Ok(())
    }
}
