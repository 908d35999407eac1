use std::sync::Arc;

use chrono::Utc;
use redis::AsyncCommands;

use crate::context::Shared;
use crate::error::Result;
use crate::job::Job;

/// Records each worker's currently-executing job for diagnostics. Purely
/// peripheral: nothing here affects dequeue/release correctness.
pub struct Observer {
    shared: Arc<Shared>,
}

impl Observer {
    pub fn new(shared: Arc<Shared>) -> Self {
        Observer { shared }
    }

    pub async fn record_start(&self, worker_id: &str, job: &Job) -> Result<()> {
        let key = self.shared.keys.worker(worker_id);
        let mut conn = self.shared.redis.get().await?;
        let () = conn
            .hset_multiple(
                &key,
                &[
                    ("job_id", job.id.clone()),
                    ("job_name", job.name.clone()),
                    ("args", job.args.to_string()),
                    ("started_at", Utc::now().timestamp().to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn record_finish(&self, worker_id: &str, job: &Job, succeeded: bool) -> Result<()> {
        let key = self.shared.keys.worker(worker_id);
        let mut conn = self.shared.redis.get().await?;
        let () = conn
            .hset_multiple(
                &key,
                &[
                    ("last_job_id", job.id.clone()),
                    ("last_job_name", job.name.clone()),
                    ("last_finished_at", Utc::now().timestamp().to_string()),
                    ("last_succeeded", succeeded.to_string()),
                ],
            )
            .await?;
        Ok(())
    }
}
