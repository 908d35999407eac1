use std::sync::Arc;

use relay_store::RedisPool;

use crate::config::JobType;
use crate::keys::Keys;
use crate::scripts;

/// Everything a worker, heartbeater, requeuer, periodic enqueuer, or reaper
/// needs to talk to the store; built once by the supervisor and shared
/// through an `Arc` by every background task it spawns.
pub struct Shared {
    pub pool_id: String,
    pub redis: RedisPool,
    pub keys: Keys,
    pub job_types: Vec<JobType>,

    pub fetch_script: scripts::FetchScript,
    pub release_script: scripts::ReleaseScript,
    pub reenqueue_script: scripts::ReenqueueScript,
    pub promote_script: scripts::PromoteScript,
    pub delete_single_script: scripts::DeleteSingleScript,
    pub requeue_single_dead_script: scripts::RequeueSingleDeadScript,
    pub requeue_all_dead_script: scripts::RequeueAllDeadScript,
    pub enqueue_unique_script: scripts::EnqueueUniqueScript,
    pub enqueue_unique_in_script: scripts::EnqueueUniqueInScript,
    pub reap_stale_locks_script: scripts::ReapStaleLocksScript,
    pub get_unknown_pools_script: scripts::GetUnknownPoolsScript,
    pub remove_dangling_locks_script: scripts::RemoveDanglingLocksScript,
}

impl Shared {
    pub fn new(pool_id: String, redis: RedisPool, namespace: &str, job_types: Vec<JobType>) -> Arc<Self> {
        Arc::new(Shared {
            pool_id,
            redis,
            keys: Keys::new(namespace),
            job_types,
            fetch_script: scripts::FetchScript::new(),
            release_script: scripts::ReleaseScript::new(),
            reenqueue_script: scripts::ReenqueueScript::new(),
            promote_script: scripts::PromoteScript::new(),
            delete_single_script: scripts::DeleteSingleScript::new(),
            requeue_single_dead_script: scripts::RequeueSingleDeadScript::new(),
            requeue_all_dead_script: scripts::RequeueAllDeadScript::new(),
            enqueue_unique_script: scripts::EnqueueUniqueScript::new(),
            enqueue_unique_in_script: scripts::EnqueueUniqueInScript::new(),
            reap_stale_locks_script: scripts::ReapStaleLocksScript::new(),
            get_unknown_pools_script: scripts::GetUnknownPoolsScript::new(),
            remove_dangling_locks_script: scripts::RemoveDanglingLocksScript::new(),
        })
    }

    pub fn job_type(&self, name: &str) -> Option<&JobType> {
        self.job_types.iter().find(|jt| jt.name == name)
    }
}
