//! Canonical key names for everything this crate stores in Redis.
//!
//! Every key is namespaced under a caller-chosen prefix ending in `:`, per
//! the layout in the system design (known jobs set, per-name queues, lock
//! counters, the three scored sets, worker-pool bookkeeping, and the
//! uniqueness/periodic watermarks).

pub struct Keys {
    prefix: String,
}

impl Keys {
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with(':') {
            prefix.push(':');
        }
        Keys { prefix }
    }

    pub fn known_jobs(&self) -> String {
        format!("{}known_jobs", self.prefix)
    }

    pub fn jobs_list(&self, name: &str) -> String {
        format!("{}jobs:{}", self.prefix, name)
    }

    /// The ready-list key prefix, i.e. `jobs_list` with the name omitted.
    /// Scripts that discover a job's name at run time (promotion, dead
    /// requeue) build the final list key by appending it themselves.
    pub fn jobs_prefix(&self) -> String {
        format!("{}jobs:", self.prefix)
    }

    pub fn inprogress_list(&self, name: &str, pool_id: &str) -> String {
        format!("{}jobs:{}:{}:inprogress", self.prefix, name, pool_id)
    }

    pub fn paused(&self, name: &str) -> String {
        format!("{}jobs:{}:paused", self.prefix, name)
    }

    pub fn lock(&self, name: &str) -> String {
        format!("{}jobs:{}:lock", self.prefix, name)
    }

    pub fn lock_info(&self, name: &str) -> String {
        format!("{}jobs:{}:lock_info", self.prefix, name)
    }

    pub fn max_concurrency(&self, name: &str) -> String {
        format!("{}jobs:{}:max_concurrency", self.prefix, name)
    }

    pub fn retry(&self) -> String {
        format!("{}retry", self.prefix)
    }

    pub fn scheduled(&self) -> String {
        format!("{}scheduled", self.prefix)
    }

    pub fn dead(&self) -> String {
        format!("{}dead", self.prefix)
    }

    pub fn worker_pools(&self) -> String {
        format!("{}worker_pools", self.prefix)
    }

    pub fn worker_pool_heartbeat(&self, pool_id: &str) -> String {
        format!("{}worker_pools:{}", self.prefix, pool_id)
    }

    pub fn worker(&self, worker_id: &str) -> String {
        format!("{}worker:{}", self.prefix, worker_id)
    }

    pub fn unique(&self, name: &str, args_json: &str) -> String {
        format!("{}unique:{}:{}", self.prefix, name, args_json)
    }

    pub fn last_periodic_enqueue(&self) -> String {
        format!("{}last_periodic_enqueue", self.prefix)
    }

    pub fn reaper_lock(&self) -> String {
        format!("{}reaper_lock", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_gets_trailing_colon() {
        let k = Keys::new("myapp");
        assert_eq!(k.jobs_list("email"), "myapp:jobs:email");
    }

    #[test]
    fn prefix_with_colon_is_untouched() {
        let k = Keys::new("myapp:");
        assert_eq!(k.jobs_list("email"), "myapp:jobs:email");
    }

    #[test]
    fn empty_prefix_is_allowed() {
        let k = Keys::new("");
        assert_eq!(k.known_jobs(), "known_jobs");
    }

    #[test]
    fn inprogress_is_scoped_per_pool() {
        let k = Keys::new("ns");
        assert_eq!(
            k.inprogress_list("email", "pool1"),
            "ns:jobs:email:pool1:inprogress"
        );
    }
}
