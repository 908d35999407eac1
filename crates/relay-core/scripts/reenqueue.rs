use lazy_static::lazy_static;

use crate::error::Error;

// Move one job back from a pool's in-progress list to its ready list,
// undoing the concurrency lock it held. Used by the dead-pool reaper to
// reclaim work a crashed pool never released.
// KEYS, repeated per job type owned by the dead pool:
//  4n+1. in-progress list (dead pool)
//  4n+2. ready list
//  4n+3. lock counter
//  4n+4. lock_info hash
// ARGV:
//  1. dead pool id
const REENQUEUE_SCRIPT: &str = r##"
local n = #KEYS / 4
for i = 0, n - 1 do
    local inProg = KEYS[i * 4 + 1]
    local jobsList = KEYS[i * 4 + 2]
    local lock = KEYS[i * 4 + 3]
    local lockInfo = KEYS[i * 4 + 4]

    local job = redis.call("RPOPLPUSH", inProg, jobsList)
    if job then
        redis.call("DECR", lock)
        redis.call("HINCRBY", lockInfo, ARGV[1], -1)
        return {job, inProg, jobsList}
    end
end
return nil
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(REENQUEUE_SCRIPT);
}

pub struct ReenqueueCandidate<'a> {
    pub inprogress_list: &'a str,
    pub jobs_list: &'a str,
    pub lock: &'a str,
    pub lock_info: &'a str,
}

pub type ReenqueueResult = (Vec<u8>, String, String);

pub struct ReenqueueScript(&'static redis::Script);

impl ReenqueueScript {
    pub fn new() -> Self {
        ReenqueueScript(&SCRIPT)
    }

    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        candidates: &[ReenqueueCandidate<'_>],
        dead_pool_id: &str,
    ) -> Result<Option<ReenqueueResult>, Error> {
        let mut invocation = self.0.prepare_invoke();
        for c in candidates {
            invocation
                .key(c.inprogress_list)
                .key(c.jobs_list)
                .key(c.lock)
                .key(c.lock_info);
        }
        invocation.arg(dead_pool_id);

        let result: Option<ReenqueueResult> = invocation.invoke_async(&mut **conn).await?;
        Ok(result)
    }
}

impl Default for ReenqueueScript {
    fn default() -> Self {
        Self::new()
    }
}
