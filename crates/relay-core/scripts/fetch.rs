use lazy_static::lazy_static;

use crate::error::Error;

// Dequeue the first ready job across a priority-sampled list of job types,
// enforcing the pause flag and max-concurrency cap atomically.
// KEYS, repeated per job type in sampled order:
//  6n+1. ready list
//  6n+2. in-progress list (this pool)
//  6n+3. pause flag
//  6n+4. lock counter
//  6n+5. lock_info hash
//  6n+6. max_concurrency value
// ARGV:
//  1. pool id
const FETCH_SCRIPT: &str = r##"
local n = #KEYS / 6
for i = 0, n - 1 do
    local jobsList = KEYS[i * 6 + 1]
    local inProg = KEYS[i * 6 + 2]
    local pause = KEYS[i * 6 + 3]
    local lock = KEYS[i * 6 + 4]
    local lockInfo = KEYS[i * 6 + 5]
    local maxConc = KEYS[i * 6 + 6]

    if redis.call("LLEN", jobsList) > 0 then
        local paused = redis.call("GET", pause)
        if not paused then
            local cap = tonumber(redis.call("GET", maxConc) or "0")
            local cur = tonumber(redis.call("GET", lock) or "0")
            if cap == 0 or cur < cap then
                redis.call("INCR", lock)
                redis.call("HINCRBY", lockInfo, ARGV[1], 1)
                local job = redis.call("RPOPLPUSH", jobsList, inProg)
                return {job, jobsList, inProg}
            end
        end
    end
end
return nil
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(FETCH_SCRIPT);
}

/// One job-type's key tuple, in the order the fetch script expects.
pub struct FetchCandidate<'a> {
    pub jobs_list: &'a str,
    pub inprogress_list: &'a str,
    pub paused: &'a str,
    pub lock: &'a str,
    pub lock_info: &'a str,
    pub max_concurrency: &'a str,
}

pub struct FetchScript(&'static redis::Script);

/// `(job bytes, ready-list key, in-progress-list key)` for whichever job type
/// won this fetch attempt.
pub type FetchResult = (Vec<u8>, String, String);

impl FetchScript {
    pub fn new() -> Self {
        FetchScript(&SCRIPT)
    }

    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        candidates: &[FetchCandidate<'_>],
        pool_id: &str,
    ) -> Result<Option<FetchResult>, Error> {
        let mut invocation = self.0.prepare_invoke();
        for c in candidates {
            invocation
                .key(c.jobs_list)
                .key(c.inprogress_list)
                .key(c.paused)
                .key(c.lock)
                .key(c.lock_info)
                .key(c.max_concurrency);
        }
        invocation.arg(pool_id);

        let result: Option<FetchResult> = invocation.invoke_async(&mut **conn).await?;
        Ok(result)
    }
}

impl Default for FetchScript {
    fn default() -> Self {
        Self::new()
    }
}
