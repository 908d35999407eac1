use lazy_static::lazy_static;

use crate::error::Error;

// Resurrect one dead job, clearing its failure history, back onto its ready
// queue.
// KEYS:
//  1. dead sorted set
// ARGV:
//  1. job id
//  2. ready-list key prefix
//  3. current epoch seconds
const REQUEUE_SINGLE_DEAD_SCRIPT: &str = r##"
local members = redis.call("ZRANGE", KEYS[1], 0, -1)
for _, raw in ipairs(members) do
    local job = cjson.decode(raw)
    if job["id"] == ARGV[1] then
        redis.call("ZREM", KEYS[1], raw)
        job["fails"] = 0
        job["err"] = nil
        job["failed_at"] = nil
        job["t"] = tonumber(ARGV[3])
        redis.call("LPUSH", ARGV[2] .. job["name"], cjson.encode(job))
        return 1
    end
end
return 0
"##;

// Resurrect up to `limit` dead jobs in one pass, oldest first.
// KEYS:
//  1. dead sorted set
// ARGV:
//  1. ready-list key prefix
//  2. current epoch seconds
//  3. limit
const REQUEUE_ALL_DEAD_SCRIPT: &str = r##"
local members = redis.call("ZRANGE", KEYS[1], 0, tonumber(ARGV[3]) - 1)
local count = 0
for _, raw in ipairs(members) do
    redis.call("ZREM", KEYS[1], raw)
    local job = cjson.decode(raw)
    job["fails"] = 0
    job["err"] = nil
    job["failed_at"] = nil
    job["t"] = tonumber(ARGV[2])
    redis.call("LPUSH", ARGV[1] .. job["name"], cjson.encode(job))
    count = count + 1
end
return count
"##;

lazy_static! {
    static ref SINGLE_SCRIPT: redis::Script = redis::Script::new(REQUEUE_SINGLE_DEAD_SCRIPT);
    static ref ALL_SCRIPT: redis::Script = redis::Script::new(REQUEUE_ALL_DEAD_SCRIPT);
}

pub struct RequeueSingleDeadScript(&'static redis::Script);

impl RequeueSingleDeadScript {
    pub fn new() -> Self {
        RequeueSingleDeadScript(&SINGLE_SCRIPT)
    }

    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        dead_set: &str,
        job_id: &str,
        jobs_prefix: &str,
        now: i64,
    ) -> Result<bool, Error> {
        let requeued: i64 = self
            .0
            .key(dead_set)
            .arg(job_id)
            .arg(jobs_prefix)
            .arg(now)
            .invoke_async(&mut **conn)
            .await?;
        Ok(requeued > 0)
    }
}

impl Default for RequeueSingleDeadScript {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RequeueAllDeadScript(&'static redis::Script);

impl RequeueAllDeadScript {
    pub fn new() -> Self {
        RequeueAllDeadScript(&ALL_SCRIPT)
    }

    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        dead_set: &str,
        jobs_prefix: &str,
        now: i64,
        limit: i64,
    ) -> Result<i64, Error> {
        let requeued: i64 = self
            .0
            .key(dead_set)
            .arg(jobs_prefix)
            .arg(now)
            .arg(limit)
            .invoke_async(&mut **conn)
            .await?;
        Ok(requeued)
    }
}

impl Default for RequeueAllDeadScript {
    fn default() -> Self {
        Self::new()
    }
}
