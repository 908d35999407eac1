use lazy_static::lazy_static;

use crate::error::Error;

// Promote the single most-due item off a retry or scheduled sorted set onto
// its ready queue, or to dead if its job type is no longer known. Periodic
// entries whose deadline has already passed are dropped instead of run.
// KEYS:
//  1. source sorted set (retry or scheduled)
//  2. dead sorted set
//  3. known_jobs set
// ARGV:
//  1. ready-list key prefix (job name is appended)
//  2. current epoch seconds
const PROMOTE_SCRIPT: &str = r##"
local items = redis.call("ZRANGEBYSCORE", KEYS[1], "-inf", ARGV[2], "LIMIT", 0, 1)
if #items == 0 then
    return nil
end

local raw = items[1]
redis.call("ZREM", KEYS[1], raw)
local job = cjson.decode(raw)

if job["d"] ~= nil and tonumber(ARGV[2]) > tonumber(job["d"]) then
    return "dropped"
end

if redis.call("SISMEMBER", KEYS[3], job["name"]) == 1 then
    job["t"] = tonumber(ARGV[2])
    redis.call("LPUSH", ARGV[1] .. job["name"], cjson.encode(job))
    return "ok"
else
    job["err"] = "unknown job when requeueing"
    redis.call("ZADD", KEYS[2], ARGV[2], cjson.encode(job))
    return "dead"
end
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(PROMOTE_SCRIPT);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteOutcome {
    Empty,
    Enqueued,
    Dropped,
    Dead,
}

pub struct PromoteScript(&'static redis::Script);

impl PromoteScript {
    pub fn new() -> Self {
        PromoteScript(&SCRIPT)
    }

    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        source_set: &str,
        dead_set: &str,
        known_jobs: &str,
        jobs_prefix: &str,
        now: i64,
    ) -> Result<PromoteOutcome, Error> {
        let result: Option<String> = self
            .0
            .key(source_set)
            .key(dead_set)
            .key(known_jobs)
            .arg(jobs_prefix)
            .arg(now)
            .invoke_async(&mut **conn)
            .await?;

        Ok(match result.as_deref() {
            None => PromoteOutcome::Empty,
            Some("ok") => PromoteOutcome::Enqueued,
            Some("dropped") => PromoteOutcome::Dropped,
            Some("dead") => PromoteOutcome::Dead,
            Some(other) => unreachable!("promote script returned unexpected value {other}"),
        })
    }
}

impl Default for PromoteScript {
    fn default() -> Self {
        Self::new()
    }
}
