use lazy_static::lazy_static;

use crate::error::Error;

// Enqueue a job onto its ready list, but only if its uniqueness latch isn't
// already held.
// KEYS:
//  1. unique latch key
//  2. ready list
// ARGV:
//  1. job bytes
const ENQUEUE_UNIQUE_SCRIPT: &str = r##"
local set = redis.call("SET", KEYS[1], "1", "NX", "EX", 86400)
if not set then
    return "dup"
end
redis.call("LPUSH", KEYS[2], ARGV[1])
return "ok"
"##;

// As above, but the job lands on a scored set (used for unique periodic and
// future-dated jobs) instead of a ready list.
// KEYS:
//  1. unique latch key
//  2. scored set (scheduled)
// ARGV:
//  1. job bytes
//  2. score
const ENQUEUE_UNIQUE_IN_SCRIPT: &str = r##"
local set = redis.call("SET", KEYS[1], "1", "NX", "EX", 86400)
if not set then
    return "dup"
end
redis.call("ZADD", KEYS[2], ARGV[2], ARGV[1])
return "ok"
"##;

lazy_static! {
    static ref LIST_SCRIPT: redis::Script = redis::Script::new(ENQUEUE_UNIQUE_SCRIPT);
    static ref SET_SCRIPT: redis::Script = redis::Script::new(ENQUEUE_UNIQUE_IN_SCRIPT);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    Duplicate,
}

fn outcome(raw: String) -> EnqueueOutcome {
    match raw.as_str() {
        "ok" => EnqueueOutcome::Enqueued,
        "dup" => EnqueueOutcome::Duplicate,
        other => unreachable!("enqueue-unique script returned unexpected value {other}"),
    }
}

pub struct EnqueueUniqueScript(&'static redis::Script);

impl EnqueueUniqueScript {
    pub fn new() -> Self {
        EnqueueUniqueScript(&LIST_SCRIPT)
    }

    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        unique_key: &str,
        jobs_list: &str,
        job_bytes: &[u8],
    ) -> Result<EnqueueOutcome, Error> {
        let raw: String = self
            .0
            .key(unique_key)
            .key(jobs_list)
            .arg(job_bytes)
            .invoke_async(&mut **conn)
            .await?;
        Ok(outcome(raw))
    }
}

impl Default for EnqueueUniqueScript {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EnqueueUniqueInScript(&'static redis::Script);

impl EnqueueUniqueInScript {
    pub fn new() -> Self {
        EnqueueUniqueInScript(&SET_SCRIPT)
    }

    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        unique_key: &str,
        scored_set: &str,
        job_bytes: &[u8],
        score: i64,
    ) -> Result<EnqueueOutcome, Error> {
        let raw: String = self
            .0
            .key(unique_key)
            .key(scored_set)
            .arg(job_bytes)
            .arg(score)
            .invoke_async(&mut **conn)
            .await?;
        Ok(outcome(raw))
    }
}

impl Default for EnqueueUniqueInScript {
    fn default() -> Self {
        Self::new()
    }
}
