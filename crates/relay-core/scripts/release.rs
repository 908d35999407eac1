use lazy_static::lazy_static;

use crate::error::Error;

// Release a job claimed by a pool, decrementing its concurrency lock and
// optionally forwarding it (to retry or dead) in the same round trip.
// KEYS:
//  1. in-progress list
//  2. lock counter
//  3. lock_info hash
//  4. forward queue (retry or dead sorted set)
// ARGV:
//  1. pool id
//  2. job bytes (as claimed, to LREM out of the in-progress list)
//  3. forward flag ("1" or "0")
//  4. score for the forward queue
//  5. job bytes to forward (with fails/err/failed_at updated)
const RELEASE_SCRIPT: &str = r##"
local removed = redis.call("LREM", KEYS[1], 1, ARGV[2])
if removed > 0 then
    redis.call("DECR", KEYS[2])
    redis.call("HINCRBY", KEYS[3], ARGV[1], -1)
    if ARGV[3] == "1" then
        redis.call("ZADD", KEYS[4], ARGV[4], ARGV[5])
    end
end
return removed
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(RELEASE_SCRIPT);
}

pub struct ReleaseScript(&'static redis::Script);

impl ReleaseScript {
    pub fn new() -> Self {
        ReleaseScript(&SCRIPT)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        inprogress_list: &str,
        lock: &str,
        lock_info: &str,
        forward_queue: &str,
        pool_id: &str,
        claimed_job_bytes: &[u8],
        forward: Option<(i64, &[u8])>,
    ) -> Result<bool, Error> {
        let (score, forward_bytes): (i64, &[u8]) = forward.unwrap_or((0, b""));
        let removed: i64 = self
            .0
            .key(inprogress_list)
            .key(lock)
            .key(lock_info)
            .key(forward_queue)
            .arg(pool_id)
            .arg(claimed_job_bytes)
            .arg(if forward.is_some() { "1" } else { "0" })
            .arg(score)
            .arg(forward_bytes)
            .invoke_async(&mut **conn)
            .await?;
        Ok(removed > 0)
    }
}

impl Default for ReleaseScript {
    fn default() -> Self {
        Self::new()
    }
}
