use lazy_static::lazy_static;

use crate::error::Error;

// Subtract a dead pool's contribution from every job type's lock counter,
// clamping at zero if the counter would otherwise go negative.
// KEYS, repeated per job type:
//  2n+1. lock counter
//  2n+2. lock_info hash
// ARGV:
//  1. dead pool id
const REAP_STALE_LOCKS_SCRIPT: &str = r##"
local n = #KEYS / 2
local clamped = {}
for i = 0, n - 1 do
    local lock = KEYS[i * 2 + 1]
    local lockInfo = KEYS[i * 2 + 2]

    local contribution = redis.call("HGET", lockInfo, ARGV[1])
    if contribution then
        redis.call("HDEL", lockInfo, ARGV[1])
        local newVal = redis.call("DECRBY", lock, tonumber(contribution))
        if tonumber(newVal) < 0 then
            redis.call("SET", lock, 0)
            table.insert(clamped, lock)
        end
    end
end
return clamped
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(REAP_STALE_LOCKS_SCRIPT);
}

pub struct ReapStaleLocksScript(&'static redis::Script);

impl ReapStaleLocksScript {
    pub fn new() -> Self {
        ReapStaleLocksScript(&SCRIPT)
    }

    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        lock_lock_info_pairs: &[(&str, &str)],
        dead_pool_id: &str,
    ) -> Result<Vec<String>, Error> {
        let mut invocation = self.0.prepare_invoke();
        for (lock, lock_info) in lock_lock_info_pairs {
            invocation.key(*lock).key(*lock_info);
        }
        invocation.arg(dead_pool_id);

        let clamped: Vec<String> = invocation.invoke_async(&mut **conn).await?;
        Ok(clamped)
    }
}

impl Default for ReapStaleLocksScript {
    fn default() -> Self {
        Self::new()
    }
}
