use lazy_static::lazy_static;

use crate::error::Error;

// Correct any remaining drift between a job type's lock counter and the sum
// of its lock_info contributions, a final sweep after targeted reaping.
// KEYS, repeated per job type:
//  2n+1. lock counter
//  2n+2. lock_info hash
const REMOVE_DANGLING_LOCKS_SCRIPT: &str = r##"
local n = #KEYS / 2
local fixed = {}
for i = 0, n - 1 do
    local lock = KEYS[i * 2 + 1]
    local lockInfo = KEYS[i * 2 + 2]

    local total = 0
    local values = redis.call("HVALS", lockInfo)
    for _, v in ipairs(values) do
        total = total + tonumber(v)
    end

    local current = tonumber(redis.call("GET", lock) or "0")
    local diff = current - total
    if diff ~= 0 then
        redis.call("DECRBY", lock, diff)
        table.insert(fixed, lock)
    end
end
return fixed
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(REMOVE_DANGLING_LOCKS_SCRIPT);
}

pub struct RemoveDanglingLocksScript(&'static redis::Script);

impl RemoveDanglingLocksScript {
    pub fn new() -> Self {
        RemoveDanglingLocksScript(&SCRIPT)
    }

    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        lock_lock_info_pairs: &[(&str, &str)],
    ) -> Result<Vec<String>, Error> {
        let mut invocation = self.0.prepare_invoke();
        for (lock, lock_info) in lock_lock_info_pairs {
            invocation.key(*lock).key(*lock_info);
        }

        let fixed: Vec<String> = invocation.invoke_async(&mut **conn).await?;
        Ok(fixed)
    }
}

impl Default for RemoveDanglingLocksScript {
    fn default() -> Self {
        Self::new()
    }
}
