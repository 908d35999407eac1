use lazy_static::lazy_static;

use crate::error::Error;

// Find lock_info entries that reference a pool id no longer present in the
// worker_pools membership set, i.e. whose heartbeat hash has already
// expired away before the reaper got to it through the normal membership
// scan.
// KEYS:
//  1. worker_pools set
//  2..N. lock_info hashes to check
const GET_UNKNOWN_POOLS_SCRIPT: &str = r##"
local known = {}
local knownList = redis.call("SMEMBERS", KEYS[1])
for _, p in ipairs(knownList) do
    known[p] = true
end

local result = {}
for i = 2, #KEYS do
    local lockInfo = KEYS[i]
    local fields = redis.call("HKEYS", lockInfo)
    for _, poolId in ipairs(fields) do
        if not known[poolId] then
            table.insert(result, poolId)
            table.insert(result, lockInfo)
        end
    end
end
return result
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(GET_UNKNOWN_POOLS_SCRIPT);
}

pub struct GetUnknownPoolsScript(&'static redis::Script);

impl GetUnknownPoolsScript {
    pub fn new() -> Self {
        GetUnknownPoolsScript(&SCRIPT)
    }

    /// Returns `(pool_id, lock_info_key)` pairs for every lock_info field
    /// whose pool id is not in the worker_pools set.
    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        worker_pools: &str,
        lock_info_keys: &[&str],
    ) -> Result<Vec<(String, String)>, Error> {
        let mut invocation = self.0.prepare_invoke();
        invocation.key(worker_pools);
        for key in lock_info_keys {
            invocation.key(*key);
        }
        let flat: Vec<String> = invocation.invoke_async(&mut **conn).await?;
        Ok(flat
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect())
    }
}

impl Default for GetUnknownPoolsScript {
    fn default() -> Self {
        Self::new()
    }
}
