use lazy_static::lazy_static;

use crate::error::Error;

// Delete the single entry with a given job id from a scored set (retry,
// scheduled, or dead). A linear scan: these sets are expected to stay small
// relative to the ready lists, and there is no secondary index by id.
// KEYS:
//  1. sorted set
// ARGV:
//  1. job id
const DELETE_SINGLE_SCRIPT: &str = r##"
local members = redis.call("ZRANGE", KEYS[1], 0, -1)
for _, raw in ipairs(members) do
    local job = cjson.decode(raw)
    if job["id"] == ARGV[1] then
        redis.call("ZREM", KEYS[1], raw)
        return {1, raw}
    end
end
return {0, false}
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(DELETE_SINGLE_SCRIPT);
}

pub struct DeleteSingleScript(&'static redis::Script);

impl DeleteSingleScript {
    pub fn new() -> Self {
        DeleteSingleScript(&SCRIPT)
    }

    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        sorted_set: &str,
        job_id: &str,
    ) -> Result<Option<Vec<u8>>, Error> {
        let (count, raw): (i64, Option<Vec<u8>>) = self
            .0
            .key(sorted_set)
            .arg(job_id)
            .invoke_async(&mut **conn)
            .await?;
        Ok(if count > 0 { raw } else { None })
    }
}

impl Default for DeleteSingleScript {
    fn default() -> Self {
        Self::new()
    }
}
