//! Server-side Lua scripts.
//!
//! Every multi-step mutation that must be atomic lives here as a single
//! script: the pump step (due pop + downstream push), timer cancellation,
//! list and timer-set draining with body deletion, and dead-letter respawn.
//! Entries are
//! read and written with Redis' bundled `struct` library; `"HHc0"` is the
//! Lua-side spelling of the codec in [`crate::codec`].
//!
//! Scripts are SCRIPT LOADed once at engine construction. Dispatch goes
//! through [`redis::Script`], which calls EVALSHA and, on a NOSCRIPT reply
//! (script cache flushed or a failover to a cold replica), re-sends the
//! source and retries the call once.

use redis::aio::ConnectionManager;
use redis::Script;

use crate::error::Result;

/// Moves every due event of one queue's timer set to the ready list (tries
/// left) or the dead letter (tries spent), then drops the queue from the
/// pumper index once its set is empty.
///
/// KEYS: timer set, ready list, dead-letter list, index set.
/// ARGV: now (unix seconds), batch limit, index member.
/// Returns the number of events moved.
const PUMP: &str = r#"
local timer_key = KEYS[1]
local ready_key = KEYS[2]
local deadletter_key = KEYS[3]
local index_key = KEYS[4]
local now = ARGV[1]
local limit = tonumber(ARGV[2])
local index_member = ARGV[3]

local due = redis.call('ZRANGEBYSCORE', timer_key, 0, now, 'LIMIT', 0, limit)
for _, entry in ipairs(due) do
    local tries, job_id = struct.unpack('HHc0', entry)
    if tries > 0 then
        redis.call('LPUSH', ready_key, entry)
    else
        redis.call('LPUSH', deadletter_key, job_id)
    end
    redis.call('ZREM', timer_key, entry)
end
if redis.call('ZCARD', timer_key) == 0 then
    redis.call('SREM', index_key, index_member)
end
return #due
"#;

/// Cancels the pending event of one job. Members embed the remaining tries,
/// so cancellation by job ID has to scan the (per-queue, so small) set.
///
/// KEYS: timer set. ARGV: job ID. Returns removed count (0 or 1).
const TIMER_REMOVE: &str = r#"
local timer_key = KEYS[1]
local job_id = ARGV[1]

local members = redis.call('ZRANGE', timer_key, 0, -1)
for _, entry in ipairs(members) do
    local tries, id = struct.unpack('HHc0', entry)
    if id == job_id then
        return redis.call('ZREM', timer_key, entry)
    end
end
return 0
"#;

/// Pops up to `limit` entries from the consumption end of a list and deletes
/// each entry's pool body. The ready list and the dead letter share this
/// script; they only differ in whether entries carry the tries header.
///
/// KEYS: list, pool prefix. ARGV: limit, packed flag ('1' for ready-list
/// entries, '0' for bare dead-letter IDs). Returns the processed count.
const DRAIN: &str = r#"
local list_key = KEYS[1]
local pool_prefix = KEYS[2]
local limit = tonumber(ARGV[1])
local packed = ARGV[2] == '1'

local count = 0
for i = 1, limit do
    local entry = redis.call('RPOP', list_key)
    if not entry then
        break
    end
    local job_id = entry
    if packed then
        local tries, id = struct.unpack('HHc0', entry)
        job_id = id
    end
    redis.call('DEL', pool_prefix .. job_id)
    count = count + 1
end
return count
"#;

/// Erases one queue's timer set and the body of every job it references.
/// Delayed jobs and in-flight leases hold their only reference here, so a
/// destroy that skipped them would leave their bodies peekable until the
/// natural TTL.
///
/// KEYS: timer set, pool prefix, index set. ARGV: index member.
/// Returns the number of events erased.
const DRAIN_TIMER: &str = r#"
local timer_key = KEYS[1]
local pool_prefix = KEYS[2]
local index_key = KEYS[3]
local index_member = ARGV[1]

local members = redis.call('ZRANGE', timer_key, 0, -1)
for _, entry in ipairs(members) do
    local tries, job_id = struct.unpack('HHc0', entry)
    redis.call('DEL', pool_prefix .. job_id)
end
redis.call('DEL', timer_key)
redis.call('SREM', index_key, index_member)
return #members
"#;

/// Pops up to `limit` IDs from the dead-letter head and re-publishes each to
/// the tail of the ready list with a single try, refreshing the body TTL.
///
/// KEYS: dead-letter list, ready list, pool prefix. ARGV: limit, ttl
/// (0 clears the expiry). Returns the respawned count.
const RESPAWN: &str = r#"
local deadletter_key = KEYS[1]
local ready_key = KEYS[2]
local pool_prefix = KEYS[3]
local limit = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])

local count = 0
for i = 1, limit do
    local job_id = redis.call('RPOP', deadletter_key)
    if not job_id then
        break
    end
    if ttl > 0 then
        redis.call('EXPIRE', pool_prefix .. job_id, ttl)
    else
        redis.call('PERSIST', pool_prefix .. job_id)
    end
    redis.call('LPUSH', ready_key, struct.pack('HHc0', 1, #job_id, job_id))
    count = count + 1
end
return count
"#;

pub struct Scripts {
    pub pump: Script,
    pub timer_remove: Script,
    pub drain: Script,
    pub drain_timer: Script,
    pub respawn: Script,
}

impl Scripts {
    pub fn new() -> Self {
        Self {
            pump: Script::new(PUMP),
            timer_remove: Script::new(TIMER_REMOVE),
            drain: Script::new(DRAIN),
            drain_timer: Script::new(DRAIN_TIMER),
            respawn: Script::new(RESPAWN),
        }
    }

    /// Warm the store's script cache so the common path is a bare EVALSHA.
    pub async fn preload(&self, conn: &mut ConnectionManager) -> Result<()> {
        for source in [PUMP, TIMER_REMOVE, DRAIN, DRAIN_TIMER, RESPAWN] {
            let _sha: String = redis::cmd("SCRIPT")
                .arg("LOAD")
                .arg(source)
                .query_async(conn)
                .await?;
        }
        Ok(())
    }
}

impl Default for Scripts {
    fn default() -> Self {
        Self::new()
    }
}
