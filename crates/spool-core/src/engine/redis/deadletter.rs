//! Dead letter: per-queue sink of jobs whose tries ran out.

use std::sync::Arc;

use redis::aio::ConnectionManager;

use super::scripts::Scripts;
use crate::domain::QueueName;
use crate::error::Result;

/// Entries drained per script call when discarding.
pub(super) const DRAIN_BATCH: i64 = 100;

pub struct DeadLetter {
    name: QueueName,
    conn: ConnectionManager,
    scripts: Arc<Scripts>,
}

impl DeadLetter {
    pub fn new(name: QueueName, conn: ConnectionManager, scripts: Arc<Scripts>) -> Self {
        Self {
            name,
            conn,
            scripts,
        }
    }

    /// Size and head job ID.
    pub async fn peek(&self) -> Result<(i64, Option<String>)> {
        let key = self.name.deadletter_key();
        let mut conn = self.conn.clone();
        let (size, head): (i64, Option<String>) = redis::pipe()
            .atomic()
            .llen(&key)
            .lindex(&key, -1)
            .query_async(&mut conn)
            .await?;
        Ok((size, head))
    }

    /// Move up to `limit` jobs back to the ready queue with one try and a
    /// refreshed body TTL. One script call: the pops and pushes are
    /// transactional.
    pub async fn respawn(&self, limit: i64, ttl_seconds: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = self
            .scripts
            .respawn
            .key(self.name.deadletter_key())
            .key(self.name.ready_key())
            .key(self.name.pool_prefix())
            .arg(limit)
            .arg(ttl_seconds.max(0))
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    /// Discard up to `limit` jobs and their bodies, batched; the script
    /// reports how many it processed so this can loop.
    pub async fn delete(&self, limit: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        let mut count = 0;
        while count < limit {
            let batch = DRAIN_BATCH.min(limit - count);
            let processed: i64 = self
                .scripts
                .drain
                .key(self.name.deadletter_key())
                .key(self.name.pool_prefix())
                .arg(batch)
                .arg("0")
                .invoke_async(&mut conn)
                .await?;
            count += processed;
            if processed < batch {
                break; // dead letter is empty
            }
        }
        Ok(count)
    }
}
