//! Ready queue: the per-queue FIFO of deliverable jobs.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, error};

use super::timer::Timer;
use crate::codec;
use crate::domain::{Job, QueueName};
use crate::error::{EngineError, Result};

/// FIFO list of `(remaining_tries, job_id)` entries: producers LPUSH, the
/// pumper LPUSHes fired events, consumers pop the opposite end.
pub struct ReadyQueue {
    name: QueueName,
    conn: ConnectionManager,
}

impl ReadyQueue {
    pub fn new(name: QueueName, conn: ConnectionManager) -> Self {
        Self { name, conn }
    }

    /// Append a job. Pushing with zero tries is a no-op, the entry could
    /// never be delivered.
    pub async fn push(&self, job: &Job, tries: u16) -> Result<()> {
        if tries == 0 {
            return Ok(());
        }
        if job.namespace != self.name.namespace() || job.queue != self.name.queue() {
            return Err(EngineError::WrongQueue);
        }
        let entry = codec::pack_entry(tries, &job.id.to_string());
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(self.name.ready_key(), entry).await?;
        Ok(())
    }

    /// Number of in-queue jobs.
    pub async fn size(&self) -> Result<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(self.name.ready_key()).await?)
    }

    /// Job ID at the consumption end, without removing it.
    pub async fn peek(&self) -> Result<String> {
        let mut conn = self.conn.clone();
        let entry: Option<Vec<u8>> = conn.lindex(self.name.ready_key(), -1).await?;
        match entry {
            Some(entry) => {
                let (_, job_id) = codec::unpack_entry(&entry)?;
                Ok(job_id)
            }
            None => Err(EngineError::NotFound),
        }
    }
}

/// Pop one entry from any of `names` and lease it for `ttr_seconds`.
///
/// With `timeout_seconds > 0` this is a blocking multi-key pop on a
/// dedicated connection (a block on the shared multiplexed connection would
/// stall every other command behind it). With zero timeout it is a single
/// non-blocking pop, which only makes sense for exactly one queue.
///
/// The claimed entry's tries are decremented and the remainder is registered
/// with the timer at `now + ttr`. That pair of steps is not store-atomic: a
/// crash in between loses the lease and the job sits in the pool until its
/// TTL, the accepted cost of at-least-once delivery.
pub async fn poll_queues(
    client: &redis::Client,
    conn: &ConnectionManager,
    timer: &Timer,
    names: &[QueueName],
    timeout_seconds: f64,
    ttr_seconds: u32,
) -> Result<Option<(QueueName, String)>> {
    let popped: Option<(String, Vec<u8>)> = if timeout_seconds > 0.0 {
        let keys: Vec<String> = names.iter().map(QueueName::ready_key).collect();
        let mut conn = client.get_multiplexed_async_connection().await?;
        conn.brpop(keys, timeout_seconds).await?
    } else {
        if names.len() != 1 {
            return Err(EngineError::invalid(
                "non-blocking pop cannot cover multiple queues",
            ));
        }
        let key = names[0].ready_key();
        let mut conn = conn.clone();
        conn.rpop::<_, Option<Vec<u8>>>(&key, None)
            .await?
            .map(|entry| (key, entry))
    };

    let Some((key, entry)) = popped else {
        debug!("no job ready");
        return Ok(None);
    };

    let name = QueueName::decode(&key)?;
    let (tries, job_id) = codec::unpack_entry(&entry)?;
    if tries == 0 {
        // The push path refuses zero-tries entries; finding one means the
        // store's data was tampered with or corrupted.
        return Err(EngineError::Corrupted("polled entry with zero tries"));
    }

    if let Err(err) = timer.add(&name, &job_id, ttr_seconds, tries - 1).await {
        error!(
            %err,
            %job_id,
            ttr = ttr_seconds,
            queue = %name,
            "failed to register lease with the timer"
        );
        return Err(err);
    }
    Ok(Some((name, job_id)))
}
