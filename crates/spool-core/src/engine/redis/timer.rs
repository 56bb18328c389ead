//! Timer: the ordered set of future firings, and the pumper that drains it.
//!
//! Two producers feed the timer (delayed publishes and in-flight leases),
//! and the pumper is its only consumer. Consumers of the service never read
//! the timer directly.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::scripts::Scripts;
use super::unix_now;
use crate::codec;
use crate::domain::{QueueName, TIMER_INDEX_KEY};
use crate::error::Result;

/// Events moved per pump script call; the pumper loops while full batches
/// keep coming back.
const PUMP_BATCH: i64 = 100;

#[derive(Clone)]
pub struct Timer {
    conn: ConnectionManager,
    scripts: Arc<Scripts>,
}

impl Timer {
    pub fn new(conn: ConnectionManager, scripts: Arc<Scripts>) -> Self {
        Self { conn, scripts }
    }

    /// Schedule one firing at `now + delay_seconds`. An event whose
    /// `remaining_tries` is already zero goes to the dead letter when it
    /// fires.
    pub async fn add(
        &self,
        name: &QueueName,
        job_id: &str,
        delay_seconds: u32,
        remaining_tries: u16,
    ) -> Result<()> {
        let entry = codec::pack_entry(remaining_tries, job_id);
        let fire_at = unix_now() + u64::from(delay_seconds);
        let mut conn = self.conn.clone();
        // ZADD and the index registration land together or not at all, so
        // the pumper can never miss a populated timer set.
        redis::pipe()
            .atomic()
            .zadd(name.timer_key(), entry, fire_at)
            .sadd(TIMER_INDEX_KEY, name.timer_index_member())
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Cancel the pending event for one job, if any.
    pub async fn remove(&self, name: &QueueName, job_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _removed: i64 = self
            .scripts
            .timer_remove
            .key(name.timer_key())
            .arg(job_id)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// Background worker that materializes due timer events into ready queues
/// (or the dead letter). Single-writer: there is exactly one pumper per
/// engine, and it is the only mover out of the timer.
pub struct Pumper {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl Pumper {
    pub fn spawn(conn: ConnectionManager, scripts: Arc<Scripts>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(pump_loop(conn, scripts, shutdown_rx));
        Self { shutdown_tx, join }
    }

    /// Stop after the in-flight tick, if any, completes.
    pub async fn shutdown(self) {
        // ignore send error: the task may have already exited
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}

async fn pump_loop(
    mut conn: ConnectionManager,
    scripts: Arc<Scripts>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // Err means the sender side is gone; stop either way.
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                match pump_once(&mut conn, &scripts).await {
                    Ok(moved) if moved > 0 => debug!(moved, "pumped due timer events"),
                    Ok(_) => {}
                    // Events stay in the timer set until a script moves
                    // them; the next tick retries.
                    Err(err) => warn!(%err, "pump tick failed"),
                }
            }
        }
    }
}

/// One tick: walk the index of queues with pending events and run the pump
/// script per queue until its due backlog is drained.
async fn pump_once(conn: &mut ConnectionManager, scripts: &Scripts) -> Result<i64> {
    let members: Vec<String> = conn.smembers(TIMER_INDEX_KEY).await?;
    let now = unix_now();
    let mut moved = 0;

    for member in members {
        let name = match member
            .split_once('/')
            .and_then(|(ns, q)| QueueName::new(ns, q).ok())
        {
            Some(name) => name,
            None => {
                warn!(%member, "dropping malformed timer index entry");
                let _: i64 = conn.srem(TIMER_INDEX_KEY, &member).await?;
                continue;
            }
        };
        loop {
            let batch: i64 = scripts
                .pump
                .key(name.timer_key())
                .key(name.ready_key())
                .key(name.deadletter_key())
                .key(TIMER_INDEX_KEY)
                .arg(now)
                .arg(PUMP_BATCH)
                .arg(&member)
                .invoke_async(conn)
                .await?;
            moved += batch;
            if batch < PUMP_BATCH {
                break;
            }
        }
    }
    Ok(moved)
}
