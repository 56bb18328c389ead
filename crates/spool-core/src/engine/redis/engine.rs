//! The Redis-backed engine facade.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::time::{Duration, Instant};
use tracing::debug;

use super::deadletter::{DeadLetter, DRAIN_BATCH};
use super::pool::JobPool;
use super::queue::{poll_queues, ReadyQueue};
use super::scripts::Scripts;
use super::timer::{Pumper, Timer};
use crate::domain::{Job, JobId, QueueName, TIMER_INDEX_KEY};
use crate::engine::{effective_ttl, validate_publish, Engine};
use crate::error::{EngineError, Result};

/// [`Engine`] over any store speaking the Redis protocol with list,
/// sorted-set and scripting support.
///
/// Construction preloads the script cache and spawns the pumper; call
/// [`RedisEngine::shutdown`] to stop it cleanly.
pub struct RedisEngine {
    client: redis::Client,
    conn: ConnectionManager,
    pool: JobPool,
    timer: Timer,
    scripts: Arc<Scripts>,
    pumper: Mutex<Option<Pumper>>,
}

impl RedisEngine {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        let scripts = Arc::new(Scripts::new());
        scripts.preload(&mut conn.clone()).await?;

        let pumper = Pumper::spawn(conn.clone(), Arc::clone(&scripts));
        Ok(Self {
            client,
            pool: JobPool::new(conn.clone()),
            timer: Timer::new(conn.clone(), Arc::clone(&scripts)),
            conn,
            scripts,
            pumper: Mutex::new(Some(pumper)),
        })
    }

    /// Stop the pumper. Pending timer events stay in the store and are
    /// picked up by the next engine instance.
    pub async fn shutdown(&self) {
        let pumper = self.pumper.lock().expect("pumper lock poisoned").take();
        if let Some(pumper) = pumper {
            pumper.shutdown().await;
        }
    }

    fn ready_queue(&self, name: QueueName) -> ReadyQueue {
        ReadyQueue::new(name, self.conn.clone())
    }

    fn dead_letter(&self, name: QueueName) -> DeadLetter {
        DeadLetter::new(name, self.conn.clone(), Arc::clone(&self.scripts))
    }

    async fn consume_from(
        &self,
        names: &[QueueName],
        ttr_seconds: u32,
        timeout_seconds: u32,
    ) -> Result<Option<Job>> {
        let deadline = Instant::now() + Duration::from_secs(u64::from(timeout_seconds));
        loop {
            let remaining = if timeout_seconds == 0 {
                0.0
            } else {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Ok(None);
                }
                left.as_secs_f64()
            };

            let Some((name, job_id)) =
                poll_queues(&self.client, &self.conn, &self.timer, names, remaining, ttr_seconds)
                    .await?
            else {
                return Ok(None);
            };

            match self.pool.get(&name, &job_id).await {
                Ok((body, ttl)) => {
                    let id: JobId = job_id
                        .parse()
                        .map_err(|_| EngineError::Corrupted("job id is not a ulid"))?;
                    return Ok(Some(Job {
                        namespace: name.namespace().to_string(),
                        queue: name.queue().to_string(),
                        id,
                        body,
                        ttl,
                    }));
                }
                Err(EngineError::NotFound) => {
                    // TTL beat the consumer to it; claim the next entry
                    // within the caller's timeout budget.
                    debug!(%job_id, queue = %name, "job body expired between schedule and claim");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl Engine for RedisEngine {
    async fn publish(
        &self,
        namespace: &str,
        queue: &str,
        body: Vec<u8>,
        ttl_seconds: u32,
        delay_seconds: u32,
        tries: u16,
    ) -> Result<JobId> {
        validate_publish(body.len(), ttl_seconds, delay_seconds, tries)?;
        let name = QueueName::new(namespace, queue)?;
        let job = Job {
            namespace: namespace.to_string(),
            queue: queue.to_string(),
            id: JobId::generate(),
            body,
            ttl: ttl_seconds,
        };
        self.pool
            .add(&job, effective_ttl(ttl_seconds, delay_seconds))
            .await?;

        if delay_seconds == 0 {
            self.ready_queue(name).push(&job, tries).await?;
        } else {
            self.timer
                .add(&name, &job.id.to_string(), delay_seconds, tries)
                .await?;
        }
        Ok(job.id)
    }

    async fn consume(
        &self,
        namespace: &str,
        queue: &str,
        ttr_seconds: u32,
        timeout_seconds: u32,
    ) -> Result<Option<Job>> {
        let name = QueueName::new(namespace, queue)?;
        self.consume_from(&[name], ttr_seconds, timeout_seconds).await
    }

    async fn consume_multi(
        &self,
        namespace: &str,
        queues: &[String],
        ttr_seconds: u32,
        timeout_seconds: u32,
    ) -> Result<Option<Job>> {
        if queues.is_empty() {
            return Err(EngineError::invalid("queue list must not be empty"));
        }
        if timeout_seconds == 0 {
            return Err(EngineError::invalid(
                "timeout must be nonzero to consume from multiple queues",
            ));
        }
        let names = queues
            .iter()
            .map(|queue| QueueName::new(namespace, queue))
            .collect::<Result<Vec<_>>>()?;
        self.consume_from(&names, ttr_seconds, timeout_seconds).await
    }

    async fn delete(&self, namespace: &str, queue: &str, job_id: &str) -> Result<()> {
        let name = QueueName::new(namespace, queue)?;
        self.timer.remove(&name, job_id).await?;
        self.pool.delete(&name, job_id).await
    }

    async fn peek(&self, namespace: &str, queue: &str, job_id: Option<&str>) -> Result<Job> {
        let name = QueueName::new(namespace, queue)?;
        let job_id = match job_id {
            Some(id) => id.to_string(),
            None => self.ready_queue(name.clone()).peek().await?,
        };
        let (body, ttl) = self.pool.get(&name, &job_id).await?;
        Ok(Job {
            namespace: namespace.to_string(),
            queue: queue.to_string(),
            id: job_id
                .parse()
                .map_err(|_| EngineError::Corrupted("job id is not a ulid"))?,
            body,
            ttl,
        })
    }

    async fn size(&self, namespace: &str, queue: &str) -> Result<i64> {
        let name = QueueName::new(namespace, queue)?;
        self.ready_queue(name).size().await
    }

    async fn peek_dead_letter(&self, namespace: &str, queue: &str) -> Result<(i64, Option<String>)> {
        let name = QueueName::new(namespace, queue)?;
        self.dead_letter(name).peek().await
    }

    async fn respawn_dead_letter(
        &self,
        namespace: &str,
        queue: &str,
        limit: i64,
        ttl_seconds: i64,
    ) -> Result<i64> {
        if limit <= 0 {
            return Err(EngineError::invalid("limit must be positive"));
        }
        let name = QueueName::new(namespace, queue)?;
        self.dead_letter(name).respawn(limit, ttl_seconds).await
    }

    async fn delete_dead_letter(&self, namespace: &str, queue: &str, limit: i64) -> Result<i64> {
        if limit <= 0 {
            return Err(EngineError::invalid("limit must be positive"));
        }
        let name = QueueName::new(namespace, queue)?;
        self.dead_letter(name).delete(limit).await
    }

    async fn destroy(&self, namespace: &str, queue: &str) -> Result<i64> {
        let name = QueueName::new(namespace, queue)?;
        let mut conn = self.conn.clone();
        let mut count = 0;

        // Ready entries carry the tries header, dead letters are bare IDs;
        // the same drain script handles both.
        for (key, packed) in [(name.ready_key(), "1"), (name.deadletter_key(), "0")] {
            loop {
                let processed: i64 = self
                    .scripts
                    .drain
                    .key(&key)
                    .key(name.pool_prefix())
                    .arg(DRAIN_BATCH)
                    .arg(packed)
                    .invoke_async(&mut conn)
                    .await?;
                count += processed;
                if processed < DRAIN_BATCH {
                    break;
                }
            }
        }

        // Delayed and in-flight jobs are referenced only by the timer set;
        // their bodies have to be erased through it, or a peek by ID would
        // still find them until the natural TTL.
        let timer_events: i64 = self
            .scripts
            .drain_timer
            .key(name.timer_key())
            .key(name.pool_prefix())
            .key(TIMER_INDEX_KEY)
            .arg(name.timer_index_member())
            .invoke_async(&mut conn)
            .await?;
        count += timer_events;
        Ok(count)
    }
}
