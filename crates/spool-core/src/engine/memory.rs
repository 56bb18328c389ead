//! In-memory engine implementation.
//!
//! Same observable semantics as the Redis engine, one process, no store.
//! There is no background pumper: due timer events are promoted whenever the
//! queue is touched, which is indistinguishable from a once-per-second pump
//! to any caller. Time goes through `tokio::time` so tests can run the
//! delay/TTR/TTL clauses under a paused clock.

use std::collections::{BinaryHeap, HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::domain::{Job, JobId, QueueName};
use crate::engine::{effective_ttl, validate_publish, Engine};
use crate::error::{EngineError, Result};

/// Pending firing: a delayed publish or an in-flight lease.
///
/// Reverse ordering so `BinaryHeap` acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct TimerEvent {
    fire_at: Instant,
    tries: u16,
    job_id: String,
}

impl PartialOrd for TimerEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.fire_at.cmp(&self.fire_at)
    }
}

#[derive(Debug)]
struct PoolEntry {
    body: Vec<u8>,
    /// `None` means the body never expires (ttl 0).
    expire_at: Option<Instant>,
}

impl PoolEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expire_at.is_some_and(|at| at <= now)
    }

    fn remaining_ttl(&self, now: Instant) -> u32 {
        match self.expire_at {
            Some(at) => at.saturating_duration_since(now).as_secs() as u32,
            None => 0,
        }
    }
}

/// Storage facets of one `(namespace, queue)`.
#[derive(Debug, Default)]
struct QueueState {
    /// Ready FIFO of `(remaining_tries, job_id)`; producers append at the
    /// back, consumers pop the front.
    ready: VecDeque<(u16, String)>,
    deadletter: VecDeque<String>,
    timer: BinaryHeap<TimerEvent>,
    pool: HashMap<String, PoolEntry>,
}

impl QueueState {
    /// Move every due timer event to its destination; tries already spent
    /// route the job to the dead letter.
    fn promote_due(&mut self, now: Instant) {
        while let Some(top) = self.timer.peek_mut() {
            if top.fire_at > now {
                break; // heap is sorted, nothing else is due
            }
            let event = std::collections::binary_heap::PeekMut::pop(top);
            if event.tries > 0 {
                self.ready.push_back((event.tries, event.job_id));
            } else {
                self.deadletter.push_back(event.job_id);
            }
        }
    }

    fn next_fire(&self) -> Option<Instant> {
        self.timer.peek().map(|e| e.fire_at)
    }
}

/// In-memory [`Engine`].
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: Mutex<HashMap<QueueName, QueueState>>,
    notify: Notify,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop ready entries until one still has a live body; registers the TTR
    /// lease for the claimed job.
    fn try_claim(
        qs: &mut QueueState,
        name: &QueueName,
        ttr_seconds: u32,
        now: Instant,
    ) -> Result<Option<Job>> {
        while let Some((tries, job_id)) = qs.ready.pop_front() {
            if tries == 0 {
                return Err(EngineError::Corrupted("ready entry with zero tries"));
            }
            qs.timer.push(TimerEvent {
                fire_at: now + Duration::from_secs(u64::from(ttr_seconds)),
                tries: tries - 1,
                job_id: job_id.clone(),
            });
            let Some(entry) = qs.pool.get(&job_id) else {
                debug!(%job_id, "skipping ghost entry, body already deleted");
                continue;
            };
            if entry.is_expired(now) {
                debug!(%job_id, "skipping ghost entry, body expired");
                qs.pool.remove(&job_id);
                continue;
            }
            let id: JobId = job_id
                .parse()
                .map_err(|_| EngineError::Corrupted("job id is not a ulid"))?;
            return Ok(Some(Job {
                namespace: name.namespace().to_string(),
                queue: name.queue().to_string(),
                id,
                body: entry.body.clone(),
                ttl: entry.remaining_ttl(now),
            }));
        }
        Ok(None)
    }

    async fn consume_from(
        &self,
        names: &[QueueName],
        ttr_seconds: u32,
        timeout_seconds: u32,
    ) -> Result<Option<Job>> {
        let deadline = (timeout_seconds > 0)
            .then(|| Instant::now() + Duration::from_secs(u64::from(timeout_seconds)));

        loop {
            // Arm the wakeup before checking state: a push that lands between
            // the check and the await leaves a stored permit.
            let notified = self.notify.notified();

            let next_fire = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let mut next_fire: Option<Instant> = None;
                for name in names {
                    let qs = state.entry(name.clone()).or_default();
                    qs.promote_due(now);
                    if let Some(job) = Self::try_claim(qs, name, ttr_seconds, now)? {
                        return Ok(Some(job));
                    }
                    next_fire = match (next_fire, qs.next_fire()) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                }
                next_fire
            };

            let Some(deadline) = deadline else {
                return Ok(None); // non-blocking attempt, nothing ready
            };
            if Instant::now() >= deadline {
                return Ok(None);
            }

            let wake_at = next_fire.map_or(deadline, |f| f.min(deadline));
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }
}

#[async_trait]
impl Engine for MemoryEngine {
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
        let id = JobId::generate();
        let now = Instant::now();
        let ttl = effective_ttl(ttl_seconds, delay_seconds);

        let mut state = self.state.lock().await;
        let qs = state.entry(name).or_default();
        qs.pool.insert(
            id.to_string(),
            PoolEntry {
                body,
                expire_at: (ttl > 0).then(|| now + Duration::from_secs(u64::from(ttl))),
            },
        );
        if delay_seconds == 0 {
            qs.ready.push_back((tries, id.to_string()));
        } else {
            qs.timer.push(TimerEvent {
                fire_at: now + Duration::from_secs(u64::from(delay_seconds)),
                tries,
                job_id: id.to_string(),
            });
        }
        drop(state);
        self.notify.notify_one();
        Ok(id)
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
        let mut state = self.state.lock().await;
        if let Some(qs) = state.get_mut(&name) {
            qs.pool.remove(job_id);
            if qs.timer.iter().any(|e| e.job_id == job_id) {
                let kept: Vec<_> = qs.timer.drain().filter(|e| e.job_id != job_id).collect();
                qs.timer = kept.into_iter().collect();
            }
        }
        Ok(())
    }

    async fn peek(&self, namespace: &str, queue: &str, job_id: Option<&str>) -> Result<Job> {
        let name = QueueName::new(namespace, queue)?;
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let qs = state.get_mut(&name).ok_or(EngineError::NotFound)?;
        qs.promote_due(now);

        let job_id = match job_id {
            Some(id) => id.to_string(),
            None => qs.ready.front().ok_or(EngineError::NotFound)?.1.clone(),
        };
        if qs.pool.get(&job_id).is_some_and(|e| e.is_expired(now)) {
            qs.pool.remove(&job_id);
        }
        let entry = qs.pool.get(&job_id).ok_or(EngineError::NotFound)?;
        Ok(Job {
            namespace: name.namespace().to_string(),
            queue: name.queue().to_string(),
            id: job_id
                .parse()
                .map_err(|_| EngineError::Corrupted("job id is not a ulid"))?,
            body: entry.body.clone(),
            ttl: entry.remaining_ttl(now),
        })
    }

    async fn size(&self, namespace: &str, queue: &str) -> Result<i64> {
        let name = QueueName::new(namespace, queue)?;
        let mut state = self.state.lock().await;
        Ok(state.get_mut(&name).map_or(0, |qs| {
            qs.promote_due(Instant::now());
            qs.ready.len() as i64
        }))
    }

    async fn peek_dead_letter(&self, namespace: &str, queue: &str) -> Result<(i64, Option<String>)> {
        let name = QueueName::new(namespace, queue)?;
        let mut state = self.state.lock().await;
        Ok(state.get_mut(&name).map_or((0, None), |qs| {
            qs.promote_due(Instant::now());
            (qs.deadletter.len() as i64, qs.deadletter.front().cloned())
        }))
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
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let Some(qs) = state.get_mut(&name) else {
            return Ok(0);
        };
        qs.promote_due(now);

        let mut count = 0;
        while count < limit {
            let Some(job_id) = qs.deadletter.pop_front() else {
                break;
            };
            if let Some(entry) = qs.pool.get_mut(&job_id) {
                entry.expire_at =
                    (ttl_seconds > 0).then(|| now + Duration::from_secs(ttl_seconds as u64));
            }
            qs.ready.push_back((1, job_id));
            count += 1;
        }
        drop(state);
        if count > 0 {
            self.notify.notify_one();
        }
        Ok(count)
    }

    async fn delete_dead_letter(&self, namespace: &str, queue: &str, limit: i64) -> Result<i64> {
        if limit <= 0 {
            return Err(EngineError::invalid("limit must be positive"));
        }
        let name = QueueName::new(namespace, queue)?;
        let mut state = self.state.lock().await;
        let Some(qs) = state.get_mut(&name) else {
            return Ok(0);
        };
        qs.promote_due(Instant::now());

        let mut count = 0;
        while count < limit {
            let Some(job_id) = qs.deadletter.pop_front() else {
                break;
            };
            qs.pool.remove(&job_id);
            count += 1;
        }
        Ok(count)
    }

    async fn destroy(&self, namespace: &str, queue: &str) -> Result<i64> {
        let name = QueueName::new(namespace, queue)?;
        let mut state = self.state.lock().await;
        // Dropping the whole QueueState wipes every facet at once, bodies of
        // delayed and in-flight jobs included.
        Ok(state.remove(&name).map_or(0, |qs| {
            (qs.ready.len() + qs.deadletter.len() + qs.timer.len()) as i64
        }))
    }
}
