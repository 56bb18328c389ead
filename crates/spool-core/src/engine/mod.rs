//! Engine port: the operations a queue service exposes.
//!
//! The trait is the seam between storage backends. [`RedisEngine`] is the
//! production variant; [`MemoryEngine`] keeps the same observable semantics
//! in-process and is what the property tests and the HTTP tests run against.

pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::domain::{Job, JobId, MAX_BODY_SIZE};
use crate::error::{EngineError, Result};

pub use self::memory::MemoryEngine;
pub use self::redis::RedisEngine;

/// Extra seconds a delayed body outlives its delay, so the pumper cannot
/// fire an event whose body already expired under ordinary clock skew.
/// Sized to the default lease (60s) plus slack.
pub const POOL_TTL_GRACE: u32 = 65;

#[async_trait]
pub trait Engine: Send + Sync {
    /// Store a job and make it deliverable after `delay_seconds`.
    ///
    /// Rejects oversized bodies, `tries == 0`, and a finite TTL shorter than
    /// the delay.
    async fn publish(
        &self,
        namespace: &str,
        queue: &str,
        body: Vec<u8>,
        ttl_seconds: u32,
        delay_seconds: u32,
        tries: u16,
    ) -> Result<JobId>;

    /// Claim one job with a `ttr_seconds` lease. `timeout_seconds == 0` is a
    /// single non-blocking attempt; otherwise blocks up to the timeout.
    /// `Ok(None)` means no job became available in time.
    async fn consume(
        &self,
        namespace: &str,
        queue: &str,
        ttr_seconds: u32,
        timeout_seconds: u32,
    ) -> Result<Option<Job>>;

    /// Claim one job from whichever of `queues` yields first. Blocking only:
    /// `timeout_seconds` must be nonzero.
    async fn consume_multi(
        &self,
        namespace: &str,
        queues: &[String],
        ttr_seconds: u32,
        timeout_seconds: u32,
    ) -> Result<Option<Job>>;

    /// Acknowledge (or abandon) a job: drop its body and cancel any pending
    /// timer event. Idempotent; the ready list is not scanned, a stale entry
    /// there turns into a skipped ghost on the consume path.
    async fn delete(&self, namespace: &str, queue: &str, job_id: &str) -> Result<()>;

    /// Read a job without claiming it: the ready head when `job_id` is
    /// `None`, a specific body otherwise.
    async fn peek(&self, namespace: &str, queue: &str, job_id: Option<&str>) -> Result<Job>;

    /// Number of jobs currently ready (excludes delayed and in-flight).
    async fn size(&self, namespace: &str, queue: &str) -> Result<i64>;

    /// Dead-letter size and head job ID, if any.
    async fn peek_dead_letter(&self, namespace: &str, queue: &str) -> Result<(i64, Option<String>)>;

    /// Move up to `limit` dead-lettered jobs back to the ready queue with a
    /// single try and a refreshed body TTL. Returns how many moved.
    async fn respawn_dead_letter(
        &self,
        namespace: &str,
        queue: &str,
        limit: i64,
        ttl_seconds: i64,
    ) -> Result<i64>;

    /// Discard up to `limit` dead-lettered jobs and their bodies. Returns how
    /// many were discarded.
    async fn delete_dead_letter(&self, namespace: &str, queue: &str, limit: i64) -> Result<i64>;

    /// Erase the queue: ready entries, dead letters, pending timer events,
    /// and every body. Returns the number of jobs erased.
    async fn destroy(&self, namespace: &str, queue: &str) -> Result<i64>;
}

/// Publish-time validation shared by every backend.
pub(crate) fn validate_publish(
    body_len: usize,
    ttl_seconds: u32,
    delay_seconds: u32,
    tries: u16,
) -> Result<()> {
    if body_len > MAX_BODY_SIZE {
        return Err(EngineError::invalid("body larger than 64 KiB"));
    }
    if tries == 0 {
        return Err(EngineError::invalid(
            "tries must be at least 1, or the job could never be consumed",
        ));
    }
    // ttl == 0 means forever, which is longer than any delay.
    if ttl_seconds > 0 && ttl_seconds < delay_seconds {
        return Err(EngineError::invalid("ttl is shorter than delay"));
    }
    Ok(())
}

/// TTL actually written for the body: a delayed job's body must survive at
/// least until its fire time plus grace. An undelayed job expires exactly at
/// its TTL.
pub(crate) fn effective_ttl(ttl_seconds: u32, delay_seconds: u32) -> u32 {
    if ttl_seconds == 0 || delay_seconds == 0 {
        return ttl_seconds;
    }
    ttl_seconds.max(delay_seconds.saturating_add(POOL_TTL_GRACE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_validation_boundaries() {
        assert!(validate_publish(0, 0, 0, 1).is_ok());
        assert!(validate_publish(MAX_BODY_SIZE, 0, 0, 1).is_ok());
        assert!(validate_publish(MAX_BODY_SIZE + 1, 0, 0, 1).is_err());
        assert!(validate_publish(1, 0, 0, 0).is_err());
        assert!(validate_publish(1, 5, 10, 1).is_err());
        // ttl == 0 outlives any delay.
        assert!(validate_publish(1, 0, 10, 1).is_ok());
    }

    #[test]
    fn effective_ttl_covers_the_delay() {
        assert_eq!(effective_ttl(0, 100), 0);
        assert_eq!(effective_ttl(5, 0), 5);
        assert_eq!(effective_ttl(3600, 10), 3600);
        assert_eq!(effective_ttl(30, 40), 40 + POOL_TTL_GRACE);
    }
}
