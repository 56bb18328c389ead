//! spool-core
//!
//! Engine of a delayed/reliable task queue over a Redis-compatible store.
//! Jobs are opaque byte payloads in named queues scoped by namespace;
//! consumers claim them under a per-delivery lease (TTR), unacknowledged
//! jobs are redelivered up to their tries budget and then dead-lettered,
//! and bodies expire with a TTL.
//!
//! Module map:
//! - domain: job IDs, queue names and the key scheme, the Job type
//! - codec: the packed ready-entry / timer-member wire format
//! - engine: the Engine port plus the Redis and in-memory implementations
//! - error: crate-level error type

pub mod codec;
pub mod domain;
pub mod engine;
pub mod error;

pub use domain::{Job, JobId, QueueName, MAX_BODY_SIZE};
pub use engine::{Engine, MemoryEngine, RedisEngine};
pub use error::{EngineError, Result};
