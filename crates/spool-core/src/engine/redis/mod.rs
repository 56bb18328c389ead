//! Redis-backed engine implementation.
//!
//! Storage layout per `(namespace, queue)`: ready list, dead-letter list,
//! timer sorted set, and one body key per job. The key scheme lives in
//! [`crate::domain::queue_name`].
//! Compound mutations run as server-side scripts ([`scripts`]); the
//! [`timer::Pumper`] is the only mover from the timer to the other facets.

mod deadletter;
mod engine;
mod pool;
mod queue;
mod scripts;
mod timer;

pub use self::engine::RedisEngine;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds; timer scores use this resolution.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
