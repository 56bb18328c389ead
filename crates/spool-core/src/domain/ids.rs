//! Job identifiers.
//!
//! A job ID must be globally unique across every `(namespace, queue)` and
//! roughly time-sortable so the head of a list is stable to peek at. ULID
//! (Universally Unique Lexicographically Sortable Identifier) gives both:
//! a millisecond timestamp in the high bits, 80 bits of entropy below it,
//! and no coordination needed between producers.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of a published job. Used as the pool key and as the payload of
/// ready-queue entries and timer events.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Ulid);

impl JobId {
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Milliseconds since this ID was minted, from the embedded timestamp.
    pub fn elapsed_ms(&self) -> u64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);
        now_ms.saturating_sub(self.0.timestamp_ms())
    }
}

impl FromStr for JobId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_str(s).map(Self)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sortable_by_generation_time() {
        let id1 = JobId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = JobId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id3 = JobId::generate();

        assert!(id1 < id2);
        assert!(id2 < id3);
    }

    #[test]
    fn display_round_trips() {
        let id = JobId::generate();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn elapsed_starts_near_zero() {
        let id = JobId::generate();
        // Generous bound; the point is that it's "now", not hours ago.
        assert!(id.elapsed_ms() < 1_000);
    }
}
