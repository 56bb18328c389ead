//! Queue naming and the store key scheme.
//!
//! Every facet of a queue lives under its own prefix:
//! - `q/{ns}/{queue}`  ready list
//! - `dl/{ns}/{queue}` dead-letter list
//! - `t/{ns}/{queue}`  timer sorted set
//! - `j/{ns}/{queue}/{job_id}` job body
//!
//! `/` is the separator, so it is banned inside namespace and queue names.
//! `,` is banned as well: it separates queue names on the consume path and a
//! queue containing one could be published to but never consumed from.

use std::fmt;

use crate::error::EngineError;

const QUEUE_PREFIX: &str = "q";
const DEADLETTER_PREFIX: &str = "dl";
const TIMER_PREFIX: &str = "t";
const POOL_PREFIX: &str = "j";

/// Registry of queues that may have pending timer events, maintained so the
/// pumper can enumerate per-queue timer sets without a SCAN. Members are
/// `{ns}/{queue}` pairs; the banned `/` keeps the key itself collision-free.
pub const TIMER_INDEX_KEY: &str = "t/_index_";

/// Two-level name of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueName {
    namespace: String,
    queue: String,
}

impl QueueName {
    pub fn new(namespace: &str, queue: &str) -> Result<Self, EngineError> {
        validate_part("namespace", namespace)?;
        validate_part("queue", queue)?;
        Ok(Self {
            namespace: namespace.to_string(),
            queue: queue.to_string(),
        })
    }

    /// Parse a ready-list key back into a queue name. Blocking pops return
    /// the key of whichever list produced the value.
    pub fn decode(key: &str) -> Result<Self, EngineError> {
        let mut parts = key.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(QUEUE_PREFIX), Some(ns), Some(q)) => Self::new(ns, q),
            _ => Err(EngineError::Corrupted("bad queue key")),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn ready_key(&self) -> String {
        format!("{QUEUE_PREFIX}/{}/{}", self.namespace, self.queue)
    }

    pub fn deadletter_key(&self) -> String {
        format!("{DEADLETTER_PREFIX}/{}/{}", self.namespace, self.queue)
    }

    pub fn timer_key(&self) -> String {
        format!("{TIMER_PREFIX}/{}/{}", self.namespace, self.queue)
    }

    /// Member stored in [`TIMER_INDEX_KEY`] for this queue.
    pub fn timer_index_member(&self) -> String {
        format!("{}/{}", self.namespace, self.queue)
    }

    pub fn pool_key(&self, job_id: &str) -> String {
        format!("{}{job_id}", self.pool_prefix())
    }

    /// Prefix of every body key for this queue, handed to scripts that derive
    /// body keys from popped entries.
    pub fn pool_prefix(&self) -> String {
        format!("{POOL_PREFIX}/{}/{}/", self.namespace, self.queue)
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ready_key())
    }
}

fn validate_part(what: &'static str, part: &str) -> Result<(), EngineError> {
    if part.is_empty() {
        return Err(EngineError::invalid(format!("{what} must not be empty")));
    }
    if part.contains('/') || part.contains(',') {
        return Err(EngineError::invalid(format!(
            "{what} must not contain '/' or ','"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_use_documented_prefixes() {
        let name = QueueName::new("acct", "emails").unwrap();
        assert_eq!(name.ready_key(), "q/acct/emails");
        assert_eq!(name.deadletter_key(), "dl/acct/emails");
        assert_eq!(name.timer_key(), "t/acct/emails");
        assert_eq!(name.pool_key("01ABC"), "j/acct/emails/01ABC");
    }

    #[test]
    fn decode_round_trips() {
        let name = QueueName::new("acct", "emails").unwrap();
        assert_eq!(QueueName::decode(&name.ready_key()).unwrap(), name);
    }

    #[test]
    fn separator_and_list_chars_are_rejected() {
        assert!(QueueName::new("a/b", "q").is_err());
        assert!(QueueName::new("ns", "a,b").is_err());
        assert!(QueueName::new("", "q").is_err());
        assert!(QueueName::new("ns", "").is_err());
    }

    #[test]
    fn decode_rejects_foreign_keys() {
        assert!(QueueName::decode("dl/ns/q").is_err());
        assert!(QueueName::decode("q/only-ns").is_err());
    }

    #[test]
    fn index_member_never_collides_with_index_key() {
        // "t/_index_" has one slash; every timer key has two.
        let name = QueueName::new("_index_", "x").unwrap();
        assert_ne!(name.timer_key(), TIMER_INDEX_KEY);
    }
}
