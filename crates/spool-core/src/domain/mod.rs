//! Domain model (IDs, queue names, jobs).
pub mod ids;
pub mod job;
pub mod queue_name;

pub use ids::JobId;
pub use job::{Job, MAX_BODY_SIZE};
pub use queue_name::{QueueName, TIMER_INDEX_KEY};
