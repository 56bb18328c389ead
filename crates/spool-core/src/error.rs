use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No such job / empty queue.
    #[error("not found")]
    NotFound,

    /// A job was pushed to a queue it does not belong to.
    #[error("job doesn't belong to this queue")]
    WrongQueue,

    /// Rejected before touching the store.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An entry read back from the store failed to decode.
    #[error("corrupted entry: {0}")]
    Corrupted(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] redis::RedisError),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
