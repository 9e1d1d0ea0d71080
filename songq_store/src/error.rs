use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("song not found")]
    NotFound,

    #[error("queue is empty")]
    QueueEmpty,

    #[error("move out of bounds")]
    MoveOutOfBounds,

    #[error("song has already been dequeued")]
    SongDequeued,

    /// The store was written by an incompatible version of the record format.
    #[error("version mismatch: expected {expected}, got {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// Another write transaction committed after this one started.
    #[error("transaction conflict")]
    Conflict,

    #[error("write attempted in a read-only transaction")]
    ReadOnly,

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store error: {0}")]
    Store(#[from] sled::Error),
}

impl QueueError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}
