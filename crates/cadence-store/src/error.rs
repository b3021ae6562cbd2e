use thiserror::Error;

/// Errors surfaced by [`crate::Store`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The query matched nothing. Callers decide whether that is a failure.
    #[error("no rows returned")]
    NoRows,

    /// A statement was interrupted because it ran past its deadline.
    #[error("statement interrupted after {ms}ms")]
    Interrupted { ms: u64 },

    /// The advisory lock file could not be opened or locked.
    #[error("lock error ({name}): {reason}")]
    Lock { name: String, reason: String },

    /// The store handle cannot be used (e.g. a poisoned connection mutex).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Asked to move a run into a state it may not enter.
    #[error("invalid run status transition to {0}")]
    InvalidTransition(String),

    /// A stored column could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Map rusqlite's empty-result error onto [`StoreError::NoRows`].
    pub(crate) fn from_query(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NoRows,
            other => StoreError::Database(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
