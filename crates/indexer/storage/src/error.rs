use thiserror::Error;

/// Errors that may occur while interacting with the indexer storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying database returned an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be turned back into a record.
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    /// A writer panicked while holding the connection.
    #[error("database connection lock poisoned")]
    LockPoisoned,
}
