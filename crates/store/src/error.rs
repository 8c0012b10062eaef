use thiserror::Error;

/// Errors that can occur when reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A stored row could not be mapped back into a domain value.
    #[error("Corrupt row in {table}: {reason}")]
    Decode { table: &'static str, reason: String },

    /// A stored counter would exceed its range.
    #[error("Counter overflow on {table}.{column}")]
    CounterOverflow {
        table: &'static str,
        column: &'static str,
    },

    /// The unit of work could not be committed.
    #[error("Commit failed: {0}")]
    CommitFailed(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
