//! Error types for the ledger store.

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in ledger store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The entity kind.
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// A uniqueness constraint would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The underlying database failed.
    #[error("database error: {0}")]
    Database(String),

    /// A stored value could not be decoded into its domain type.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound {
                entity: "row",
                id: String::new(),
            },
            other => Self::Database(other.to_string()),
        }
    }
}
