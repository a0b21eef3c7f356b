//! Error types for the payout engine.

use partnerpay_store::StoreError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in payout engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The ledger store failed. Retryable: the transaction rolled back and
    /// left no visible side effects.
    #[error("ledger error: {0}")]
    Store(#[from] StoreError),

    /// The recipient directory could not resolve a recipient.
    #[error("recipient directory error: {0}")]
    RecipientDirectory(String),
}
