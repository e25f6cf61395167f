//! Error types for the Berth document store.

use thiserror::Error;

/// All possible errors from the document store.
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying SQL error. Fatal to the current transaction; the caller
    /// decides whether to retry.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A record state blob could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A seed snapshot was structurally unusable.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// A transaction body asked for the transaction to be rolled back.
    #[error("transaction aborted: {0}")]
    Aborted(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;
