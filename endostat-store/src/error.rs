//! Error types for the state store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem I/O failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encryption layer failure.
    #[error("store crypto error: {0}")]
    Crypto(#[from] endostat_crypto::CryptoError),

    /// Value serialization failed.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
