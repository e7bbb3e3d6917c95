//! Error types for the encryption layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Sealing failed.
    #[error("sealing failed: {0}")]
    Seal(String),

    /// Opening failed (wrong key, wrong record name, or tampered data).
    #[error("open failed: {0}")]
    Open(String),

    /// Encoded blob is malformed.
    #[error("malformed sealed value: {0}")]
    Malformed(String),
}
