//! Error types for the licensing module.
//!
//! Expected failures (bad keys, machine limits, unreachable servers)
//! are typed outcomes, not errors. `LicenseError` covers only the
//! conditions the protocols cannot express as a result: local storage
//! failures and remote payloads missing fields they are contractually
//! required to carry. The manager's public entry points convert even
//! these into conservative verdicts.

use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Local state store failure.
    #[error("state store error: {0}")]
    Store(#[from] endostat_store::StoreError),

    /// The remote authority answered with a payload missing a required
    /// field (e.g. a successful validation without a license id).
    #[error("malformed response from licensing server: {0}")]
    MalformedResponse(String),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
