//! Encrypted key-value persistence for Endostat license state.
//!
//! The license subsystem keeps two small records on disk (the license
//! itself and the machine registration). This crate stores them as a
//! single JSON file of sealed values: each record is encrypted with a
//! key derived from an install-local secret, with the record name bound
//! into the ciphertext.
//!
//! # Corruption handling
//!
//! A file that cannot be parsed, or a record that cannot be opened, is
//! treated as absent (with a warning) rather than a hard error. The
//! worst outcome of a corrupt or foreign state file is that the user
//! has to re-activate, which beats refusing to start.

mod error;
mod file_store;

pub use error::{StoreError, StoreResult};
pub use file_store::EncryptedFileStore;
