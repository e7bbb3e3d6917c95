//! At-rest encryption primitives for the Endostat license core.
//!
//! The license state store persists two small records (license, machine
//! registration) that must survive restarts without being trivially
//! editable on disk. This crate provides the pieces the store needs:
//!
//! - Argon2id key derivation from an install-local secret
//! - ChaCha20-Poly1305 sealing with the record name as associated data,
//!   so a value copied under a different key fails to open

mod error;
mod key;
mod seal;

pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, DerivedKey, KdfParams, Salt, KEY_SIZE, SALT_SIZE};
pub use seal::{open_value, seal_value, SealedValue, NONCE_SIZE, TAG_SIZE};
