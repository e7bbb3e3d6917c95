//! Record sealing using ChaCha20-Poly1305.
//!
//! Each stored value is sealed with the record name as associated data,
//! so moving a ciphertext from one record to another (e.g. copying the
//! machine registration blob over the license blob) fails to open.

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A sealed value: nonce plus ciphertext (auth tag included).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedValue {
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
}

impl SealedValue {
    /// Encodes to base64 for storage in the state file.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        BASE64.encode(&bytes)
    }

    /// Decodes from base64.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| CryptoError::Malformed(format!("invalid base64: {e}")))?;

        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Malformed("sealed value too short".to_string()));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
        Ok(Self {
            nonce,
            ciphertext: bytes[NONCE_SIZE..].to_vec(),
        })
    }
}

/// Seals `plaintext` under `key`, binding it to `record_name`.
pub fn seal_value(key: &DerivedKey, record_name: &str, plaintext: &[u8]) -> CryptoResult<SealedValue> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: record_name.as_bytes(),
            },
        )
        .map_err(|e| CryptoError::Seal(e.to_string()))?;

    Ok(SealedValue {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Opens a sealed value. Fails if the key is wrong, the record name does
/// not match the one used at seal time, or the data was modified.
pub fn open_value(key: &DerivedKey, record_name: &str, sealed: &SealedValue) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(&sealed.nonce);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: sealed.ciphertext.as_ref(),
                aad: record_name.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::Open("wrong key or tampered data".to_string()))
}
