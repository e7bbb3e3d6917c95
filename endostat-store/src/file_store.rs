//! File-backed encrypted store.

use crate::error::StoreResult;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use endostat_crypto::{derive_key, open_value, seal_value, DerivedKey, KdfParams, Salt, SealedValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

/// On-disk representation: a salt plus base64-wrapped sealed values.
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    salt: String,
    entries: BTreeMap<String, String>,
}

/// An encrypted key-value store backed by a single JSON file.
///
/// Values are sealed with a key derived from the secret passed at open
/// time; the per-file salt lives in the file header. Writes are atomic
/// (temp file + rename) so a crash mid-write leaves the previous state
/// intact.
pub struct EncryptedFileStore {
    path: PathBuf,
    key: DerivedKey,
    salt: Salt,
    entries: Mutex<BTreeMap<String, String>>,
}

impl EncryptedFileStore {
    /// Opens the store at `path`, deriving the encryption key from
    /// `secret` with default KDF parameters.
    ///
    /// A missing file yields an empty store. An unreadable or unparsable
    /// file is logged and treated as empty; the old content is replaced
    /// on the next write.
    ///
    /// # Errors
    ///
    /// Returns an error only if key derivation itself fails.
    pub fn open(path: impl AsRef<Path>, secret: &str) -> StoreResult<Self> {
        Self::open_with_params(path, secret, &KdfParams::default())
    }

    /// Opens the store with explicit KDF parameters. Tests use fast
    /// parameters; production uses the defaults.
    pub fn open_with_params(
        path: impl AsRef<Path>,
        secret: &str,
        params: &KdfParams,
    ) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let (salt, entries) = match Self::load_file(&path) {
            Some((salt, entries)) => (salt, entries),
            None => (Salt::random(), BTreeMap::new()),
        };

        let key = derive_key(secret, &salt, params)?;

        Ok(Self {
            path,
            key,
            salt,
            entries: Mutex::new(entries),
        })
    }

    fn load_file(path: &Path) -> Option<(Salt, BTreeMap<String, String>)> {
        if !path.exists() {
            return None;
        }

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "state file unreadable, starting empty");
                return None;
            }
        };

        let parsed: StateFile = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "state file corrupt, starting empty");
                return None;
            }
        };

        if parsed.version != FORMAT_VERSION {
            warn!(
                version = parsed.version,
                "unsupported state file version, starting empty"
            );
            return None;
        }

        let salt_bytes = match BASE64.decode(&parsed.salt) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "state file salt corrupt, starting empty");
                return None;
            }
        };
        match Salt::from_slice(&salt_bytes) {
            Ok(salt) => Some((salt, parsed.entries)),
            Err(e) => {
                warn!(error = %e, "state file salt invalid, starting empty");
                None
            }
        }
    }

    /// Returns the decrypted value for `name`, or `None` if absent.
    ///
    /// A value that fails to open (wrong secret, tampering) is reported
    /// as absent with a warning; the caller re-creates state through the
    /// normal activation path.
    pub fn get(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let entries = self.entries.lock().expect("store mutex poisoned");
        let Some(encoded) = entries.get(name) else {
            return Ok(None);
        };

        let sealed = match SealedValue::from_base64(encoded) {
            Ok(sealed) => sealed,
            Err(e) => {
                warn!(record = name, error = %e, "stored value malformed, treating as absent");
                return Ok(None);
            }
        };

        match open_value(&self.key, name, &sealed) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(e) => {
                warn!(record = name, error = %e, "stored value unopenable, treating as absent");
                Ok(None)
            }
        }
    }

    /// Seals and persists a value under `name`.
    pub fn set(&self, name: &str, value: &[u8]) -> StoreResult<()> {
        let sealed = seal_value(&self.key, name, value)?;
        let mut entries = self.entries.lock().expect("store mutex poisoned");
        entries.insert(name.to_string(), sealed.to_base64());
        self.flush(&entries)?;
        debug!(record = name, "state record written");
        Ok(())
    }

    /// Deletes the value under `name`. Returns whether it existed.
    pub fn delete(&self, name: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().expect("store mutex poisoned");
        let existed = entries.remove(name).is_some();
        if existed {
            self.flush(&entries)?;
            debug!(record = name, "state record deleted");
        }
        Ok(existed)
    }

    /// Returns whether a record named `name` is present (without
    /// attempting to open it).
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .lock()
            .expect("store mutex poisoned")
            .contains_key(name)
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        let state = StateFile {
            version: FORMAT_VERSION,
            salt: BASE64.encode(self.salt.as_bytes()),
            entries: entries.clone(),
        };
        let json = serde_json::to_string_pretty(&state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write-sync-rename keeps the previous file intact on a crash
        // and makes sure the new contents hit disk before replacing it.
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl std::fmt::Debug for EncryptedFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
