//! Persisted license state.
//!
//! Two records survive restarts: the license itself and the machine
//! registration binding it to this device. Both are owned by the local
//! store and only ever written through the license manager.

use crate::code::LicenseCode;
use chrono::{DateTime, Utc};
use endostat_store::{EncryptedFileStore, StoreResult};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Store key for the license record.
const LICENSE_RECORD: &str = "license";

/// Store key for the machine registration record.
const MACHINE_RECORD: &str = "machine.registration";

/// The locally persisted license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Canonical uppercase license key.
    pub key: String,
    /// Remote-assigned license identifier, stable for the key's lifetime.
    pub id: String,
    /// Last validation code returned by the remote authority.
    pub status: LicenseCode,
    /// Expiry timestamp; `None` means a perpetual license.
    pub expiry: Option<DateTime<Utc>>,
    /// Plan tier.
    #[serde(default = "default_plan")]
    pub plan: String,
    /// Feature flags granted by the license.
    #[serde(default)]
    pub features: Vec<String>,
    /// True once this machine holds an active binding.
    pub machine_registered: bool,
    /// Timestamp of the last successful remote check.
    pub validated_at: DateTime<Utc>,
}

fn default_plan() -> String {
    "standard".to_string()
}

/// The locally persisted machine binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRegistration {
    /// Remote-assigned machine identifier.
    pub id: String,
    /// Fingerprint this binding was created under. Must match the
    /// current fingerprint for the binding to be owned by this device.
    pub fingerprint: String,
    /// When the binding was created.
    pub registered_at: DateTime<Utc>,
}

/// Typed access to the persisted license state.
///
/// The production implementation sits on the encrypted file store;
/// tests use [`MemoryStateStore`]. The manager is the only writer.
pub trait StateStore: Send + Sync {
    fn license(&self) -> StoreResult<Option<LicenseRecord>>;
    fn set_license(&self, record: &LicenseRecord) -> StoreResult<()>;
    fn delete_license(&self) -> StoreResult<()>;

    fn machine_registration(&self) -> StoreResult<Option<MachineRegistration>>;
    fn set_machine_registration(&self, registration: &MachineRegistration) -> StoreResult<()>;
    fn delete_machine_registration(&self) -> StoreResult<()>;
}

/// State store backed by [`EncryptedFileStore`].
#[derive(Debug)]
pub struct PersistentStateStore {
    inner: EncryptedFileStore,
}

impl PersistentStateStore {
    /// Wraps an opened encrypted store.
    pub fn new(inner: EncryptedFileStore) -> Self {
        Self { inner }
    }
}

impl StateStore for PersistentStateStore {
    fn license(&self) -> StoreResult<Option<LicenseRecord>> {
        read_record(&self.inner, LICENSE_RECORD)
    }

    fn set_license(&self, record: &LicenseRecord) -> StoreResult<()> {
        write_record(&self.inner, LICENSE_RECORD, record)
    }

    fn delete_license(&self) -> StoreResult<()> {
        self.inner.delete(LICENSE_RECORD).map(|_| ())
    }

    fn machine_registration(&self) -> StoreResult<Option<MachineRegistration>> {
        read_record(&self.inner, MACHINE_RECORD)
    }

    fn set_machine_registration(&self, registration: &MachineRegistration) -> StoreResult<()> {
        write_record(&self.inner, MACHINE_RECORD, registration)
    }

    fn delete_machine_registration(&self) -> StoreResult<()> {
        self.inner.delete(MACHINE_RECORD).map(|_| ())
    }
}

fn read_record<T: serde::de::DeserializeOwned>(
    store: &EncryptedFileStore,
    name: &str,
) -> StoreResult<Option<T>> {
    let Some(bytes) = store.get(name)? else {
        return Ok(None);
    };
    match serde_json::from_slice(&bytes) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            // Decrypted fine but does not parse: a record written by an
            // incompatible version. Treat as absent like other corruption.
            tracing::warn!(record = name, error = %e, "stored record unparsable, treating as absent");
            Ok(None)
        }
    }
}

fn write_record<T: Serialize>(store: &EncryptedFileStore, name: &str, record: &T) -> StoreResult<()> {
    let bytes = serde_json::to_vec(record)?;
    store.set(name, &bytes)
}

/// In-memory state store for tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    license: Mutex<Option<LicenseRecord>>,
    machine: Mutex<Option<MachineRegistration>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn license(&self) -> StoreResult<Option<LicenseRecord>> {
        Ok(self.license.lock().expect("lock poisoned").clone())
    }

    fn set_license(&self, record: &LicenseRecord) -> StoreResult<()> {
        *self.license.lock().expect("lock poisoned") = Some(record.clone());
        Ok(())
    }

    fn delete_license(&self) -> StoreResult<()> {
        *self.license.lock().expect("lock poisoned") = None;
        Ok(())
    }

    fn machine_registration(&self) -> StoreResult<Option<MachineRegistration>> {
        Ok(self.machine.lock().expect("lock poisoned").clone())
    }

    fn set_machine_registration(&self, registration: &MachineRegistration) -> StoreResult<()> {
        *self.machine.lock().expect("lock poisoned") = Some(registration.clone());
        Ok(())
    }

    fn delete_machine_registration(&self) -> StoreResult<()> {
        *self.machine.lock().expect("lock poisoned") = None;
        Ok(())
    }
}
