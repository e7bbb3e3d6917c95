//! License validation and machine binding for Endostat.
//!
//! This crate is the licensing core of the application: it proves a
//! license key against the remote licensing authority, binds it to one
//! physical machine, detects reuse and tampering, and hands the
//! application gate a verdict at every startup.
//!
//! # Design Principles
//!
//! - **Network is authoritative**: a cached VALID record is never
//!   trusted alone; every startup re-checks key and binding remotely
//! - **Typed outcomes, not exceptions**: every expected failure path is
//!   a structured result; the orchestrator never panics the launch
//! - **Transient failures are never destructive**: local state is only
//!   cleared on confirmed terminal conditions
//! - **Machine binding**: one fingerprint, one license, enforced by the
//!   remote machine-count limit
//!
//! # Entry points
//!
//! The application gate drives [`LicenseManager`]: `validate_new_license`
//! for a freshly entered key, `perform_strict_validation` at every
//! startup, `license_status` for display, `clear_license` to deactivate.

mod code;
mod config;
mod error;
mod fingerprint;
mod manager;
mod registry;
mod state;
mod validation;

pub use code::LicenseCode;
pub use config::LicenseConfig;
pub use error::{LicenseError, LicenseResult};
pub use fingerprint::{FingerprintProvider, FixedFingerprint, SystemFingerprint};
pub use manager::{ActivationOutcome, LicenseManager, LicenseStatus, Verdict};
pub use registry::{
    MachineRegistryClient, Ownership, RegisterOutcome, RegistrationProbe, UnregisterOutcome,
};
pub use state::{
    LicenseRecord, MachineRegistration, MemoryStateStore, PersistentStateStore, StateStore,
};
pub use validation::{KeyValidation, KeyValidationClient, ValidatedLicense};
