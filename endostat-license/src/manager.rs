//! License manager: the orchestrator behind the application gate.
//!
//! Two mutually exclusive protocols run here, one at a time per
//! process:
//!
//! - **New activation** (`validate_new_license`): a freshly entered key
//!   is validated remotely and this machine is bound to it.
//! - **Strict revalidation** (`perform_strict_validation`): at every
//!   startup the stored key and machine binding are re-checked against
//!   the remote authority; cached state is never trusted alone.
//!
//! Failure policy: local state is cleared only on confirmed terminal
//! conditions (invalid key, machine limit, ownership failure, definite
//! registration rejection). Transport failures and ambiguous probes
//! preserve state, and a recently validated license keeps working
//! offline for a configurable grace window.

use crate::code::LicenseCode;
use crate::config::LicenseConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::fingerprint::{FingerprintProvider, SystemFingerprint};
use crate::registry::{
    MachineRegistryClient, Ownership, RegisterOutcome, RegistrationProbe, UnregisterOutcome,
};
use crate::state::{LicenseRecord, StateStore};
use crate::validation::{KeyValidation, KeyValidationClient};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const REASON_NO_LICENSE: &str = "No license";
const REASON_INVALID: &str = "License invalid";
const REASON_UNREACHABLE: &str = "License server unreachable";
const REASON_DIFFERENT_MACHINE: &str = "License activated on different machine";
const REASON_ALREADY_ACTIVE: &str = "License already activated on another device";
const REASON_REGISTRATION_FAILED: &str = "Machine registration failed";
const REASON_INTERNAL: &str = "Internal licensing error";

/// Verdict returned to the application gate by strict revalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// Whether the application may launch.
    pub valid: bool,
    /// Human-readable reason when `valid` is false. Disambiguates
    /// "invalid key" from "server unreachable".
    pub reason: Option<String>,
    /// True when the remedy is re-activating this device (binding
    /// conflict) rather than entering a new key.
    pub requires_reactivation: bool,
}

impl Verdict {
    fn pass() -> Self {
        Self {
            valid: true,
            reason: None,
            requires_reactivation: false,
        }
    }

    fn fail(reason: &str, requires_reactivation: bool) -> Self {
        Self {
            valid: false,
            reason: Some(reason.to_string()),
            requires_reactivation,
        }
    }
}

/// Outcome of activating a newly entered key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationOutcome {
    /// Whether the remote authority reports the key as currently valid.
    pub valid: bool,
    /// Result code for the caller to render.
    pub code: LicenseCode,
    /// Whether a license record was persisted locally.
    pub stored: bool,
    /// Whether this machine now holds a binding.
    pub machine_registered: bool,
    /// Additional detail for failure messages.
    pub detail: Option<String>,
}

/// Locally known license status, for display. No network calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseStatus {
    pub valid: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub plan: String,
    pub features: Vec<String>,
    pub status: Option<LicenseCode>,
}

impl LicenseStatus {
    fn none() -> Self {
        Self {
            valid: false,
            expires_at: None,
            plan: "standard".to_string(),
            features: Vec::new(),
            status: None,
        }
    }
}

/// Orchestrates key validation, machine binding and local state.
///
/// Single instance per process; the two protocols are serialized by an
/// internal lock, so there is never a concurrent-registration race.
pub struct LicenseManager {
    config: Arc<LicenseConfig>,
    store: Arc<dyn StateStore>,
    validation: KeyValidationClient,
    registry: MachineRegistryClient,
    flow_lock: Mutex<()>,
}

impl LicenseManager {
    /// Creates a manager using the real machine fingerprint.
    pub fn new(config: LicenseConfig, store: Arc<dyn StateStore>) -> Self {
        Self::with_fingerprint(config, store, Arc::new(SystemFingerprint))
    }

    /// Creates a manager with an injected fingerprint provider.
    pub fn with_fingerprint(
        config: LicenseConfig,
        store: Arc<dyn StateStore>,
        fingerprint: Arc<dyn FingerprintProvider>,
    ) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .expect("failed to create HTTP client");
        let config = Arc::new(config);

        let validation = KeyValidationClient::new(Arc::clone(&config), client.clone());
        let registry = MachineRegistryClient::new(
            Arc::clone(&config),
            client,
            Arc::clone(&store),
            fingerprint,
        );

        Self {
            config,
            store,
            validation,
            registry,
            flow_lock: Mutex::new(()),
        }
    }

    /// The machine registry client, for callers that need direct
    /// binding operations (e.g. a "deactivate this device" action).
    pub fn registry(&self) -> &MachineRegistryClient {
        &self.registry
    }

    /// The key validation client.
    pub fn validation_client(&self) -> &KeyValidationClient {
        &self.validation
    }

    // ── Protocol A: new activation ──────────────────────────────

    /// Validates a newly entered key and binds this machine to it.
    ///
    /// Never fails: unexpected errors come back as a conservative
    /// `VALIDATION_ERROR` outcome.
    pub async fn validate_new_license(&self, raw_key: &str) -> ActivationOutcome {
        let _guard = self.flow_lock.lock().await;
        match self.activate(raw_key).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "new-license activation failed unexpectedly");
                if let Err(e) = self.clear_local_state() {
                    error!(error = %e, "state cleanup after activation failure failed");
                }
                ActivationOutcome {
                    valid: false,
                    code: LicenseCode::ValidationError,
                    stored: false,
                    machine_registered: false,
                    detail: Some(e.to_string()),
                }
            }
        }
    }

    async fn activate(&self, raw_key: &str) -> LicenseResult<ActivationOutcome> {
        let key = raw_key.trim().to_uppercase();
        let validation = self.validation.validate_key(&key).await;

        if !validation.key_is_legitimate() {
            // A network failure is recoverable and must not destroy
            // state; every other non-legitimate code is terminal.
            if validation.code != LicenseCode::NetworkError {
                warn!(code = %validation.code, "entered key rejected, clearing local state");
                self.clear_local_state()?;
            }
            return Ok(ActivationOutcome {
                valid: false,
                code: validation.code,
                stored: false,
                machine_registered: false,
                detail: None,
            });
        }

        let license = validation.license.as_ref().ok_or_else(|| {
            LicenseError::MalformedResponse(
                "license id missing from validation response".to_string(),
            )
        })?;

        let mut record = LicenseRecord {
            key: key.clone(),
            id: license.id.clone(),
            status: validation.code.clone(),
            expiry: license.expiry,
            plan: license.plan.clone(),
            features: license.features.clone(),
            machine_registered: false,
            validated_at: Utc::now(),
        };
        self.store.set_license(&record)?;
        info!(license_id = %record.id, "license stored, binding machine");

        match self.registry.register_machine(&key, &record.id).await? {
            RegisterOutcome::Registered { .. } => {
                record.machine_registered = true;
                self.store.set_license(&record)?;
                info!("activation complete");
                Ok(ActivationOutcome {
                    valid: validation.valid,
                    code: validation.code,
                    stored: true,
                    machine_registered: true,
                    detail: None,
                })
            }
            RegisterOutcome::LimitExceeded => {
                // Already active elsewhere: nothing local is worth keeping.
                self.clear_local_state()?;
                Ok(ActivationOutcome {
                    valid: false,
                    code: LicenseCode::MachineLimitExceeded,
                    stored: false,
                    machine_registered: false,
                    detail: Some(REASON_ALREADY_ACTIVE.to_string()),
                })
            }
            RegisterOutcome::Rejected { detail, .. }
            | RegisterOutcome::Unreachable { detail } => {
                // The key itself is legitimate; only the binding failed.
                // Keep the license and retry at the next strict check.
                warn!(detail = %detail, "license stored but machine binding failed");
                Ok(ActivationOutcome {
                    valid: validation.valid,
                    code: validation.code,
                    stored: true,
                    machine_registered: false,
                    detail: Some(detail),
                })
            }
        }
    }

    // ── Protocol B: strict revalidation ─────────────────────────

    /// Re-checks the stored key and machine binding at startup.
    ///
    /// Never fails: unexpected errors come back as the most
    /// conservative verdict rather than aborting the launch sequence.
    pub async fn perform_strict_validation(&self) -> Verdict {
        let _guard = self.flow_lock.lock().await;
        match self.strict_validation().await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(error = %e, "strict validation failed unexpectedly");
                Verdict::fail(REASON_INTERNAL, false)
            }
        }
    }

    async fn strict_validation(&self) -> LicenseResult<Verdict> {
        let Some(mut record) = self.store.license()? else {
            info!("no license on record");
            return Ok(Verdict::fail(REASON_NO_LICENSE, false));
        };

        let validation = self.validation.validate_key(&record.key).await;

        if validation.code == LicenseCode::NetworkError {
            return Ok(self.offline_verdict(&record));
        }

        if !validation.key_is_legitimate() {
            warn!(code = %validation.code, "stored license rejected by remote authority");
            self.clear_local_state()?;
            return Ok(Verdict::fail(REASON_INVALID, false));
        }

        self.refresh_record(&mut record, &validation)?;
        let key = record.key.clone();

        match self.registry.check_machine_registration(&key).await? {
            RegistrationProbe::Registered { .. } | RegistrationProbe::Unknown { .. } => {
                // A binding is (or may still be) on file; confirm it
                // belongs to this device. An ambiguous probe does not
                // revoke ownership, but a local fingerprint mismatch
                // does regardless of what the remote says.
                match self.registry.verify_machine_ownership(&key).await? {
                    Ownership::Owned => {
                        if !record.machine_registered {
                            record.machine_registered = true;
                            self.store.set_license(&record)?;
                        }
                        info!("license valid, machine ownership confirmed");
                        Ok(Verdict::pass())
                    }
                    Ownership::NotOwned { reason } => {
                        warn!(reason = %reason, "machine ownership verification failed");
                        self.clear_local_state()?;
                        Ok(Verdict::fail(REASON_DIFFERENT_MACHINE, true))
                    }
                }
            }
            RegistrationProbe::NotRegistered => {
                info!("machine not registered, attempting registration");
                match self.registry.register_machine(&key, &record.id).await? {
                    RegisterOutcome::Registered { .. } => {
                        record.machine_registered = true;
                        self.store.set_license(&record)?;
                        info!("machine registered during revalidation");
                        Ok(Verdict::pass())
                    }
                    RegisterOutcome::LimitExceeded => {
                        self.clear_local_state()?;
                        Ok(Verdict::fail(REASON_ALREADY_ACTIVE, true))
                    }
                    RegisterOutcome::Rejected { detail, .. } => {
                        warn!(detail = %detail, "registration definitively rejected");
                        self.clear_local_state()?;
                        Ok(Verdict::fail(REASON_REGISTRATION_FAILED, true))
                    }
                    RegisterOutcome::Unreachable { .. } => {
                        // Transient; the license itself just validated.
                        Ok(Verdict::fail(REASON_UNREACHABLE, false))
                    }
                }
            }
        }
    }

    /// Verdict for a startup with the licensing server unreachable.
    ///
    /// A license that validated recently (within the configured grace
    /// window) and holds a machine binding keeps working offline.
    /// State is never cleared here.
    fn offline_verdict(&self, record: &LicenseRecord) -> Verdict {
        let grace_days = self.config.offline_grace_days;
        if grace_days > 0 && record.status.is_legitimate() && record.machine_registered {
            let age = Utc::now() - record.validated_at;
            if age <= Duration::days(grace_days) {
                info!(
                    validated_at = %record.validated_at,
                    "server unreachable, allowing launch within offline grace window"
                );
                return Verdict::pass();
            }
            warn!(
                validated_at = %record.validated_at,
                grace_days,
                "server unreachable and offline grace window exhausted"
            );
        }
        Verdict::fail(REASON_UNREACHABLE, false)
    }

    fn refresh_record(
        &self,
        record: &mut LicenseRecord,
        validation: &KeyValidation,
    ) -> LicenseResult<()> {
        record.status = validation.code.clone();
        record.validated_at = Utc::now();
        if let Some(license) = &validation.license {
            record.id = license.id.clone();
            record.expiry = license.expiry;
            record.plan = license.plan.clone();
            record.features = license.features.clone();
        }
        self.store.set_license(record)?;
        Ok(())
    }

    // ── Status & clearing ───────────────────────────────────────

    /// The locally known license status, for display. No network call.
    ///
    /// `valid` reflects key legitimacy (VALID or EXPIRED); the caller
    /// uses `expires_at` to drive expiry messaging.
    pub fn license_status(&self) -> LicenseStatus {
        let record = match self.store.license() {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "license status read failed");
                return LicenseStatus::none();
            }
        };
        match record {
            Some(record) => LicenseStatus {
                valid: record.status.is_legitimate(),
                expires_at: record.expiry,
                plan: record.plan,
                features: record.features,
                status: Some(record.status),
            },
            None => LicenseStatus::none(),
        }
    }

    /// Deactivates this install: best-effort remote unregister, then
    /// deletion of all local license state.
    pub async fn clear_license(&self) {
        let _guard = self.flow_lock.lock().await;

        let key = match self.store.license() {
            Ok(Some(record)) => Some(record.key),
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, "license read during clear failed");
                None
            }
        };

        if let Some(key) = key {
            match self.registry.unregister_machine(&key).await {
                Ok(UnregisterOutcome::Unregistered) => {}
                Ok(UnregisterOutcome::Failed { detail }) => {
                    warn!(detail = %detail, "remote unregister failed, clearing locally anyway");
                }
                Err(e) => {
                    warn!(error = %e, "remote unregister errored, clearing locally anyway");
                }
            }
        }

        if let Err(e) = self.clear_local_state() {
            error!(error = %e, "local license state clear failed");
        } else {
            info!("license cleared");
        }
    }

    /// Deletes both local records. Never touches the remote.
    fn clear_local_state(&self) -> LicenseResult<()> {
        self.store.delete_license()?;
        self.store.delete_machine_registration()?;
        Ok(())
    }
}
