//! Remote machine registry client.
//!
//! Creates, probes and deletes the machine-to-license binding at the
//! remote authority, keeping the local registration record in step.
//! All calls are authenticated with the license key as a bearer
//! credential (`Authorization: License <key>`).

use crate::config::LicenseConfig;
use crate::error::LicenseResult;
use crate::fingerprint::FingerprintProvider;
use crate::state::{MachineRegistration, StateStore};
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a machine registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// This machine now holds a binding. `already_registered` is set
    /// when the remote had the fingerprint on file and the existing
    /// machine id was adopted instead of creating a duplicate.
    Registered {
        machine_id: String,
        already_registered: bool,
    },
    /// The license has reached its machine limit; it is active on
    /// another device.
    LimitExceeded,
    /// The remote definitively refused the registration.
    Rejected { http_status: u16, detail: String },
    /// The remote could not be reached; retry later.
    Unreachable { detail: String },
}

/// Result of probing the remote for the locally recorded machine id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationProbe {
    /// The remote confirms the binding.
    Registered { machine_id: String },
    /// No binding exists (locally or confirmed gone remotely).
    NotRegistered,
    /// Transport or server failure; the binding may or may not exist.
    /// Deliberately distinct from `NotRegistered` so callers do not
    /// wipe state over a flaky network.
    Unknown { detail: String },
}

/// Result of verifying that this device owns the stored binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    NotOwned { reason: String },
}

impl Ownership {
    fn not_owned(reason: &str) -> Self {
        Self::NotOwned {
            reason: reason.to_string(),
        }
    }
}

/// Outcome of deleting the remote binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnregisterOutcome {
    Unregistered,
    Failed { detail: String },
}

/// Result of a fingerprint-filtered machine lookup.
enum MachineLookup {
    Found(String),
    NotFound,
    Unavailable(String),
}

// ── Wire types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MachineResponse {
    data: MachineData,
}

#[derive(Debug, Deserialize)]
struct MachineListResponse {
    data: Vec<MachineData>,
}

#[derive(Debug, Deserialize)]
struct MachineData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    errors: Option<Vec<ApiError>>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<String>,
    detail: Option<String>,
}

/// Client for the remote authority's machines endpoints.
pub struct MachineRegistryClient {
    config: Arc<LicenseConfig>,
    client: Client,
    store: Arc<dyn StateStore>,
    fingerprint: Arc<dyn FingerprintProvider>,
}

impl MachineRegistryClient {
    pub(crate) fn new(
        config: Arc<LicenseConfig>,
        client: Client,
        store: Arc<dyn StateStore>,
        fingerprint: Arc<dyn FingerprintProvider>,
    ) -> Self {
        Self {
            config,
            client,
            store,
            fingerprint,
        }
    }

    fn authed(&self, builder: RequestBuilder, key: &str) -> RequestBuilder {
        builder
            .header("Authorization", format!("License {key}"))
            .header("Accept", "application/vnd.api+json")
    }

    /// Registers this machine under `license_id`.
    ///
    /// Idempotent across restarts: a `FINGERPRINT_NOT_UNIQUE` conflict
    /// means this exact machine is already on file, so the existing
    /// machine id is looked up and adopted.
    ///
    /// # Errors
    ///
    /// Only on local store failures; remote failures are outcomes.
    pub async fn register_machine(
        &self,
        key: &str,
        license_id: &str,
    ) -> LicenseResult<RegisterOutcome> {
        let fingerprint = self.fingerprint.machine_fingerprint();
        let machine_name = format!(
            "{}-{}",
            self.config.machine_name_prefix,
            host_name()
        );

        info!(machine_name, license_id, "registering machine");

        let body = json!({
            "data": {
                "type": "machines",
                "attributes": {
                    "name": machine_name,
                    "fingerprint": fingerprint,
                    "platform": std::env::consts::OS,
                },
                "relationships": {
                    "license": {
                        "data": { "type": "licenses", "id": license_id }
                    }
                }
            }
        });

        let request = self
            .authed(self.client.post(self.config.machines_url()), key)
            .header("Content-Type", "application/vnd.api+json")
            .json(&body);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "machine registration transport failure");
                return Ok(RegisterOutcome::Unreachable {
                    detail: e.to_string(),
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            let parsed: MachineResponse = match response.json().await {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(error = %e, "machine registration response unparsable");
                    return Ok(RegisterOutcome::Unreachable {
                        detail: e.to_string(),
                    });
                }
            };
            self.store_registration(&parsed.data.id, &fingerprint)?;
            info!(machine_id = %parsed.data.id, "machine registered");
            return Ok(RegisterOutcome::Registered {
                machine_id: parsed.data.id,
                already_registered: false,
            });
        }

        let error_code = match response.json::<ApiErrorResponse>().await {
            Ok(body) => body
                .errors
                .and_then(|errors| errors.into_iter().next())
                .map(|error| {
                    (
                        error.code.unwrap_or_default(),
                        error.detail.unwrap_or_default(),
                    )
                }),
            Err(_) => None,
        };

        match error_code {
            Some((code, _)) if code == "FINGERPRINT_NOT_UNIQUE" => {
                // This fingerprint is already on file under the license.
                // Adopt the existing machine record instead of erroring.
                // A conflict is proof of an active binding, so a flaky
                // follow-up lookup must stay transient, not terminal.
                info!("fingerprint already registered, adopting existing machine");
                match self.existing_machine(key, &fingerprint).await {
                    MachineLookup::Found(machine_id) => {
                        self.store_registration(&machine_id, &fingerprint)?;
                        Ok(RegisterOutcome::Registered {
                            machine_id,
                            already_registered: true,
                        })
                    }
                    MachineLookup::NotFound => Ok(RegisterOutcome::Rejected {
                        http_status: status.as_u16(),
                        detail: "fingerprint reported registered but no machine on file"
                            .to_string(),
                    }),
                    MachineLookup::Unavailable(detail) => {
                        warn!(detail = %detail, "machine lookup after fingerprint conflict failed");
                        Ok(RegisterOutcome::Unreachable { detail })
                    }
                }
            }
            Some((code, _)) if code == "MACHINE_LIMIT_EXCEEDED" => {
                warn!("license already at its machine limit");
                Ok(RegisterOutcome::LimitExceeded)
            }
            Some((code, detail)) => {
                warn!(http_status = status.as_u16(), code, "machine registration rejected");
                Ok(RegisterOutcome::Rejected {
                    http_status: status.as_u16(),
                    detail: if detail.is_empty() { code } else { detail },
                })
            }
            None => {
                warn!(http_status = status.as_u16(), "machine registration failed");
                Ok(RegisterOutcome::Rejected {
                    http_status: status.as_u16(),
                    detail: format!("registration failed with status {status}"),
                })
            }
        }
    }

    /// Looks up a machine by fingerprint under the license.
    ///
    /// An empty list is a definitive answer; transport and server
    /// failures are reported separately so callers do not mistake a
    /// flaky network for "no machine on file".
    async fn existing_machine(&self, key: &str, fingerprint: &str) -> MachineLookup {
        let url = format!(
            "{}?filter[fingerprint]={}",
            self.config.machines_url(),
            fingerprint
        );
        let response = match self.authed(self.client.get(url), key).send().await {
            Ok(response) => response,
            Err(e) => return MachineLookup::Unavailable(e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            return MachineLookup::Unavailable(format!("lookup failed with status {status}"));
        }

        let parsed: MachineListResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => return MachineLookup::Unavailable(e.to_string()),
        };

        match parsed.data.into_iter().next() {
            Some(machine) => MachineLookup::Found(machine.id),
            None => MachineLookup::NotFound,
        }
    }

    /// Probes the remote for the locally recorded machine id.
    ///
    /// A 404 means the remote has forgotten this machine: the stale
    /// local record is deleted and `NotRegistered` returned. Any other
    /// failure is `Unknown` and leaves local state untouched.
    pub async fn check_machine_registration(&self, key: &str) -> LicenseResult<RegistrationProbe> {
        let Some(registration) = self.store.machine_registration()? else {
            return Ok(RegistrationProbe::NotRegistered);
        };

        let request = self.authed(self.client.get(self.config.machine_url(&registration.id)), key);
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "machine probe transport failure");
                return Ok(RegistrationProbe::Unknown {
                    detail: e.to_string(),
                });
            }
        };

        match response.status() {
            status if status.is_success() => Ok(RegistrationProbe::Registered {
                machine_id: registration.id,
            }),
            StatusCode::NOT_FOUND => {
                info!(machine_id = %registration.id, "remote has forgotten this machine");
                self.store.delete_machine_registration()?;
                Ok(RegistrationProbe::NotRegistered)
            }
            status => {
                warn!(http_status = status.as_u16(), "machine probe failed");
                Ok(RegistrationProbe::Unknown {
                    detail: format!("probe failed with status {status}"),
                })
            }
        }
    }

    /// Verifies that the stored binding belongs to this device.
    ///
    /// Owned requires all of: a local registration record, a stored
    /// fingerprint equal to the one computed right now, and a remote
    /// probe that does not deny the registration. An ambiguous probe
    /// does not revoke ownership.
    pub async fn verify_machine_ownership(&self, key: &str) -> LicenseResult<Ownership> {
        let Some(registration) = self.store.machine_registration()? else {
            return Ok(Ownership::not_owned("No machine registration found"));
        };

        let current = self.fingerprint.machine_fingerprint();
        if registration.fingerprint != current {
            // Cloned disk image or changed hardware: this is not the
            // device the binding was created on.
            warn!(
                stored = %registration.fingerprint,
                current = %current,
                "machine fingerprint mismatch"
            );
            return Ok(Ownership::not_owned("Machine fingerprint mismatch"));
        }

        match self.check_machine_registration(key).await? {
            RegistrationProbe::NotRegistered => {
                Ok(Ownership::not_owned("Machine not registered with license"))
            }
            RegistrationProbe::Registered { .. } | RegistrationProbe::Unknown { .. } => {
                Ok(Ownership::Owned)
            }
        }
    }

    /// Deletes the remote binding. A 404 counts as success (already
    /// gone); the local record is cleared on success.
    pub async fn unregister_machine(&self, key: &str) -> LicenseResult<UnregisterOutcome> {
        let Some(registration) = self.store.machine_registration()? else {
            return Ok(UnregisterOutcome::Unregistered);
        };

        let request =
            self.authed(self.client.delete(self.config.machine_url(&registration.id)), key);
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "machine unregister transport failure");
                return Ok(UnregisterOutcome::Failed {
                    detail: e.to_string(),
                });
            }
        };

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            self.store.delete_machine_registration()?;
            info!(machine_id = %registration.id, "machine unregistered");
            return Ok(UnregisterOutcome::Unregistered);
        }

        warn!(http_status = status.as_u16(), "machine unregister failed");
        Ok(UnregisterOutcome::Failed {
            detail: format!("unregister failed with status {status}"),
        })
    }

    fn store_registration(&self, machine_id: &str, fingerprint: &str) -> LicenseResult<()> {
        self.store.set_machine_registration(&MachineRegistration {
            id: machine_id.to_string(),
            fingerprint: fingerprint.to_string(),
            registered_at: Utc::now(),
        })?;
        debug!(machine_id, "machine registration stored");
        Ok(())
    }
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
