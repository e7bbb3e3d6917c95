//! Remote key validation client.
//!
//! Talks to the authority's validate-key action. Transport failures are
//! converted to a `NETWORK_ERROR` outcome at this boundary; callers
//! never see a raw HTTP error. A network failure is a recoverable
//! condition, deliberately distinct from "the key is wrong".

use crate::code::LicenseCode;
use crate::config::LicenseConfig;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a validate-key call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValidation {
    /// Whether the remote authority reports the key as valid right now.
    pub valid: bool,
    /// Validation code; see [`LicenseCode`].
    pub code: LicenseCode,
    /// License details, present when the authority recognized the key.
    pub license: Option<ValidatedLicense>,
    /// HTTP status of the response; 0 on transport failure.
    pub http_status: u16,
}

impl KeyValidation {
    /// True when the key is cryptographically legitimate (VALID or
    /// EXPIRED), regardless of the `valid` flag.
    pub fn key_is_legitimate(&self) -> bool {
        self.code.is_legitimate()
    }

    fn network_error() -> Self {
        Self {
            valid: false,
            code: LicenseCode::NetworkError,
            license: None,
            http_status: 0,
        }
    }
}

/// License details extracted from a validation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLicense {
    /// Remote-assigned license identifier.
    pub id: String,
    /// Expiry timestamp; `None` for perpetual licenses.
    pub expiry: Option<DateTime<Utc>>,
    /// Plan tier, defaulting to "standard" when the authority omits it.
    pub plan: String,
    /// Feature flags granted by the license.
    pub features: Vec<String>,
}

// ── Wire types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ValidateKeyResponse {
    meta: Option<ValidationMeta>,
    data: Option<LicenseData>,
    errors: Option<Vec<ApiError>>,
}

#[derive(Debug, Deserialize)]
struct ValidationMeta {
    #[serde(default)]
    valid: bool,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LicenseData {
    id: String,
    attributes: Option<LicenseAttributes>,
}

#[derive(Debug, Default, Deserialize)]
struct LicenseAttributes {
    expiry: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    plan: Option<String>,
    features: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<String>,
    #[allow(dead_code)]
    detail: Option<String>,
}

/// Client for the remote authority's key-validation action.
#[derive(Debug, Clone)]
pub struct KeyValidationClient {
    config: Arc<LicenseConfig>,
    client: Client,
}

impl KeyValidationClient {
    pub(crate) fn new(config: Arc<LicenseConfig>, client: Client) -> Self {
        Self { config, client }
    }

    /// Validates `key` against the remote authority.
    ///
    /// Never fails: transport errors and unparsable bodies come back as
    /// a `NETWORK_ERROR` outcome with `http_status: 0`.
    pub async fn validate_key(&self, key: &str) -> KeyValidation {
        debug!("validating license key with remote authority");

        let body = json!({
            "meta": {
                "scope": { "product": self.config.product_id },
                "key": key,
            }
        });

        let response = match self
            .client
            .post(self.config.validate_key_url())
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "key validation transport failure");
                return KeyValidation::network_error();
            }
        };

        let http_status = response.status().as_u16();
        let ok = response.status().is_success();

        let parsed: ValidateKeyResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, http_status, "key validation response unparsable");
                return KeyValidation::network_error();
            }
        };

        let license = parsed.data.map(|data| {
            let attributes = data.attributes.unwrap_or_default();
            ValidatedLicense {
                id: data.id,
                expiry: attributes.expiry,
                plan: attributes.plan.unwrap_or_else(|| "standard".to_string()),
                features: attributes.features.unwrap_or_default(),
            }
        });

        let meta_code = parsed
            .meta
            .as_ref()
            .and_then(|meta| meta.code.as_deref())
            .map(LicenseCode::from);

        if !ok || parsed.errors.is_some() {
            let code = meta_code
                .or_else(|| {
                    parsed
                        .errors
                        .as_ref()
                        .and_then(|errors| errors.first())
                        .and_then(|error| error.code.as_deref())
                        .map(LicenseCode::from)
                })
                .unwrap_or(LicenseCode::ValidationError);
            warn!(http_status, code = %code, "key validation rejected");
            return KeyValidation {
                valid: false,
                code,
                license,
                http_status,
            };
        }

        let meta = parsed.meta;
        let valid = meta.as_ref().is_some_and(|meta| meta.valid);
        let code = meta_code.unwrap_or(LicenseCode::ValidationError);
        debug!(code = %code, valid, "key validation answered");

        KeyValidation {
            valid,
            code,
            license,
            http_status,
        }
    }
}
