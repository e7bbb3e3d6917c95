//! Licensing configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the licensing subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseConfig {
    /// Account identifier at the remote licensing authority.
    pub account_id: String,
    /// Product identifier scoping key validation.
    pub product_id: String,
    /// Base URL of the licensing API (e.g. `https://api.keygen.sh/v1`).
    pub api_base_url: String,
    /// Timeout applied to every remote call, in seconds.
    pub request_timeout_secs: u64,
    /// Prefix for the remote-visible machine name. The full name is
    /// `"{prefix}-{hostname}"`; deployments that treat hostnames as
    /// sensitive can ship a generic prefix and rename upstream.
    pub machine_name_prefix: String,
    /// How long after the last successful remote validation an offline
    /// start is still allowed. Zero disables offline grace.
    pub offline_grace_days: i64,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            account_id: "0d40f1ab-6a2b-4d90-b7cd-a33212cf1ab8".to_string(),
            product_id: "7f1c03de-5c92-44f8-9e4d-61b20c6e54d2".to_string(),
            api_base_url: "https://api.keygen.sh/v1".to_string(),
            request_timeout_secs: 30,
            machine_name_prefix: "Endostat".to_string(),
            offline_grace_days: 14,
        }
    }
}

impl LicenseConfig {
    /// Timeout for remote calls as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub(crate) fn validate_key_url(&self) -> String {
        format!(
            "{}/accounts/{}/licenses/actions/validate-key",
            self.api_base_url, self.account_id
        )
    }

    pub(crate) fn machines_url(&self) -> String {
        format!("{}/accounts/{}/machines", self.api_base_url, self.account_id)
    }

    pub(crate) fn machine_url(&self, machine_id: &str) -> String {
        format!("{}/{}", self.machines_url(), machine_id)
    }
}
