//! Result codes shared across the licensing protocols.

use serde::{Deserialize, Serialize};

/// The code attached to a validation or activation outcome.
///
/// Most variants come straight from the remote authority's validate-key
/// response; `NetworkError`, `MachineLimitExceeded` and `ValidationError`
/// are synthesized locally so that callers see a single code vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LicenseCode {
    /// Key is valid and active.
    Valid,
    /// Key is real but past its expiry. Still treated as a legitimate
    /// key so the application can offer grace-period UX.
    Expired,
    /// Key has been suspended by the vendor.
    Suspended,
    /// Key is unknown to the remote authority.
    NotFound,
    /// The remote authority could not be reached. Recoverable; never
    /// means the key is wrong.
    NetworkError,
    /// The license is already bound to its maximum number of machines.
    MachineLimitExceeded,
    /// An unexpected local failure during the activation protocol.
    ValidationError,
    /// Any other code the remote authority returns (revoked, overdue,
    /// fingerprint scope mismatch, ...).
    Other(String),
}

impl LicenseCode {
    /// A key that validates as `VALID` or `EXPIRED` is cryptographically
    /// legitimate; expiry is a softer condition than invalidity.
    pub fn is_legitimate(&self) -> bool {
        matches!(self, Self::Valid | Self::Expired)
    }

    /// The remote authority's string form of this code.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Valid => "VALID",
            Self::Expired => "EXPIRED",
            Self::Suspended => "SUSPENDED",
            Self::NotFound => "NOT_FOUND",
            Self::NetworkError => "NETWORK_ERROR",
            Self::MachineLimitExceeded => "MACHINE_LIMIT_EXCEEDED",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Other(code) => code,
        }
    }
}

impl From<String> for LicenseCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "VALID" => Self::Valid,
            "EXPIRED" => Self::Expired,
            "SUSPENDED" => Self::Suspended,
            "NOT_FOUND" => Self::NotFound,
            "NETWORK_ERROR" => Self::NetworkError,
            "MACHINE_LIMIT_EXCEEDED" => Self::MachineLimitExceeded,
            "VALIDATION_ERROR" => Self::ValidationError,
            _ => Self::Other(code),
        }
    }
}

impl From<&str> for LicenseCode {
    fn from(code: &str) -> Self {
        Self::from(code.to_string())
    }
}

impl From<LicenseCode> for String {
    fn from(code: LicenseCode) -> Self {
        code.as_str().to_string()
    }
}

impl std::fmt::Display for LicenseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_codes_roundtrip() {
        for raw in ["VALID", "EXPIRED", "SUSPENDED", "NOT_FOUND", "OVERDUE"] {
            let code = LicenseCode::from(raw);
            assert_eq!(code.as_str(), raw);
        }
    }

    #[test]
    fn legitimacy() {
        assert!(LicenseCode::Valid.is_legitimate());
        assert!(LicenseCode::Expired.is_legitimate());
        assert!(!LicenseCode::Suspended.is_legitimate());
        assert!(!LicenseCode::NetworkError.is_legitimate());
        assert!(!LicenseCode::Other("FINGERPRINT_SCOPE_MISMATCH".into()).is_legitimate());
    }

    #[test]
    fn serde_as_string() {
        let json = serde_json::to_string(&LicenseCode::Valid).unwrap();
        assert_eq!(json, "\"VALID\"");
        let parsed: LicenseCode = serde_json::from_str("\"REVOKED\"").unwrap();
        assert_eq!(parsed, LicenseCode::Other("REVOKED".into()));
    }
}
