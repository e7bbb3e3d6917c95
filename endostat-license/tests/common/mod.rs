#![allow(dead_code)]

use endostat_license::{
    FixedFingerprint, LicenseCode, LicenseConfig, LicenseManager, LicenseRecord,
    MachineRegistration, MemoryStateStore, StateStore,
};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_KEY: &str = "ABCD-1234-EFGH-5678";
pub const TEST_FINGERPRINT: &str = "fp-test-machine";
pub const LICENSE_ID: &str = "lic-0001";
pub const MACHINE_ID: &str = "mach-0001";

/// Base URL that refuses connections, for transport-failure tests.
pub const UNROUTABLE: &str = "http://127.0.0.1:9";

pub fn test_config(base_url: &str) -> LicenseConfig {
    LicenseConfig {
        account_id: "acct".to_string(),
        product_id: "prod".to_string(),
        api_base_url: base_url.to_string(),
        request_timeout_secs: 5,
        machine_name_prefix: "Endostat".to_string(),
        offline_grace_days: 14,
    }
}

pub struct Harness {
    pub store: Arc<MemoryStateStore>,
    pub manager: LicenseManager,
}

pub fn harness(server: &MockServer) -> Harness {
    harness_at(&server.uri(), TEST_FINGERPRINT)
}

pub fn harness_at(base_url: &str, fingerprint: &str) -> Harness {
    let store = Arc::new(MemoryStateStore::new());
    let manager = LicenseManager::with_fingerprint(
        test_config(base_url),
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::new(FixedFingerprint(fingerprint.to_string())),
    );
    Harness { store, manager }
}

/// A stored license as it looks after a successful activation.
pub fn stored_license(machine_registered: bool) -> LicenseRecord {
    LicenseRecord {
        key: TEST_KEY.to_string(),
        id: LICENSE_ID.to_string(),
        status: LicenseCode::Valid,
        expiry: None,
        plan: "standard".to_string(),
        features: Vec::new(),
        machine_registered,
        validated_at: Utc::now(),
    }
}

/// A stored license last validated `days_ago` days in the past.
pub fn stale_license(days_ago: i64) -> LicenseRecord {
    let mut record = stored_license(true);
    record.validated_at = Utc::now() - Duration::days(days_ago);
    record
}

pub fn stored_machine(fingerprint: &str) -> MachineRegistration {
    MachineRegistration {
        id: MACHINE_ID.to_string(),
        fingerprint: fingerprint.to_string(),
        registered_at: Utc::now(),
    }
}

// ── Remote authority canned responses ───────────────────────────

pub fn validation_body(valid: bool, code: &str) -> serde_json::Value {
    json!({
        "meta": { "valid": valid, "code": code },
        "data": {
            "id": LICENSE_ID,
            "attributes": {
                "expiry": "2030-06-01T00:00:00Z",
                "type": "standard",
                "features": ["exam-tracking"]
            }
        }
    })
}

pub async fn mock_validate_key(server: &MockServer, valid: bool, code: &str) {
    Mock::given(method("POST"))
        .and(path("/accounts/acct/licenses/actions/validate-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(validation_body(valid, code)))
        .mount(server)
        .await;
}

pub async fn mock_register_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/accounts/acct/machines"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "data": { "id": MACHINE_ID } })),
        )
        .mount(server)
        .await;
}

pub async fn mock_register_error(server: &MockServer, code: &str) {
    Mock::given(method("POST"))
        .and(path("/accounts/acct/machines"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "errors": [{ "code": code, "detail": "rejected" }]
        })))
        .mount(server)
        .await;
}

pub async fn mock_machine_probe(server: &MockServer, status: u16) {
    let template = if status == 200 {
        ResponseTemplate::new(200).set_body_json(json!({ "data": { "id": MACHINE_ID } }))
    } else {
        ResponseTemplate::new(status).set_body_json(json!({
            "errors": [{ "code": "NOT_FOUND", "detail": "machine not found" }]
        }))
    };
    Mock::given(method("GET"))
        .and(path(format!("/accounts/acct/machines/{MACHINE_ID}")))
        .respond_with(template)
        .mount(server)
        .await;
}
