use endostat_license::{LicenseCode, LicenseError};

#[test]
fn error_display_malformed_response() {
    let err = LicenseError::MalformedResponse("license id missing".into());
    let msg = format!("{err}");
    assert!(msg.contains("malformed response"));
    assert!(msg.contains("license id missing"));
}

#[test]
fn store_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err = LicenseError::from(endostat_store::StoreError::Io(io));
    assert!(format!("{err}").contains("state store error"));
}

#[test]
fn code_display_matches_remote_vocabulary() {
    assert_eq!(LicenseCode::NetworkError.to_string(), "NETWORK_ERROR");
    assert_eq!(
        LicenseCode::MachineLimitExceeded.to_string(),
        "MACHINE_LIMIT_EXCEEDED"
    );
    assert_eq!(LicenseCode::Other("OVERDUE".into()).to_string(), "OVERDUE");
}
