use endostat_crypto::KdfParams;
use endostat_store::EncryptedFileStore;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn open(dir: &TempDir, secret: &str) -> EncryptedFileStore {
    EncryptedFileStore::open_with_params(
        dir.path().join("state.json"),
        secret,
        &KdfParams::fast_insecure(),
    )
    .unwrap()
}

#[test]
fn missing_file_is_empty_store() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, "fp");
    assert_eq!(store.get("license").unwrap(), None);
    assert!(!store.contains("license"));
}

#[test]
fn set_get_delete() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, "fp");

    store.set("license", b"record").unwrap();
    assert_eq!(store.get("license").unwrap().as_deref(), Some(&b"record"[..]));
    assert!(store.contains("license"));

    assert!(store.delete("license").unwrap());
    assert_eq!(store.get("license").unwrap(), None);
    assert!(!store.delete("license").unwrap());
}

#[test]
fn survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir, "fp");
        store.set("license", b"persisted").unwrap();
        store.set("machine.registration", b"machine").unwrap();
    }
    let store = open(&dir, "fp");
    assert_eq!(
        store.get("license").unwrap().as_deref(),
        Some(&b"persisted"[..])
    );
    assert_eq!(
        store.get("machine.registration").unwrap().as_deref(),
        Some(&b"machine"[..])
    );
}

#[test]
fn delete_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir, "fp");
        store.set("license", b"persisted").unwrap();
        store.delete("license").unwrap();
    }
    let store = open(&dir, "fp");
    assert_eq!(store.get("license").unwrap(), None);
}

#[test]
fn wrong_secret_reads_as_absent() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir, "fingerprint-one");
        store.set("license", b"bound to machine one").unwrap();
    }
    // Cloned disk image scenario: same file, different machine secret.
    let store = open(&dir, "fingerprint-two");
    assert_eq!(store.get("license").unwrap(), None);
    // The record is still physically present until overwritten.
    assert!(store.contains("license"));
}

#[test]
fn corrupt_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store =
        EncryptedFileStore::open_with_params(&path, "fp", &KdfParams::fast_insecure()).unwrap();
    assert_eq!(store.get("license").unwrap(), None);

    // Writing replaces the corrupt file with a valid one.
    store.set("license", b"fresh").unwrap();
    let reopened =
        EncryptedFileStore::open_with_params(&path, "fp", &KdfParams::fast_insecure()).unwrap();
    assert_eq!(reopened.get("license").unwrap().as_deref(), Some(&b"fresh"[..]));
}

#[test]
fn flush_replaces_file_and_leaves_no_temp() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let store =
        EncryptedFileStore::open_with_params(&path, "fp", &KdfParams::fast_insecure()).unwrap();

    store.set("license", b"first").unwrap();
    store.set("license", b"second").unwrap();

    // The staging file is gone once the rename lands.
    assert!(!path.with_extension("tmp").exists());
    // And the final file is complete, parseable JSON.
    let raw = std::fs::read_to_string(&path).unwrap();
    serde_json::from_str::<serde_json::Value>(&raw).unwrap();
    assert_eq!(store.get("license").unwrap().as_deref(), Some(&b"second"[..]));
}

#[test]
fn values_are_not_plaintext_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let store =
        EncryptedFileStore::open_with_params(&path, "fp", &KdfParams::fast_insecure()).unwrap();
    store.set("license", b"SECRET-LICENSE-KEY").unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("SECRET-LICENSE-KEY"));
}

#[test]
fn tampered_entry_reads_as_absent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    {
        let store =
            EncryptedFileStore::open_with_params(&path, "fp", &KdfParams::fast_insecure()).unwrap();
        store.set("license", b"record").unwrap();
    }

    let mut raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    raw["entries"]["license"] = serde_json::Value::String("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".into());
    std::fs::write(&path, serde_json::to_string(&raw).unwrap()).unwrap();

    let store =
        EncryptedFileStore::open_with_params(&path, "fp", &KdfParams::fast_insecure()).unwrap();
    assert_eq!(store.get("license").unwrap(), None);
}
