//! Machine fingerprinting for license binding.
//!
//! The fingerprint identifies one physical machine to the remote
//! authority. The primary source is the OS machine id, which survives
//! reinstalls. When that is unavailable the provider falls back to a
//! hash of hostname, architecture, platform and the application data
//! directory — stable across restarts of the same install, but it
//! changes if the application is reinstalled under a different data
//! directory. That weaker stability is a documented limitation of the
//! fallback, not something this module masks.

use sha2::{Digest, Sha256};
use std::env;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Source of the current machine's fingerprint.
///
/// Must never fail: implementations always produce a deterministic
/// string for the host they run on.
pub trait FingerprintProvider: Send + Sync {
    /// Returns the fingerprint of the machine this process runs on.
    fn machine_fingerprint(&self) -> String;
}

/// Production fingerprint provider backed by the OS machine id.
#[derive(Debug, Clone, Default)]
pub struct SystemFingerprint;

impl FingerprintProvider for SystemFingerprint {
    fn machine_fingerprint(&self) -> String {
        match machine_id() {
            Some(id) if !id.is_empty() => {
                debug!("machine fingerprint from OS machine id");
                id
            }
            _ => {
                warn!("machine id unavailable, using composite fallback fingerprint");
                fallback_fingerprint()
            }
        }
    }
}

/// Fixed fingerprint for tests and simulated-hardware scenarios.
#[derive(Debug, Clone)]
pub struct FixedFingerprint(pub String);

impl FingerprintProvider for FixedFingerprint {
    fn machine_fingerprint(&self) -> String {
        self.0.clone()
    }
}

/// Deterministic composite of host identity and install location.
fn fallback_fingerprint() -> String {
    let composite = format!(
        "{}|{}|{}|{}",
        get_hostname(),
        env::consts::ARCH,
        env::consts::OS,
        app_data_dir().display()
    );
    let mut hasher = Sha256::new();
    hasher.update(composite.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Gets the machine hostname.
fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// The per-user application data directory for this install.
fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Endostat")
}

/// Gets the OS machine id (platform-specific stable identifier).
fn machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("reg")
            .args([
                "query",
                r"HKLM\SOFTWARE\Microsoft\Cryptography",
                "/v",
                "MachineGuid",
            ])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .split_whitespace()
                    .last()
                    .map(|guid| guid.to_string())
            })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}
