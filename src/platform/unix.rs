//! Unix (macOS, Linux) system trust stores.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use super::{io_error, DirTrustStore, TrustStore};
use crate::codec::ParsedCertificate;
use crate::error::StoreError;
use crate::fingerprint::Fingerprint;

#[cfg(target_os = "macos")]
const SYSTEM_KEYCHAIN: &str = "/Library/Keychains/System.keychain";

const ANCHORS_DIR: &str = "/usr/local/share/ca-certificates";
const SYSTEM_BUNDLE: &str = "/etc/ssl/certs/ca-certificates.crt";

/// The OS trust store. Privileged steps go through `pkexec` (Linux) or an
/// administrator `osascript` prompt (macOS); a dismissed prompt is `PlatformDenied`.
#[derive(Debug, Clone)]
pub struct SystemTrustStore {
    anchors_dir: PathBuf,
    bundle: PathBuf,
}

impl Default for SystemTrustStore {
    fn default() -> Self {
        Self {
            anchors_dir: PathBuf::from(ANCHORS_DIR),
            bundle: PathBuf::from(SYSTEM_BUNDLE),
        }
    }
}

impl SystemTrustStore {
    /// Linux layout rooted elsewhere (containers, chroots).
    pub fn with_layout(anchors_dir: impl Into<PathBuf>, bundle: impl Into<PathBuf>) -> Self {
        Self {
            anchors_dir: anchors_dir.into(),
            bundle: bundle.into(),
        }
    }

    #[cfg_attr(target_os = "macos", allow(dead_code))]
    fn anchors(&self) -> DirTrustStore {
        DirTrustStore::new(&self.anchors_dir)
    }

    #[cfg_attr(target_os = "macos", allow(dead_code))]
    fn bundle_fingerprints(&self) -> Result<HashSet<Fingerprint>, StoreError> {
        match std::fs::read(&self.bundle) {
            Ok(pem) => Ok(super::fingerprints_from_pem_bundle(&pem)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
            Err(e) => Err(io_error(e)),
        }
    }
}

/// Run a command; spawn failure or non-zero exit is reported as denied.
fn run(cmd: &mut Command, what: &str) -> Result<Output, StoreError> {
    let output = cmd
        .output()
        .map_err(|e| StoreError::PlatformDenied(format!("{what}: {e}")))?;
    if output.status.success() {
        return Ok(output);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(StoreError::PlatformDenied(format!(
        "{what} failed ({}): {stderr}",
        output.status
    )))
}

/// Stage the certificate where privileged tools can read it.
fn write_staging(certificate: &ParsedCertificate) -> Result<PathBuf, StoreError> {
    let path = std::env::temp_dir()
        .join(format!("certnest-{}.crt", certificate.fingerprint.short()));
    std::fs::write(&path, certificate.to_pem()).map_err(io_error)?;
    Ok(path)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(target_os = "macos")]
fn admin_shell(script: &str, what: &str) -> Result<Output, StoreError> {
    run(
        Command::new("osascript").args([
            "-e",
            &format!(
                "do shell script \"{}\" with administrator privileges",
                script.replace('\\', "\\\\").replace('"', "\\\"")
            ),
        ]),
        what,
    )
}

impl TrustStore for SystemTrustStore {
    fn list_fingerprints(&self) -> Result<HashSet<Fingerprint>, StoreError> {
        #[cfg(target_os = "macos")]
        {
            let output = run(
                Command::new("security").args(["find-certificate", "-a", "-p", SYSTEM_KEYCHAIN]),
                "security find-certificate",
            )?;
            Ok(super::fingerprints_from_pem_bundle(&output.stdout))
        }

        #[cfg(not(target_os = "macos"))]
        {
            let mut set = self.bundle_fingerprints()?;
            set.extend(self.anchors().list_fingerprints()?);
            Ok(set)
        }
    }

    fn install(&self, certificate: &ParsedCertificate, name: &str) -> Result<(), StoreError> {
        let staged = write_staging(certificate)?;
        debug!(name, fingerprint = %certificate.fingerprint, "installing into system trust store");

        #[cfg(target_os = "macos")]
        let result = admin_shell(
            &format!(
                "security add-trusted-cert -d -r trustRoot -k {SYSTEM_KEYCHAIN} '{}'",
                path_arg(&staged).replace('\'', "'\\''")
            ),
            "security add-trusted-cert",
        )
        .map(|_| ());

        #[cfg(not(target_os = "macos"))]
        let result = {
            let dest = self
                .anchors_dir
                .join(format!("certnest-{}.crt", certificate.fingerprint.short()));
            run(
                Command::new("pkexec").args(["cp", &path_arg(&staged), &path_arg(&dest)]),
                "pkexec cp",
            )
            .and_then(|_| {
                run(
                    Command::new("pkexec").arg("update-ca-certificates"),
                    "pkexec update-ca-certificates",
                )
            })
            .map(|_| ())
        };

        let _ = std::fs::remove_file(&staged);
        result
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        #[cfg(target_os = "macos")]
        {
            if !self.contains(fingerprint)? {
                return Err(StoreError::NotFound(*fingerprint));
            }
            admin_shell(
                &format!(
                    "security delete-certificate -Z {} {SYSTEM_KEYCHAIN}",
                    fingerprint.to_hex().to_uppercase()
                ),
                "security delete-certificate",
            )?;
            Ok(())
        }

        #[cfg(not(target_os = "macos"))]
        {
            let files = self.anchors().files_for(fingerprint)?;
            if files.is_empty() {
                if self.bundle_fingerprints()?.contains(fingerprint) {
                    return Err(StoreError::PlatformDenied(
                        "certificate is shipped by the distribution bundle".to_string(),
                    ));
                }
                return Err(StoreError::NotFound(*fingerprint));
            }
            for file in &files {
                run(
                    Command::new("pkexec").args(["rm", "-f", &path_arg(file)]),
                    "pkexec rm",
                )?;
            }
            run(
                Command::new("pkexec").args(["update-ca-certificates", "--fresh"]),
                "pkexec update-ca-certificates",
            )?;
            Ok(())
        }
    }
}
