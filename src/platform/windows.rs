//! Windows current-user ROOT store.

use std::collections::HashSet;
use std::process::Command;

use super::{io_error, TrustStore};
use crate::codec::ParsedCertificate;
use crate::error::StoreError;
use crate::fingerprint::Fingerprint;

const LIST_SCRIPT: &str = "Get-ChildItem Cert:\\CurrentUser\\Root | ForEach-Object { \
     $_.GetCertHashString([System.Security.Cryptography.HashAlgorithmName]::SHA256) }";

fn powershell(script: &str) -> Result<String, StoreError> {
    let output = Command::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command", script])
        .output()
        .map_err(|e| StoreError::PlatformDenied(format!("powershell: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(StoreError::PlatformDenied(format!("powershell failed: {stderr}")));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub struct SystemTrustStore;

impl TrustStore for SystemTrustStore {
    fn list_fingerprints(&self) -> Result<HashSet<Fingerprint>, StoreError> {
        let stdout = powershell(LIST_SCRIPT)?;
        Ok(stdout
            .lines()
            .filter_map(|line| line.trim().parse::<Fingerprint>().ok())
            .collect())
    }

    fn install(&self, certificate: &ParsedCertificate, _name: &str) -> Result<(), StoreError> {
        let staged = std::env::temp_dir()
            .join(format!("certnest-{}.crt", certificate.fingerprint.short()));
        std::fs::write(&staged, certificate.to_pem()).map_err(io_error)?;
        // certutil shows the consent dialog for ROOT and exits non-zero when it is declined.
        let status = Command::new("certutil")
            .args(["-addstore", "-user", "ROOT", &staged.to_string_lossy()])
            .status();
        let _ = std::fs::remove_file(&staged);
        let status = status.map_err(|e| StoreError::PlatformDenied(format!("certutil: {e}")))?;
        if !status.success() {
            return Err(StoreError::PlatformDenied(format!(
                "certutil -addstore failed ({status})"
            )));
        }
        Ok(())
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        if !self.contains(fingerprint)? {
            return Err(StoreError::NotFound(*fingerprint));
        }
        let hash = fingerprint.to_hex().to_uppercase();
        powershell(&format!(
            "Get-ChildItem Cert:\\CurrentUser\\Root | Where-Object {{ \
             $_.GetCertHashString(\
             [System.Security.Cryptography.HashAlgorithmName]::SHA256) -eq '{hash}' \
             }} | Remove-Item"
        ))?;
        Ok(())
    }
}
