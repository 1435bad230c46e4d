//! Trust store abstraction and its implementations.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::codec::{self, Encoding, ParsedCertificate};
use crate::config::{Config, NestPaths, StoreKind};
use crate::error::StoreError;
use crate::fingerprint::Fingerprint;

pub mod deferred;

#[cfg(unix)]
pub mod unix;

#[cfg(windows)]
pub mod windows;

/// Env var that forces a [`DirTrustStore`] at the given path.
pub const TRUST_DIR_ENV: &str = "CERTNEST_TRUST_DIR";

/// Operations the installer needs from a platform trust store.
///
/// Calls may block (privilege prompts, user consent); each call is one complete unit of work.
pub trait TrustStore: Send + Sync {
    /// Fingerprints of every certificate currently trusted by this store.
    fn list_fingerprints(&self) -> Result<HashSet<Fingerprint>, StoreError>;
    /// Add a certificate under a display name.
    fn install(&self, certificate: &ParsedCertificate, name: &str) -> Result<(), StoreError>;
    /// Remove the certificate with this fingerprint.
    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError>;

    fn contains(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        Ok(self.list_fingerprints()?.contains(fingerprint))
    }
}

/// Pick the trust store for this configuration.
pub fn default_trust_store(paths: &NestPaths, config: &Config) -> Arc<dyn TrustStore> {
    if let Ok(dir) = std::env::var(TRUST_DIR_ENV) {
        return Arc::new(DirTrustStore::new(dir));
    }
    match config.store {
        StoreKind::Directory => Arc::new(DirTrustStore::new(config.store_dir(paths))),
        StoreKind::System => system_trust_store(),
    }
}

fn system_trust_store() -> Arc<dyn TrustStore> {
    #[cfg(unix)]
    return Arc::new(unix::SystemTrustStore::default());

    #[cfg(windows)]
    return Arc::new(windows::SystemTrustStore);
}

/// Fingerprints of every certificate in a concatenated PEM bundle; other blocks are skipped.
pub fn fingerprints_from_pem_bundle(pem: &[u8]) -> HashSet<Fingerprint> {
    let mut reader = pem;
    rustls_pemfile::certs(&mut reader)
        .filter_map(|r| r.ok())
        .map(|der| Fingerprint::of(der.as_ref()))
        .collect()
}

pub(crate) fn io_error(e: io::Error) -> StoreError {
    match e.kind() {
        io::ErrorKind::WouldBlock => StoreError::PlatformBusy(e.to_string()),
        _ => StoreError::PlatformDenied(e.to_string()),
    }
}

/// Display names end up in file comments and command lines; keep them on one line.
pub(crate) fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

const LOCK_FILE: &str = ".certnest.lock";

/// Trust store backed by a directory of PEM files (`<fingerprint>.crt`).
///
/// Listing fingerprints the decoded contents, not the file names, so files dropped in by
/// other tools count too. Writes hold an advisory lock; a held lock reports `PlatformBusy`.
#[derive(Debug, Clone)]
pub struct DirTrustStore {
    dir: PathBuf,
}

impl DirTrustStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a certificate with this fingerprint is written to.
    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.crt", fingerprint.to_hex()))
    }

    /// Files in the directory whose certificate has this fingerprint.
    pub fn files_for(&self, fingerprint: &Fingerprint) -> Result<Vec<PathBuf>, StoreError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|(_, cert)| &cert.fingerprint == fingerprint)
            .map(|(path, _)| path)
            .collect())
    }

    fn entries(&self) -> Result<Vec<(PathBuf, ParsedCertificate)>, StoreError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e)),
        };
        let mut out = Vec::new();
        for entry in read_dir {
            let path = entry.map_err(io_error)?.path();
            if !is_cert_file(&path) {
                continue;
            }
            let bytes = fs::read(&path).map_err(io_error)?;
            match codec::decode(&bytes, Encoding::Probe) {
                Ok(cert) => out.push((path, cert)),
                Err(e) => debug!(path = %path.display(), "skipping unreadable certificate: {e}"),
            }
        }
        Ok(out)
    }

    fn lock(&self) -> Result<fs::File, StoreError> {
        fs::create_dir_all(&self.dir).map_err(io_error)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(LOCK_FILE))
            .map_err(io_error)?;
        fs2::FileExt::try_lock_exclusive(&file).map_err(|e| {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                StoreError::PlatformBusy(format!("{} is locked", self.dir.display()))
            } else {
                io_error(e)
            }
        })?;
        Ok(file)
    }
}

fn is_cert_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("crt") | Some("pem") | Some("cer")
    )
}

impl TrustStore for DirTrustStore {
    fn list_fingerprints(&self) -> Result<HashSet<Fingerprint>, StoreError> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|(_, cert)| cert.fingerprint)
            .collect())
    }

    fn install(&self, certificate: &ParsedCertificate, name: &str) -> Result<(), StoreError> {
        let _lock = self.lock()?;
        let dest = self.path_for(&certificate.fingerprint);
        let tmp = self
            .dir
            .join(format!(".{}.tmp", certificate.fingerprint.to_hex()));
        let content = format!("# {}\n{}", sanitize_name(name), certificate.to_pem());
        fs::write(&tmp, content).map_err(io_error)?;
        fs::rename(&tmp, &dest).map_err(io_error)?;
        debug!(path = %dest.display(), "wrote certificate");
        Ok(())
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let _lock = self.lock()?;
        let matching = self.files_for(fingerprint)?;
        if matching.is_empty() {
            return Err(StoreError::NotFound(*fingerprint));
        }
        for path in matching {
            fs::remove_file(&path).map_err(io_error)?;
            debug!(path = %path.display(), "removed certificate");
        }
        Ok(())
    }
}
