//! Install orchestration: decode, validate, then hand off to the trust store.
//!
//! Every request ends in exactly one [`InstallResult`]. Requests for the same fingerprint
//! are serialized; an [`InstallRecord`] exists only for installs the trust store accepted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::codec::{self, CertificatePayload, ParsedCertificate};
use crate::config::DEFAULT_NAME;
use crate::error::{RejectReason, StoreError};
use crate::fingerprint::Fingerprint;
use crate::locks::FingerprintLocks;
use crate::platform::TrustStore;
use crate::validate::{validate, ValidationOutcome};

/// Source of "now" for validity checks and record timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

impl<F> Clock for F
where
    F: Fn() -> OffsetDateTime + Send + Sync,
{
    fn now(&self) -> OffsetDateTime {
        self()
    }
}

/// A certificate this installer knows to be in the trust store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub fingerprint: Fingerprint,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub installed_at: OffsetDateTime,
    /// Hex SHA-256 of the payload bytes the install came from.
    pub payload_sha256: String,
    #[serde(default)]
    pub subject: String,
    /// End of the certificate's validity; absent in ledgers written by hand.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub not_after: Option<OffsetDateTime>,
}

impl InstallRecord {
    fn new(
        certificate: &ParsedCertificate,
        name: String,
        payload: &CertificatePayload,
        installed_at: OffsetDateTime,
    ) -> Self {
        Self {
            fingerprint: certificate.fingerprint,
            name,
            installed_at,
            payload_sha256: payload.sha256_hex(),
            subject: certificate.subject.clone(),
            not_after: Some(certificate.not_after),
        }
    }
}

/// Outcome of one install request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallResult {
    Installed(InstallRecord),
    AlreadyInstalled(InstallRecord),
    Rejected(RejectReason),
    AdapterFailed(StoreError),
}

impl InstallResult {
    pub fn record(&self) -> Option<&InstallRecord> {
        match self {
            InstallResult::Installed(r) | InstallResult::AlreadyInstalled(r) => Some(r),
            InstallResult::Rejected(_) | InstallResult::AdapterFailed(_) => None,
        }
    }

    /// True for both fresh and idempotent installs.
    pub fn is_success(&self) -> bool {
        self.record().is_some()
    }
}

pub struct Installer {
    store: Arc<dyn TrustStore>,
    clock: Box<dyn Clock>,
    default_name: String,
    locks: FingerprintLocks,
    records: Mutex<HashMap<Fingerprint, InstallRecord>>,
}

impl Installer {
    pub fn new(store: Arc<dyn TrustStore>) -> Self {
        Self {
            store,
            clock: Box::new(SystemClock),
            default_name: DEFAULT_NAME.to_string(),
            locks: FingerprintLocks::new(),
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Fallback display name when neither request nor certificate carries one.
    pub fn with_default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    /// Seed known records (e.g. from a ledger).
    pub fn with_records(self, records: impl IntoIterator<Item = InstallRecord>) -> Self {
        {
            let mut map = self.records_mut();
            for r in records {
                map.insert(r.fingerprint, r);
            }
        }
        self
    }

    pub fn store(&self) -> &Arc<dyn TrustStore> {
        &self.store
    }

    /// Snapshot of known records, ordered by fingerprint.
    pub fn records(&self) -> Vec<InstallRecord> {
        let mut v: Vec<_> = self.records_mut().values().cloned().collect();
        v.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        v
    }

    pub fn record(&self, fingerprint: &Fingerprint) -> Option<InstallRecord> {
        self.records_mut().get(fingerprint).cloned()
    }

    /// Entry point for embedding applications: raw bytes plus an optional display name.
    pub fn install_certificate(&self, payload: &[u8], name: Option<&str>) -> InstallResult {
        let mut request = CertificatePayload::new(payload);
        if let Some(n) = name {
            request = request.with_name(n);
        }
        self.install(request)
    }

    pub fn install(&self, payload: CertificatePayload) -> InstallResult {
        // The fingerprint only exists after decoding; decoding touches no shared state.
        let certificate = match codec::decode_payload(&payload) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "rejected certificate payload");
                return InstallResult::Rejected(e.into());
            }
        };
        let fingerprint = certificate.fingerprint;
        let _section = self.locks.acquire(fingerprint);

        let existing = match self.store.list_fingerprints() {
            Ok(set) => set,
            Err(e) => {
                warn!(%fingerprint, error = %e, "could not read trust store");
                return InstallResult::AdapterFailed(e);
            }
        };

        let now = self.clock.now();
        match validate(certificate, now, &existing) {
            ValidationOutcome::Rejected(rejection) => {
                warn!(%fingerprint, error = %rejection, "rejected certificate");
                InstallResult::Rejected(rejection.into())
            }
            ValidationOutcome::Accepted {
                certificate,
                already_present: true,
            } => {
                let record = self.known_or_adopted(&certificate, &payload, now);
                info!(%fingerprint, name = %record.name, "certificate already installed");
                InstallResult::AlreadyInstalled(record)
            }
            ValidationOutcome::Accepted {
                certificate,
                already_present: false,
            } => {
                let name = self.display_name(&payload, &certificate);
                debug!(%fingerprint, %name, "handing certificate to trust store");
                if let Err(e) = self.store.install(&certificate, &name) {
                    warn!(%fingerprint, error = %e, "trust store refused certificate");
                    return InstallResult::AdapterFailed(e);
                }
                let record = InstallRecord::new(&certificate, name, &payload, self.clock.now());
                self.records_mut().insert(fingerprint, record.clone());
                info!(%fingerprint, name = %record.name, "certificate installed");
                InstallResult::Installed(record)
            }
        }
    }

    /// Remove a certificate from the trust store and forget its record.
    ///
    /// Returns the record that was dropped, if this installer knew one. A `NotFound` from the
    /// store also drops any stale record before the error is returned.
    pub fn uninstall(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<InstallRecord>, StoreError> {
        let _section = self.locks.acquire(*fingerprint);
        match self.store.remove(fingerprint) {
            Ok(()) => {
                let record = self.records_mut().remove(fingerprint);
                info!(%fingerprint, "certificate removed");
                Ok(record)
            }
            Err(StoreError::NotFound(fp)) => {
                if self.records_mut().remove(fingerprint).is_some() {
                    warn!(%fingerprint, "dropped record for certificate missing from trust store");
                }
                Err(StoreError::NotFound(fp))
            }
            Err(e) => {
                warn!(%fingerprint, error = %e, "trust store refused removal");
                Err(e)
            }
        }
    }

    fn display_name(
        &self,
        payload: &CertificatePayload,
        certificate: &ParsedCertificate,
    ) -> String {
        payload
            .name()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .or_else(|| {
                certificate
                    .common_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
            })
            .unwrap_or(self.default_name.as_str())
            .to_string()
    }

    /// Record for a fingerprint the store already has. Certificates installed by other
    /// tools get a record on first sight.
    fn known_or_adopted(
        &self,
        certificate: &ParsedCertificate,
        payload: &CertificatePayload,
        now: OffsetDateTime,
    ) -> InstallRecord {
        let mut records = self.records_mut();
        if let Some(existing) = records.get(&certificate.fingerprint) {
            return existing.clone();
        }
        let record = InstallRecord::new(
            certificate,
            self.display_name(payload, certificate),
            payload,
            now,
        );
        records.insert(certificate.fingerprint, record.clone());
        record
    }

    fn records_mut(&self) -> MutexGuard<'_, HashMap<Fingerprint, InstallRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
