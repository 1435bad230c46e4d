//! Shared test helpers.
#![allow(dead_code)]

use certnest::codec::ParsedCertificate;
use certnest::error::StoreError;
use certnest::fingerprint::Fingerprint;
use certnest::platform::TrustStore;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, IsCa, KeyPair,
};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use time::OffsetDateTime;

/// Create a temp directory for use as CERTNEST_HOME.
/// Uses current dir (workspace) so sandbox allows full access.
pub fn temp_home() -> TempDir {
    tempfile::Builder::new()
        .prefix("certnest_test_")
        .tempdir_in(std::env::current_dir().unwrap_or_else(|_| std::path::Path::new(".").into()))
        .expect("temp dir")
}

/// Run a closure with CERTNEST_HOME set to the given path.
pub fn with_test_env<F, R>(home: &std::path::Path, f: F) -> R
where
    F: FnOnce() -> R,
{
    let prev = std::env::var_os("CERTNEST_HOME");
    std::env::set_var("CERTNEST_HOME", home);
    let r = f();
    match prev {
        Some(v) => std::env::set_var("CERTNEST_HOME", v),
        None => std::env::remove_var("CERTNEST_HOME"),
    }
    r
}

/// Current time at whole-second precision (certificate validity has no sub-seconds).
pub fn now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(OffsetDateTime::now_utc().unix_timestamp()).unwrap()
}

/// A generated certificate in both encodings.
pub struct TestCert {
    pub pem: String,
    pub der: Vec<u8>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// Self-signed CA valid from `not_before` to `not_after`.
pub fn ca_cert_valid(
    common_name: Option<&str>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
) -> TestCert {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, DnValue::Utf8String("certnest tests".to_string()));
    if let Some(cn) = common_name {
        dn.push(DnType::CommonName, DnValue::Utf8String(cn.to_string()));
    }
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.not_before = not_before;
    params.not_after = not_after;

    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    TestCert {
        pem: cert.pem(),
        der: cert.der().to_vec(),
        not_before,
        not_after,
    }
}

/// Self-signed CA valid from yesterday for a year.
pub fn ca_cert(common_name: &str) -> TestCert {
    let now = now();
    ca_cert_valid(
        Some(common_name),
        now - time::Duration::days(1),
        now + time::Duration::days(365),
    )
}

/// PEM-encoded private key, for payloads that carry a non-certificate block.
pub fn key_pem() -> String {
    KeyPair::generate().unwrap().serialize_pem()
}

/// In-memory trust store that records calls.
#[derive(Default)]
pub struct MockTrustStore {
    trusted: Mutex<HashSet<Fingerprint>>,
    installs: Mutex<Vec<(Fingerprint, String)>>,
    removals: Mutex<Vec<Fingerprint>>,
    fail_with: Mutex<Option<StoreError>>,
    list_error: Mutex<Option<StoreError>>,
    delay: Option<Duration>,
}

impl MockTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every install call sleeps this long before succeeding.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Pretend another tool already trusted this certificate.
    pub fn preload(&self, fingerprint: Fingerprint) {
        self.trusted.lock().unwrap().insert(fingerprint);
    }

    /// Make install and remove calls fail with `error`.
    pub fn fail_with(&self, error: StoreError) {
        *self.fail_with.lock().unwrap() = Some(error);
    }

    pub fn fail_listing(&self, error: StoreError) {
        *self.list_error.lock().unwrap() = Some(error);
    }

    pub fn installs(&self) -> Vec<(Fingerprint, String)> {
        self.installs.lock().unwrap().clone()
    }

    pub fn removals(&self) -> Vec<Fingerprint> {
        self.removals.lock().unwrap().clone()
    }

    pub fn trusted(&self) -> HashSet<Fingerprint> {
        self.trusted.lock().unwrap().clone()
    }
}

impl TrustStore for MockTrustStore {
    fn list_fingerprints(&self) -> Result<HashSet<Fingerprint>, StoreError> {
        if let Some(e) = self.list_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.trusted())
    }

    fn install(&self, certificate: &ParsedCertificate, name: &str) -> Result<(), StoreError> {
        self.installs
            .lock()
            .unwrap()
            .push((certificate.fingerprint, name.to_string()));
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        if let Some(e) = self.fail_with.lock().unwrap().clone() {
            return Err(e);
        }
        self.trusted.lock().unwrap().insert(certificate.fingerprint);
        Ok(())
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        self.removals.lock().unwrap().push(*fingerprint);
        if let Some(e) = self.fail_with.lock().unwrap().clone() {
            return Err(e);
        }
        if self.trusted.lock().unwrap().remove(fingerprint) {
            Ok(())
        } else {
            Err(StoreError::NotFound(*fingerprint))
        }
    }
}
