//! Install outcomes against a mock trust store.

mod common;

use certnest::error::{DecodeError, RejectReason, Rejection};
use certnest::fingerprint::Fingerprint;
use certnest::installer::{InstallResult, Installer};
use certnest::CertificatePayload;
use common::MockTrustStore;
use std::sync::Arc;
use time::Duration;

fn installer(store: &Arc<MockTrustStore>) -> Installer {
    Installer::new(store.clone())
}

#[test]
fn installs_named_certificate() {
    let store = Arc::new(MockTrustStore::new());
    let installer = installer(&store);
    let cert = common::ca_cert("Test CA");

    let result = installer.install_certificate(cert.pem.as_bytes(), Some("Test CA"));

    let fp = Fingerprint::of(&cert.der);
    match &result {
        InstallResult::Installed(record) => {
            assert_eq!(record.fingerprint, fp);
            assert_eq!(record.name, "Test CA");
            assert_eq!(record.not_after, Some(cert.not_after));
            assert_eq!(
                record.payload_sha256,
                CertificatePayload::new(cert.pem.as_bytes()).sha256_hex()
            );
        }
        other => panic!("expected Installed, got {other:?}"),
    }
    assert!(store.trusted().contains(&fp));
    assert_eq!(store.installs(), vec![(fp, "Test CA".to_string())]);
    assert_eq!(installer.record(&fp).as_ref(), result.record());
}

#[test]
fn second_install_is_idempotent() {
    let store = Arc::new(MockTrustStore::new());
    let installer = installer(&store);
    let cert = common::ca_cert("Test CA");

    let first = installer.install_certificate(&cert.der, Some("Test CA"));
    let second = installer.install_certificate(&cert.der, Some("Test CA"));

    assert!(matches!(first, InstallResult::Installed(_)));
    match second {
        InstallResult::AlreadyInstalled(record) => assert_eq!(Some(&record), first.record()),
        other => panic!("expected AlreadyInstalled, got {other:?}"),
    }
    assert_eq!(store.installs().len(), 1);
    assert_eq!(installer.records().len(), 1);
}

#[test]
fn pem_and_der_of_same_certificate_are_one_install() {
    let store = Arc::new(MockTrustStore::new());
    let installer = installer(&store);
    let cert = common::ca_cert("Test CA");

    assert!(matches!(
        installer.install_certificate(cert.pem.as_bytes(), None),
        InstallResult::Installed(_)
    ));
    assert!(matches!(
        installer.install_certificate(&cert.der, None),
        InstallResult::AlreadyInstalled(_)
    ));
    assert_eq!(store.installs().len(), 1);
}

#[test]
fn empty_payload_is_rejected_without_store_calls() {
    let store = Arc::new(MockTrustStore::new());
    let installer = installer(&store);

    let result = installer.install_certificate(&[], Some("Test CA"));

    assert_eq!(
        result,
        InstallResult::Rejected(RejectReason::Decode(DecodeError::EmptyInput))
    );
    assert!(store.installs().is_empty());
    assert!(installer.records().is_empty());
}

#[test]
fn expired_certificate_is_rejected() {
    let store = Arc::new(MockTrustStore::new());
    let installer = installer(&store);
    let now = common::now();
    let cert = common::ca_cert_valid(
        Some("Old CA"),
        now - Duration::days(10),
        now - Duration::days(1),
    );

    let result = installer.install_certificate(&cert.der, None);

    assert!(matches!(
        result,
        InstallResult::Rejected(RejectReason::Invalid(Rejection::Expired { .. }))
    ));
    assert!(store.installs().is_empty());
}

#[test]
fn injected_clock_drives_validity() {
    let store = Arc::new(MockTrustStore::new());
    let cert = common::ca_cert("Test CA");
    let before = cert.not_before - Duration::hours(1);
    let installer = Installer::new(store.clone()).with_clock(move || before);

    assert!(matches!(
        installer.install_certificate(&cert.der, None),
        InstallResult::Rejected(RejectReason::Invalid(Rejection::NotYetValid { .. }))
    ));
}

#[test]
fn name_falls_back_to_common_name_then_default() {
    let store = Arc::new(MockTrustStore::new());
    let installer = installer(&store).with_default_name("Fallback");

    let named = common::ca_cert("Named CA");
    let result = installer.install_certificate(&named.der, Some("   "));
    assert_eq!(result.record().unwrap().name, "Named CA");

    let now = common::now();
    let anonymous = common::ca_cert_valid(None, now, now + Duration::days(1));
    let result = installer.install_certificate(&anonymous.der, None);
    assert_eq!(result.record().unwrap().name, "Fallback");
}

#[test]
fn default_name_is_ca() {
    let store = Arc::new(MockTrustStore::new());
    let installer = installer(&store);
    let now = common::now();
    let anonymous = common::ca_cert_valid(None, now, now + Duration::days(1));

    let result = installer.install_certificate(&anonymous.pem.into_bytes(), None);
    assert_eq!(result.record().unwrap().name, "CA");
}

#[test]
fn adopts_certificate_installed_elsewhere() {
    let store = Arc::new(MockTrustStore::new());
    let cert = common::ca_cert("Test CA");
    let fp = Fingerprint::of(&cert.der);
    store.preload(fp);
    let installer = installer(&store);

    let result = installer.install_certificate(&cert.der, Some("Adopted"));

    match result {
        InstallResult::AlreadyInstalled(record) => assert_eq!(record.name, "Adopted"),
        other => panic!("expected AlreadyInstalled, got {other:?}"),
    }
    assert!(store.installs().is_empty());
    assert!(installer.record(&fp).is_some());
}
