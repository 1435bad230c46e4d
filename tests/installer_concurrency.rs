//! Concurrent installs of one certificate reach the trust store once.

mod common;

use certnest::fingerprint::Fingerprint;
use certnest::installer::{InstallResult, Installer};
use common::MockTrustStore;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn concurrent_same_certificate_installs_once() {
    let store = Arc::new(MockTrustStore::with_delay(Duration::from_millis(50)));
    let installer = Installer::new(store.clone());
    let cert = common::ca_cert("Test CA");

    let barrier = Barrier::new(2);
    let (installer, barrier, pem) = (&installer, &barrier, cert.pem.as_bytes());
    let results: Vec<InstallResult> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(move || {
                    barrier.wait();
                    installer.install_certificate(pem, Some("Test CA"))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(store.installs().len(), 1);
    let installed = results
        .iter()
        .filter(|r| matches!(r, InstallResult::Installed(_)))
        .count();
    let already = results
        .iter()
        .filter(|r| matches!(r, InstallResult::AlreadyInstalled(_)))
        .count();
    assert_eq!((installed, already), (1, 1));
    assert_eq!(results[0].record(), results[1].record());
}

#[test]
fn different_certificates_install_independently() {
    let store = Arc::new(MockTrustStore::with_delay(Duration::from_millis(20)));
    let installer = Installer::new(store.clone());
    let certs: Vec<_> = (0..4)
        .map(|i| common::ca_cert(&format!("CA {i}")))
        .collect();

    let barrier = Barrier::new(certs.len());
    thread::scope(|s| {
        for cert in &certs {
            let installer = &installer;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                assert!(matches!(
                    installer.install_certificate(&cert.der, None),
                    InstallResult::Installed(_)
                ));
            });
        }
    });

    assert_eq!(store.installs().len(), certs.len());
    for cert in &certs {
        assert!(installer.record(&Fingerprint::of(&cert.der)).is_some());
    }
}
