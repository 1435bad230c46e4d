//! Trust stores whose install flow reports back through a callback.
//!
//! Mobile hosts launch a system install screen and learn the outcome later. The
//! [`DeferredTrustStore`] hands each request a one-shot [`Completion`] and blocks until the
//! host reports it, so nothing is recorded as installed before the host confirms it.
//!
//! The wait parks the calling thread. From async code, call the installer through
//! `spawn_blocking` so runtime workers stay free.

use std::collections::HashSet;
use std::sync::mpsc;

use super::TrustStore;
use crate::codec::ParsedCertificate;
use crate::error::StoreError;
use crate::fingerprint::Fingerprint;

/// One-shot outcome of a host-driven flow. Dropping it unreported counts as a denial.
#[derive(Debug)]
pub struct Completion {
    tx: mpsc::SyncSender<Result<(), StoreError>>,
}

impl Completion {
    fn pair() -> (Self, mpsc::Receiver<Result<(), StoreError>>) {
        // Capacity one: reporting never blocks the host.
        let (tx, rx) = mpsc::sync_channel(1);
        (Self { tx }, rx)
    }

    pub fn succeed(self) {
        self.report(Ok(()));
    }

    pub fn fail(self, error: StoreError) {
        self.report(Err(error));
    }

    pub fn report(self, result: Result<(), StoreError>) {
        // Receiver only goes away if the waiting thread died; nothing left to tell.
        let _ = self.tx.send(result);
    }
}

/// Host side of a callback-driven trust store.
pub trait PromptHost: Send + Sync {
    fn list_fingerprints(&self) -> Result<HashSet<Fingerprint>, StoreError>;
    /// Start the install flow; report through `done` when the user has finished.
    fn request_install(&self, certificate: &ParsedCertificate, name: &str, done: Completion);
    /// Start the removal flow; report through `done`.
    fn request_removal(&self, fingerprint: &Fingerprint, done: Completion);
}

pub struct DeferredTrustStore<H> {
    host: H,
}

impl<H: PromptHost> DeferredTrustStore<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

fn wait(rx: mpsc::Receiver<Result<(), StoreError>>) -> Result<(), StoreError> {
    match rx.recv() {
        Ok(result) => result,
        Err(_) => Err(StoreError::PlatformDenied(
            "install flow abandoned".to_string(),
        )),
    }
}

impl<H: PromptHost> TrustStore for DeferredTrustStore<H> {
    fn list_fingerprints(&self) -> Result<HashSet<Fingerprint>, StoreError> {
        self.host.list_fingerprints()
    }

    fn install(&self, certificate: &ParsedCertificate, name: &str) -> Result<(), StoreError> {
        let (done, rx) = Completion::pair();
        self.host.request_install(certificate, name, done);
        wait(rx)
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let (done, rx) = Completion::pair();
        self.host.request_removal(fingerprint, done);
        wait(rx)
    }
}
