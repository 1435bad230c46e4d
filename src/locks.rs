//! Per-fingerprint mutual exclusion.
//!
//! Requests for different fingerprints never wait on each other. The guard releases on
//! drop, so every exit path of a critical section gives the fingerprint back.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

use crate::fingerprint::Fingerprint;

#[derive(Debug, Default)]
pub struct FingerprintLocks {
    held: Mutex<HashSet<Fingerprint>>,
    released: Condvar,
}

impl FingerprintLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `fingerprint` is free, then hold it until the guard drops.
    pub fn acquire(&self, fingerprint: Fingerprint) -> FingerprintGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(&fingerprint) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(fingerprint);
        FingerprintGuard {
            locks: self,
            fingerprint,
        }
    }

    /// Whether some caller currently holds `fingerprint`.
    pub fn is_held(&self, fingerprint: &Fingerprint) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(fingerprint)
    }
}

#[derive(Debug)]
pub struct FingerprintGuard<'a> {
    locks: &'a FingerprintLocks,
    fingerprint: Fingerprint,
}

impl FingerprintGuard<'_> {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl Drop for FingerprintGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.fingerprint);
        drop(held);
        self.locks.released.notify_all();
    }
}
