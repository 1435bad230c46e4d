//! Install ledger: records persisted between CLI runs (ledger.json).
//!
//! Concurrent CLI runs share one file. Changes go through [`Ledger::update`], which re-reads the
//! file under an exclusive lock on `ledger.json.lock` and merges by fingerprint, so one run never
//! drops records written by another.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::fingerprint::Fingerprint;
use crate::installer::{InstallRecord, InstallResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub records: Vec<InstallRecord>,
}

impl Ledger {
    pub fn from_records(records: Vec<InstallRecord>) -> Self {
        Self { records }
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&InstallRecord> {
        self.records.iter().find(|r| &r.fingerprint == fingerprint)
    }

    /// Insert or replace the record for its fingerprint.
    pub fn upsert(&mut self, record: InstallRecord) {
        match self
            .records
            .iter_mut()
            .find(|r| r.fingerprint == record.fingerprint)
        {
            Some(existing) => *existing = record,
            None => {
                self.records.push(record);
                self.records.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
            }
        }
    }

    /// Drop the record for `fingerprint`; returns it if there was one.
    pub fn remove(&mut self, fingerprint: &Fingerprint) -> Option<InstallRecord> {
        let idx = self
            .records
            .iter()
            .position(|r| &r.fingerprint == fingerprint)?;
        Some(self.records.remove(idx))
    }

    /// Fold one install outcome in. A fresh install replaces any older record; an idempotent
    /// one only fills a gap, so the original record survives.
    pub fn apply(&mut self, result: &InstallResult) {
        match result {
            InstallResult::Installed(record) => self.upsert(record.clone()),
            InstallResult::AlreadyInstalled(record) => {
                if self.get(&record.fingerprint).is_none() {
                    self.upsert(record.clone());
                }
            }
            InstallResult::Rejected(_) | InstallResult::AdapterFailed(_) => {}
        }
    }

    /// Load ledger from path (with shared lock when file exists).
    pub fn load(path: &Path) -> Result<Ledger> {
        if !path.is_file() {
            return Ok(Ledger::default());
        }
        let mut file = fs::OpenOptions::new().read(true).open(path)?;
        fs2::FileExt::lock_shared(&file)?;
        let mut s = String::new();
        file.read_to_string(&mut s)?;
        if s.trim().is_empty() {
            return Ok(Ledger::default());
        }
        serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
    }

    /// Save ledger to path (with exclusive lock). Creates parent dirs if needed.
    ///
    /// The file is truncated only once the lock is held.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(p) = path.parent() {
            fs::create_dir_all(p)?;
        }
        let s = serde_json::to_string_pretty(self)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        fs2::FileExt::lock_exclusive(&file)?;
        file.set_len(0)?;
        file.write_all(s.as_bytes())?;
        Ok(())
    }

    /// Read-modify-write under an exclusive lock held from load through save.
    pub fn update<F, T>(path: &Path, f: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger) -> T,
    {
        if let Some(p) = path.parent() {
            fs::create_dir_all(p)?;
        }
        let lock_path = lock_path(path);
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("open {}", lock_path.display()))?;
        fs2::FileExt::lock_exclusive(&lock)?;

        let mut ledger = Self::load(path)?;
        let out = f(&mut ledger);
        ledger.save(path)?;
        Ok(out)
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}
