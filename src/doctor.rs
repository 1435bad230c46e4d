//! Doctor command: health checks for config, trust store and ledger.

use anyhow::Result;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::config::NestPaths;
use crate::platform::TrustStore;

/// Records expiring sooner than this are flagged.
pub const EXPIRY_WARNING_DAYS: i64 = 30;

/// Result of a single check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub ok: bool,
    pub message: String,
}

impl CheckResult {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Run all doctor checks.
pub fn run_checks(
    paths: &NestPaths,
    store: &dyn TrustStore,
    now: OffsetDateTime,
) -> Result<Vec<CheckResult>> {
    let mut results = Vec::new();

    // 1. Config parses
    match crate::store::load_config(paths) {
        Ok(cfg) => results.push(CheckResult::pass(format!(
            "Config OK (store: {:?}, default name: {})",
            cfg.store, cfg.default_name
        ))),
        Err(e) => results.push(CheckResult::fail(format!(
            "Cannot read {}: {e:#}",
            paths.config_file.display()
        ))),
    }

    // 2. Trust store reachable
    let installed = match store.list_fingerprints() {
        Ok(set) => {
            results.push(CheckResult::pass(format!(
                "Trust store reachable ({} certificate(s))",
                set.len()
            )));
            Some(set)
        }
        Err(e) => {
            results.push(CheckResult::fail(format!("Trust store unavailable: {e}")));
            None
        }
    };

    // 3. Every ledger record is still trusted and not about to expire
    let ledger = crate::store::load_ledger(paths)?;
    if ledger.records.is_empty() {
        results.push(CheckResult::pass("No certificates installed by certnest."));
        return Ok(results);
    }

    let soon = now + Duration::days(EXPIRY_WARNING_DAYS);
    for record in &ledger.records {
        let label = format!("[{}] {}", record.fingerprint.short(), record.name);

        if let Some(set) = &installed {
            if set.contains(&record.fingerprint) {
                results.push(CheckResult::pass(format!("{label} present in trust store")));
            } else {
                results.push(CheckResult::fail(format!(
                    "{label} missing from trust store. Run 'certnest install' again."
                )));
            }
        }

        match record.not_after {
            Some(not_after) if not_after < now => {
                results.push(CheckResult::fail(format!("{label} expired at {not_after}")));
            }
            Some(not_after) if not_after < soon => {
                results.push(CheckResult::fail(format!(
                    "{label} expires within {EXPIRY_WARNING_DAYS} days ({not_after})"
                )));
            }
            Some(_) => {}
            None => debug!(fingerprint = %record.fingerprint, "record has no expiry date"),
        }
    }

    Ok(results)
}
