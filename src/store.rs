//! Data directory bootstrap and config/ledger persistence.

use anyhow::Result;

use crate::config::{Config, NestPaths};
use crate::ledger::Ledger;

/// Ensure the certnest home directory exists.
pub fn ensure_dirs(paths: &NestPaths) -> Result<()> {
    std::fs::create_dir_all(&paths.home)?;
    if let Some(p) = paths.config_file.parent() {
        std::fs::create_dir_all(p)?;
    }
    Ok(())
}

/// Load config from store.
pub fn load_config(paths: &NestPaths) -> Result<Config> {
    Config::load(paths)
}

/// Save config to store.
pub fn save_config(paths: &NestPaths, config: &Config) -> Result<()> {
    Config::save(config, paths)
}

/// Load the install ledger.
pub fn load_ledger(paths: &NestPaths) -> Result<Ledger> {
    Ledger::load(&paths.ledger_file)
}

/// Save the install ledger.
pub fn save_ledger(paths: &NestPaths, ledger: &Ledger) -> Result<()> {
    ledger.save(&paths.ledger_file)
}

/// Change the install ledger under its exclusive lock.
pub fn update_ledger<F, T>(paths: &NestPaths, f: F) -> Result<T>
where
    F: FnOnce(&mut Ledger) -> T,
{
    Ledger::update(&paths.ledger_file, f)
}
