//! Configuration loading and path resolution.
//!
//! Supports CERTNEST_HOME env var override for testing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "CERTNEST_HOME";

/// Display name used when neither the request nor the certificate provides one.
pub const DEFAULT_NAME: &str = "CA";

/// Paths for the certnest data directory.
#[derive(Debug, Clone)]
pub struct NestPaths {
    pub home: PathBuf,
    pub config_file: PathBuf,
    pub ledger_file: PathBuf,
    /// Default location of a directory-backed trust store.
    pub trust_dir: PathBuf,
}

impl NestPaths {
    /// Build paths from base directory (e.g. ProjectDirs data dir or CERTNEST_HOME).
    pub fn from_base(base: PathBuf) -> Self {
        Self {
            config_file: base.join("config.toml"),
            ledger_file: base.join("ledger.json"),
            trust_dir: base.join("trust"),
            home: base,
        }
    }

    /// Paths for testing: use a temp dir as base.
    pub fn for_test(base: impl AsRef<Path>) -> Self {
        Self::from_base(base.as_ref().to_path_buf())
    }

    /// Get default paths (respects CERTNEST_HOME).
    pub fn default_paths() -> Self {
        let base = if let Ok(home) = std::env::var(HOME_ENV) {
            PathBuf::from(home)
        } else if let Some(dirs) = directories::ProjectDirs::from("dev", "certnest", "certnest") {
            dirs.data_dir().to_path_buf()
        } else {
            PathBuf::from(".certnest")
        };
        Self::from_base(base)
    }
}

/// Which trust store the CLI talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    System,
    Directory,
}

/// Main config.toml structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreKind,
    /// Directory for `store = "directory"`; defaults to `<home>/trust`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,
    #[serde(default = "default_name")]
    pub default_name: String,
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            store_dir: None,
            default_name: default_name(),
        }
    }
}

impl Config {
    /// Load config from paths (with shared lock when file exists).
    pub fn load(paths: &NestPaths) -> Result<Config> {
        if paths.config_file.is_file() {
            let mut file = fs::OpenOptions::new().read(true).open(&paths.config_file)?;
            fs2::FileExt::lock_shared(&file)?;
            use std::io::Read;
            let mut s = String::new();
            file.read_to_string(&mut s)?;
            let cfg: Config = toml::from_str(&s)
                .with_context(|| format!("parse {}", paths.config_file.display()))?;
            Ok(cfg)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to paths (with exclusive lock). Creates parent dirs if needed.
    pub fn save(&self, paths: &NestPaths) -> Result<()> {
        if let Some(p) = paths.config_file.parent() {
            fs::create_dir_all(p)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&paths.config_file)?;
        fs2::FileExt::lock_exclusive(&file)?;
        file.set_len(0)?;
        let s = toml::to_string_pretty(self)?;
        use std::io::Write;
        file.write_all(s.as_bytes())?;
        Ok(())
    }

    /// Directory used when `store = "directory"`.
    pub fn store_dir(&self, paths: &NestPaths) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(|| paths.trust_dir.clone())
    }
}
