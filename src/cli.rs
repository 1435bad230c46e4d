//! CLI definitions and command routing.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::codec::{self, CertificatePayload, Encoding, Format, ParsedCertificate};
use crate::config::NestPaths;
use crate::error::StoreError;
use crate::fingerprint::Fingerprint;
use crate::installer::{InstallResult, Installer};
use crate::ledger::Ledger;
use crate::platform::default_trust_store;
use crate::serve::handoff::{self, Handoff};
use crate::store;
use crate::validate::{validate, ValidationOutcome};

#[derive(Parser)]
#[command(name = "certnest")]
#[command(about = "Validate certificates and install them into a trust store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// One-time setup: creates the data directory, default config and empty ledger
    Init,

    /// Decode, validate and install a certificate (PEM or DER; "-" reads stdin)
    Install {
        file: PathBuf,
        /// Display name shown by the trust store
        #[arg(long)]
        name: Option<String>,
        /// Encoding of the input; probe tries PEM first, then DER
        #[arg(long, value_enum, default_value_t = EncodingArg::Probe)]
        encoding: EncodingArg,
    },

    /// Remove a certificate from the trust store by SHA-256 fingerprint
    Uninstall { fingerprint: String },

    /// List certificates installed through certnest
    List,

    /// Decode and validate a certificate without installing it
    Inspect {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = EncodingArg::Probe)]
        encoding: EncodingArg,
    },

    /// Re-encode a certificate as PEM or DER
    Convert {
        file: PathBuf,
        #[arg(long, value_enum)]
        to: FormatArg,
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Serve a certificate over local HTTP for a device browser to download
    Serve {
        file: PathBuf,
        #[arg(long, default_value_t = handoff::DEFAULT_PORT)]
        port: u16,
        /// Download name (defaults to the certificate's common name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Check config, trust store and installed certificates
    Doctor,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum EncodingArg {
    /// PEM if framed, DER otherwise
    Probe,
    Pem,
    Der,
}

impl From<EncodingArg> for Encoding {
    fn from(e: EncodingArg) -> Self {
        match e {
            EncodingArg::Probe => Encoding::Probe,
            EncodingArg::Pem => Encoding::Pem,
            EncodingArg::Der => Encoding::Der,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Pem,
    Der,
}

impl From<FormatArg> for Format {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Pem => Format::Pem,
            FormatArg::Der => Format::Der,
        }
    }
}

/// Run CLI and dispatch to handlers.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = NestPaths::default_paths();

    match cli.command {
        Commands::Init => cmd_init(&paths),
        Commands::Install {
            file,
            name,
            encoding,
        } => cmd_install(&paths, &file, name, encoding.into()),
        Commands::Uninstall { fingerprint } => cmd_uninstall(&paths, &fingerprint),
        Commands::List => cmd_list(&paths),
        Commands::Inspect { file, encoding } => cmd_inspect(&paths, &file, encoding.into()),
        Commands::Convert { file, to, out } => cmd_convert(&file, to.into(), out.as_deref()),
        Commands::Serve { file, port, name } => cmd_serve(&paths, &file, port, name),
        Commands::Doctor => cmd_doctor(&paths),
    }
}

fn read_input(file: &Path) -> Result<Vec<u8>> {
    if file == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf).context("read stdin")?;
        return Ok(buf);
    }
    std::fs::read(file).with_context(|| format!("read {}", file.display()))
}

fn build_installer(paths: &NestPaths) -> Result<Installer> {
    let config = store::load_config(paths)?;
    let ledger = store::load_ledger(paths)?;
    Ok(Installer::new(default_trust_store(paths, &config))
        .with_default_name(config.default_name)
        .with_records(ledger.records))
}

fn format_time(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_else(|_| t.to_string())
}

fn cmd_init(paths: &NestPaths) -> Result<()> {
    store::ensure_dirs(paths)?;

    if !paths.config_file.is_file() {
        store::save_config(paths, &crate::config::Config::default())?;
        println!("Created config: {}", paths.config_file.display());
    }
    if !paths.ledger_file.is_file() {
        store::save_ledger(paths, &Ledger::default())?;
    }

    println!("certnest initialised at {}", paths.home.display());
    Ok(())
}

fn cmd_install(
    paths: &NestPaths,
    file: &Path,
    name: Option<String>,
    encoding: Encoding,
) -> Result<()> {
    let bytes = read_input(file)?;
    let installer = build_installer(paths)?;

    let mut payload = CertificatePayload::new(bytes).with_encoding(encoding);
    if let Some(n) = name {
        payload = payload.with_name(n);
    }

    let result = installer.install(payload);
    store::update_ledger(paths, |ledger| ledger.apply(&result))?;

    match result {
        InstallResult::Installed(record) => {
            println!("Installed: {} ({})", record.name, record.fingerprint);
            Ok(())
        }
        InstallResult::AlreadyInstalled(record) => {
            println!("Already installed: {} ({})", record.name, record.fingerprint);
            Ok(())
        }
        InstallResult::Rejected(reason) => anyhow::bail!("certificate rejected: {reason}"),
        InstallResult::AdapterFailed(e) => anyhow::bail!("trust store error: {e}"),
    }
}

fn cmd_uninstall(paths: &NestPaths, fingerprint: &str) -> Result<()> {
    let fingerprint: Fingerprint = fingerprint
        .parse()
        .with_context(|| format!("invalid fingerprint '{fingerprint}'"))?;
    let installer = build_installer(paths)?;
    let result = installer.uninstall(&fingerprint);
    let dropped = match &result {
        Ok(_) | Err(StoreError::NotFound(_)) => {
            store::update_ledger(paths, |ledger| ledger.remove(&fingerprint))?
        }
        Err(_) => None,
    };

    let record = result?.or(dropped);
    match record {
        Some(record) => println!("Uninstalled: {} ({})", record.name, fingerprint),
        None => println!("Uninstalled: {fingerprint}"),
    }
    Ok(())
}

fn cmd_list(paths: &NestPaths) -> Result<()> {
    let config = store::load_config(paths)?;
    let ledger = store::load_ledger(paths)?;
    let trusted = match default_trust_store(paths, &config).list_fingerprints() {
        Ok(set) => Some(set),
        Err(e) => {
            eprintln!("Warning: could not read trust store: {e}");
            None
        }
    };

    for record in &ledger.records {
        let status = match &trusted {
            Some(set) if !set.contains(&record.fingerprint) => " (missing)",
            _ => "",
        };
        println!(
            "{}\t{}\t{}{status}",
            record.fingerprint,
            record.name,
            format_time(record.installed_at)
        );
    }
    Ok(())
}

fn print_certificate(cert: &ParsedCertificate) {
    println!("Subject:     {}", cert.subject);
    println!("Issuer:      {}", cert.issuer);
    println!("Serial:      {}", cert.serial_hex());
    println!("Not before:  {}", format_time(cert.not_before));
    println!("Not after:   {}", format_time(cert.not_after));
    if let Some(bc) = cert.basic_constraints {
        match bc.path_len {
            Some(n) => println!("CA:          {} (path length {n})", bc.ca),
            None => println!("CA:          {}", bc.ca),
        }
    }
    println!("SHA-256:     {}", cert.fingerprint.to_colon_hex());
}

fn cmd_inspect(paths: &NestPaths, file: &Path, encoding: Encoding) -> Result<()> {
    let bytes = read_input(file)?;
    let cert = codec::decode(&bytes, encoding)?;
    print_certificate(&cert);

    let config = store::load_config(paths)?;
    let existing = match default_trust_store(paths, &config).list_fingerprints() {
        Ok(set) => set,
        Err(e) => {
            eprintln!("Warning: could not read trust store: {e}");
            HashSet::new()
        }
    };

    match validate(cert, OffsetDateTime::now_utc(), &existing) {
        ValidationOutcome::Accepted {
            already_present, ..
        } => {
            if already_present {
                println!("Status:      valid (already installed)");
            } else {
                println!("Status:      valid");
            }
            Ok(())
        }
        ValidationOutcome::Rejected(r) => anyhow::bail!("certificate rejected: {r}"),
    }
}

fn cmd_convert(file: &Path, to: Format, out: Option<&Path>) -> Result<()> {
    let bytes = read_input(file)?;
    let cert = codec::decode(&bytes, Encoding::Probe)?;
    let encoded = codec::encode(&cert, to);
    match out {
        Some(path) => {
            std::fs::write(path, &encoded).with_context(|| format!("write {}", path.display()))?
        }
        None => std::io::stdout().write_all(&encoded)?,
    }
    Ok(())
}

fn cmd_serve(paths: &NestPaths, file: &Path, port: u16, name: Option<String>) -> Result<()> {
    let bytes = read_input(file)?;
    let cert = codec::decode(&bytes, Encoding::Probe)?;
    let config = store::load_config(paths)?;
    let name = name
        .or_else(|| cert.common_name.clone())
        .unwrap_or(config.default_name);

    let handoff = Arc::new(Handoff::new(&cert, name));
    println!("Open http://<this-host>:{port}/start on the device to download the certificate.");
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(handoff::serve(SocketAddr::from(([0, 0, 0, 0], port)), handoff))?;
    println!("Hand-off closed.");
    Ok(())
}

fn cmd_doctor(paths: &NestPaths) -> Result<()> {
    let config = store::load_config(paths).unwrap_or_default();
    let trust = default_trust_store(paths, &config);
    let results = crate::doctor::run_checks(paths, trust.as_ref(), OffsetDateTime::now_utc())?;

    let mut failed = 0;
    for r in &results {
        let mark = if r.ok { "ok" } else { "!!" };
        println!("[{mark}] {}", r.message);
        if !r.ok {
            failed += 1;
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} check(s) failed");
    }
    Ok(())
}
