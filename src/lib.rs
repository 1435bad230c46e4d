//! certnest - certificate validation and trust store installation.

pub mod cli;
pub mod codec;
pub mod config;
pub mod doctor;
pub mod error;
pub mod fingerprint;
pub mod installer;
pub mod ledger;
pub mod locks;
pub mod logging;
pub mod platform;
pub mod serve;
pub mod store;
pub mod validate;

pub use codec::{decode, encode, CertificatePayload, Encoding, Format, ParsedCertificate};
pub use error::{DecodeError, RejectReason, Rejection, StoreError};
pub use fingerprint::Fingerprint;
pub use installer::{InstallRecord, InstallResult, Installer};
pub use platform::TrustStore;
pub use validate::{validate, ValidationOutcome};
