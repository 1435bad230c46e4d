//! Certificate payload decoding (PEM or DER) and re-encoding.

use pem::{EncodeConfig, LineEnding};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use x509_parser::error::PEMError;
use x509_parser::pem::Pem;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::DecodeError;
use crate::fingerprint::Fingerprint;

const PEM_MARKER: &[u8] = b"-----BEGIN ";

/// PEM labels that carry an X.509 certificate.
const CERT_LABELS: &[&str] = &["CERTIFICATE", "X509 CERTIFICATE", "TRUSTED CERTIFICATE"];

/// DER SEQUENCE tag; every certificate starts with it.
const DER_SEQUENCE: u8 = 0x30;

/// Encoding declared by the caller for an incoming payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    Pem,
    Der,
    /// Look for PEM framing first, fall back to DER.
    #[default]
    Probe,
}

/// Output encoding for [`encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pem,
    Der,
}

impl From<Format> for Encoding {
    fn from(f: Format) -> Self {
        match f {
            Format::Pem => Encoding::Pem,
            Format::Der => Encoding::Der,
        }
    }
}

/// Raw install request input. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePayload {
    bytes: Vec<u8>,
    encoding: Encoding,
    name: Option<String>,
}

impl CertificatePayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            encoding: Encoding::Probe,
            name: None,
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Hex SHA-256 of the payload bytes as received.
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicConstraints {
    pub ca: bool,
    pub path_len: Option<u32>,
}

/// Structured view of a certificate. Every field is derived from `der`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    pub subject: String,
    pub issuer: String,
    pub common_name: Option<String>,
    /// Big-endian serial number bytes as encoded.
    pub serial: Vec<u8>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub basic_constraints: Option<BasicConstraints>,
    pub fingerprint: Fingerprint,
    pub der: Vec<u8>,
}

impl ParsedCertificate {
    pub fn serial_hex(&self) -> String {
        hex::encode(&self.serial)
    }

    pub fn to_pem(&self) -> String {
        pem_block("CERTIFICATE", &self.der)
    }
}

/// Decode a payload into a certificate.
///
/// With [`Encoding::Probe`], PEM framing wins whenever a `-----BEGIN ` marker is present;
/// only unmarked input is treated as DER. Unmarked input that is plain text and does not
/// open a DER SEQUENCE is reported as an unsupported encoding rather than malformed DER.
pub fn decode(bytes: &[u8], encoding: Encoding) -> Result<ParsedCertificate, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyInput);
    }
    match encoding {
        Encoding::Pem => decode_pem(bytes),
        Encoding::Der => decode_der(bytes),
        Encoding::Probe => {
            if has_pem_marker(bytes) {
                decode_pem(bytes)
            } else if looks_like_text(bytes) {
                Err(DecodeError::UnsupportedEncoding(
                    "unframed text (expected PEM or DER)".to_string(),
                ))
            } else {
                decode_der(bytes)
            }
        }
    }
}

/// Decode a payload built by the caller.
pub fn decode_payload(payload: &CertificatePayload) -> Result<ParsedCertificate, DecodeError> {
    decode(payload.bytes(), payload.encoding())
}

/// Serialize a certificate; `decode(&encode(p, f), f.into())` yields `p` again.
pub fn encode(certificate: &ParsedCertificate, format: Format) -> Vec<u8> {
    match format {
        Format::Der => certificate.der.clone(),
        Format::Pem => certificate.to_pem().into_bytes(),
    }
}

fn has_pem_marker(bytes: &[u8]) -> bool {
    bytes.windows(PEM_MARKER.len()).any(|w| w == PEM_MARKER)
}

fn looks_like_text(bytes: &[u8]) -> bool {
    if bytes.first() == Some(&DER_SEQUENCE) {
        return false;
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.chars().all(|c| !c.is_control() || c.is_whitespace()),
        Err(_) => false,
    }
}

fn decode_pem(bytes: &[u8]) -> Result<ParsedCertificate, DecodeError> {
    let mut first_label: Option<String> = None;
    for block in Pem::iter_from_buffer(bytes) {
        let pem = match block {
            Ok(pem) => pem,
            // Stray text after the last frame.
            Err(PEMError::MissingHeader) if first_label.is_some() => break,
            Err(e) => return Err(DecodeError::MalformedInput(format!("PEM framing: {e:?}"))),
        };
        if CERT_LABELS.contains(&pem.label.as_str()) {
            return decode_der(&pem.contents);
        }
        first_label.get_or_insert(pem.label);
    }
    match first_label {
        Some(label) => Err(DecodeError::UnsupportedEncoding(format!(
            "PEM block '{label}' is not a certificate"
        ))),
        None => Err(DecodeError::MalformedInput("no PEM frame found".to_string())),
    }
}

fn decode_der(der: &[u8]) -> Result<ParsedCertificate, DecodeError> {
    let (rest, cert) = X509Certificate::from_der(der)
        .map_err(|e| DecodeError::MalformedInput(format!("parse X.509: {e:?}")))?;
    if !rest.is_empty() {
        return Err(DecodeError::MalformedInput(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }

    let validity = cert.validity();
    let not_before = asn1_timestamp(validity.not_before.timestamp())?;
    let not_after = asn1_timestamp(validity.not_after.timestamp())?;

    let basic_constraints = cert
        .basic_constraints()
        .map_err(|e| DecodeError::MalformedInput(format!("basic constraints: {e:?}")))?
        .map(|ext| BasicConstraints {
            ca: ext.value.ca,
            path_len: ext.value.path_len_constraint,
        });

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|c| c.as_str().ok())
        .map(String::from);

    Ok(ParsedCertificate {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        common_name,
        serial: cert.raw_serial().to_vec(),
        not_before,
        not_after,
        basic_constraints,
        fingerprint: Fingerprint::of(der),
        der: der.to_vec(),
    })
}

fn asn1_timestamp(ts: i64) -> Result<OffsetDateTime, DecodeError> {
    OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|e| DecodeError::MalformedInput(format!("invalid validity time: {e:?}")))
}

fn pem_block(label: &str, der: &[u8]) -> String {
    let block = pem::Pem::new(label, der);
    pem::encode_config(&block, EncodeConfig::new().set_line_ending(LineEnding::LF))
}
