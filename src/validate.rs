//! Certificate validation against a point in time and the installed set.

use std::collections::HashSet;
use time::OffsetDateTime;

use crate::codec::ParsedCertificate;
use crate::error::Rejection;
use crate::fingerprint::Fingerprint;

/// Result of a single validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted {
        certificate: ParsedCertificate,
        /// Fingerprint is already in the trust store; installing again is a no-op.
        already_present: bool,
    },
    Rejected(Rejection),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted { .. })
    }
}

/// Validate a certificate. Checks run in order and stop at the first failure:
/// structure, not-yet-valid, expired, then presence in `existing`.
///
/// Both ends of the validity window are inclusive.
pub fn validate(
    certificate: ParsedCertificate,
    now: OffsetDateTime,
    existing: &HashSet<Fingerprint>,
) -> ValidationOutcome {
    if let Err(reason) = check_structure(&certificate) {
        return ValidationOutcome::Rejected(Rejection::Malformed(reason));
    }
    if now < certificate.not_before {
        return ValidationOutcome::Rejected(Rejection::NotYetValid {
            not_before: certificate.not_before,
        });
    }
    if now > certificate.not_after {
        return ValidationOutcome::Rejected(Rejection::Expired {
            not_after: certificate.not_after,
        });
    }
    let already_present = existing.contains(&certificate.fingerprint);
    ValidationOutcome::Accepted {
        certificate,
        already_present,
    }
}

fn check_structure(cert: &ParsedCertificate) -> Result<(), String> {
    if cert.subject.trim().is_empty() {
        return Err("empty subject".to_string());
    }
    if cert.issuer.trim().is_empty() {
        return Err("empty issuer".to_string());
    }
    if cert.serial.is_empty() {
        return Err("missing serial number".to_string());
    }
    if cert.not_before > cert.not_after {
        return Err("validity window ends before it starts".to_string());
    }
    if let Some(bc) = cert.basic_constraints {
        if !bc.ca && bc.path_len.is_some() {
            return Err("path length constraint on a non-CA certificate".to_string());
        }
    }
    Ok(())
}
