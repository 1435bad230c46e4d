//! Error taxonomy for decode, validation and trust store calls.

use time::OffsetDateTime;

use crate::fingerprint::Fingerprint;

/// Decode-time failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty certificate payload")]
    EmptyInput,
    #[error("malformed certificate: {0}")]
    MalformedInput(String),
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),
}

/// Validation-time failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("certificate is structurally invalid: {0}")]
    Malformed(String),
    #[error("certificate is not valid before {not_before}")]
    NotYetValid { not_before: OffsetDateTime },
    #[error("certificate expired at {not_after}")]
    Expired { not_after: OffsetDateTime },
}

/// Trust store failures, surfaced to callers as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("trust store denied the request: {0}")]
    PlatformDenied(String),
    #[error("trust store is busy: {0}")]
    PlatformBusy(String),
    #[error("certificate {0} is not in the trust store")]
    NotFound(Fingerprint),
}

/// Why an install request was rejected before reaching the trust store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Invalid(#[from] Rejection),
}
