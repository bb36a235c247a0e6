//! Error taxonomy for the E2EE core.
//!
//! Every failure that crosses the public API carries exactly one of these
//! kinds plus an opaque correlation id. The kinds are coarse on purpose:
//! detailed causes go only to the debug log sink, never into user-facing
//! text, and never include key material or plaintext.

use thiserror::Error;
use uuid::Uuid;

use vk_crypto::CryptoError;
use vk_proto::ProtoError;
use vk_store::StoreError;

/// Flat failure taxonomy. Identifiers (see [`ErrorKind::identifier`]) are a
/// stable contract for callers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("Backing store unreachable or write failed")]
    StorageError,
    #[error("Malformed key material supplied or retrieved")]
    InvalidKeyError,
    #[error("Signed pre-key signature failed to verify")]
    KeyAuthenticityError,
    #[error("Stored key material is corrupted")]
    KeyIntegrityError,
    #[error("Referenced user has no key record")]
    UnknownUserError,
    #[error("Envelope references an unknown session")]
    UnknownSessionError,
    #[error("Envelope version not recognized")]
    UnsupportedVersionError,
    #[error("Message number outside the skip window")]
    KeyDerivationError,
    #[error("Integrity hash mismatch")]
    IntegrityError,
    #[error("Message authentication failed")]
    AuthenticityError,
    #[error("Message already delivered")]
    ReplayError,
    #[error("Message number older than the skip window")]
    StaleMessageError,
    #[error("One-time pre-key pool exhausted")]
    PreKeyExhaustedError,
}

impl ErrorKind {
    /// Stable machine-readable identifier.
    pub fn identifier(&self) -> &'static str {
        match self {
            ErrorKind::StorageError => "STORAGE_ERROR",
            ErrorKind::InvalidKeyError => "INVALID_KEY_ERROR",
            ErrorKind::KeyAuthenticityError => "KEY_AUTHENTICITY_ERROR",
            ErrorKind::KeyIntegrityError => "KEY_INTEGRITY_ERROR",
            ErrorKind::UnknownUserError => "UNKNOWN_USER_ERROR",
            ErrorKind::UnknownSessionError => "UNKNOWN_SESSION_ERROR",
            ErrorKind::UnsupportedVersionError => "UNSUPPORTED_VERSION_ERROR",
            ErrorKind::KeyDerivationError => "KEY_DERIVATION_ERROR",
            ErrorKind::IntegrityError => "INTEGRITY_ERROR",
            ErrorKind::AuthenticityError => "AUTHENTICITY_ERROR",
            ErrorKind::ReplayError => "REPLAY_ERROR",
            ErrorKind::StaleMessageError => "STALE_MESSAGE_ERROR",
            ErrorKind::PreKeyExhaustedError => "PRE_KEY_EXHAUSTED_ERROR",
        }
    }
}

/// Public error type: one coarse kind, one correlation id, no raw cause.
#[derive(Debug, Error)]
#[error("{kind} [{correlation_id}]")]
pub struct E2eeError {
    pub kind: ErrorKind,
    pub correlation_id: Uuid,
}

impl E2eeError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Attach the underlying cause to the debug sink and drop it.
    pub fn with_cause(kind: ErrorKind, cause: impl std::fmt::Display) -> Self {
        let err = Self::new(kind);
        tracing::debug!(
            target: "vk_e2ee",
            event = "error_cause",
            kind = err.kind.identifier(),
            correlation_id = %err.correlation_id,
            cause = %cause,
        );
        err
    }
}

impl From<ErrorKind> for E2eeError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<StoreError> for E2eeError {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::Database(_) | StoreError::Migration(_) => ErrorKind::StorageError,
            StoreError::Serialization(_) => ErrorKind::StorageError,
            StoreError::Quarantined(_) => ErrorKind::KeyIntegrityError,
            StoreError::NotFound(_) => ErrorKind::UnknownUserError,
            StoreError::Crypto(c) => crypto_kind(c),
        };
        Self::with_cause(kind, err)
    }
}

impl From<CryptoError> for E2eeError {
    fn from(err: CryptoError) -> Self {
        Self::with_cause(crypto_kind(&err), err)
    }
}

impl From<ProtoError> for E2eeError {
    fn from(err: ProtoError) -> Self {
        let kind = match &err {
            ProtoError::UnsupportedVersion(_) => ErrorKind::UnsupportedVersionError,
            _ => ErrorKind::InvalidKeyError,
        };
        Self::with_cause(kind, err)
    }
}

fn crypto_kind(err: &CryptoError) -> ErrorKind {
    match err {
        CryptoError::SignatureVerification => ErrorKind::KeyAuthenticityError,
        CryptoError::AeadOpen => ErrorKind::AuthenticityError,
        CryptoError::KeyDerivation(_) => ErrorKind::KeyDerivationError,
        _ => ErrorKind::InvalidKeyError,
    }
}
