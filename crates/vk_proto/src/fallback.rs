//! Legacy fallback message format
//!
//! Before the E2EE rollout, clients stored messages as
//! `base64("<plaintext>_enc_<timestamp-millis>_<tag>")` where the tag is a
//! short alphanumeric nonce. These still exist in message history, so the
//! decrypt path must recognize and unwrap them. Recognition is strict: the
//! decoded text must be valid UTF-8 with an `_enc_` marker followed by an
//! all-digit timestamp and a non-empty alphanumeric tag.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::ProtoError;

/// A parsed legacy fallback message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackMessage {
    pub plaintext: String,
    /// Millisecond timestamp exactly as embedded, digits only.
    pub timestamp_ms: String,
    /// Alphanumeric tag trailing the timestamp.
    pub tag: String,
}

const MARKER: &str = "_enc_";

/// Try to parse `input` as a legacy fallback message.
///
/// Returns `NotFallback` for anything that is not the exact legacy shape, so
/// callers can treat that case as "route to the real decrypt path".
pub fn parse(input: &str) -> Result<FallbackMessage, ProtoError> {
    let decoded = STANDARD.decode(input).map_err(|_| ProtoError::NotFallback)?;
    let text = String::from_utf8(decoded).map_err(|_| ProtoError::NotFallback)?;

    // The timestamp and tag are digit/alnum only, so neither can contain the
    // marker. The rightmost occurrence is therefore the real one.
    let idx = text.rfind(MARKER).ok_or(ProtoError::NotFallback)?;
    let plaintext = &text[..idx];
    let rest = &text[idx + MARKER.len()..];

    let (timestamp_ms, tag) = rest.split_once('_').ok_or(ProtoError::NotFallback)?;
    if timestamp_ms.is_empty() || !timestamp_ms.chars().all(|c| c.is_ascii_digit()) {
        return Err(ProtoError::NotFallback);
    }
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ProtoError::NotFallback);
    }

    Ok(FallbackMessage {
        plaintext: plaintext.to_string(),
        timestamp_ms: timestamp_ms.to_string(),
        tag: tag.to_string(),
    })
}
