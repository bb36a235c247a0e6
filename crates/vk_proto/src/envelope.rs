//! Encrypted message envelope
//!
//! JSON shape (field names are a deployed contract):
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "senderId": "user-a",
//!   "recipientId": "user-b",
//!   "sessionId": "a1b2…",
//!   "messageNumber": 4,
//!   "iv": "<base64, 12 bytes>",
//!   "ciphertext": "<base64>",
//!   "authTag": "<base64, 16 bytes>",
//!   "integrityHash": "<64 lowercase hex chars>",
//!   "securityLevel": "MILITARY_GRADE",
//!   "metadata": "opaque caller string"
//! }
//! ```

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Current (and only) envelope version.
pub const ENVELOPE_VERSION: &str = "1.0";

/// IV length the envelope accepts, in bytes.
pub const IV_LEN: usize = 12;
/// Auth tag length the envelope accepts, in bytes.
pub const TAG_LEN: usize = 16;

/// How a message was protected, carried on the wire and surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    #[serde(rename = "MILITARY_GRADE")]
    MilitaryGrade,
    #[serde(rename = "FALLBACK")]
    Fallback,
    #[serde(rename = "NONE")]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub session_id: String,
    pub message_number: u32,
    /// Base64, 12 bytes decoded.
    pub iv: String,
    /// Base64.
    pub ciphertext: String,
    /// Base64, 16 bytes decoded.
    pub auth_tag: String,
    /// 64 lowercase hex characters.
    pub integrity_hash: String,
    pub security_level: SecurityLevel,
    /// Opaque caller metadata, bound into the AEAD associated data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl Envelope {
    pub fn to_json(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and structurally validate an envelope.
    ///
    /// Version is checked first so an unknown version is reported as such
    /// rather than as a field error.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        let env: Envelope = serde_json::from_str(json)?;
        if env.version != ENVELOPE_VERSION {
            return Err(ProtoError::UnsupportedVersion(env.version));
        }
        env.validate()?;
        Ok(env)
    }

    /// Structural checks that do not need key material.
    pub fn validate(&self) -> Result<(), ProtoError> {
        let iv = STANDARD.decode(&self.iv)?;
        if iv.len() != IV_LEN {
            return Err(ProtoError::MalformedEnvelope(format!(
                "IV must be {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }
        let tag = STANDARD.decode(&self.auth_tag)?;
        if tag.len() != TAG_LEN {
            return Err(ProtoError::MalformedEnvelope(format!(
                "Auth tag must be {TAG_LEN} bytes, got {}",
                tag.len()
            )));
        }
        STANDARD.decode(&self.ciphertext)?;
        if self.integrity_hash.len() != 64
            || !self
                .integrity_hash
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ProtoError::MalformedEnvelope(
                "Integrity hash must be 64 lowercase hex characters".into(),
            ));
        }
        Ok(())
    }

    pub fn iv_bytes(&self) -> Result<[u8; IV_LEN], ProtoError> {
        let v = STANDARD.decode(&self.iv)?;
        v.try_into()
            .map_err(|_| ProtoError::MalformedEnvelope("IV length".into()))
    }

    pub fn auth_tag_bytes(&self) -> Result<[u8; TAG_LEN], ProtoError> {
        let v = STANDARD.decode(&self.auth_tag)?;
        v.try_into()
            .map_err(|_| ProtoError::MalformedEnvelope("Auth tag length".into()))
    }

    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(STANDARD.decode(&self.ciphertext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            version: ENVELOPE_VERSION.to_string(),
            sender_id: "user-a".into(),
            recipient_id: "user-b".into(),
            session_id: "sess-1".into(),
            message_number: 4,
            iv: STANDARD.encode([0u8; 12]),
            ciphertext: STANDARD.encode(b"opaque"),
            auth_tag: STANDARD.encode([0u8; 16]),
            integrity_hash: "ab".repeat(32),
            security_level: SecurityLevel::MilitaryGrade,
            metadata: None,
        }
    }

    #[test]
    fn json_roundtrip_uses_camel_case() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"senderId\""));
        assert!(json.contains("\"messageNumber\""));
        assert!(json.contains("\"authTag\""));
        assert!(json.contains("\"integrityHash\""));
        assert!(json.contains("\"securityLevel\":\"MILITARY_GRADE\""));
        // metadata omitted when absent
        assert!(!json.contains("metadata"));

        let back = Envelope::from_json(&json).unwrap();
        assert_eq!(back.message_number, 4);
        assert_eq!(back.security_level, SecurityLevel::MilitaryGrade);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut env = sample();
        env.version = "2.0".into();
        let json = serde_json::to_string(&env).unwrap();
        assert!(matches!(
            Envelope::from_json(&json),
            Err(ProtoError::UnsupportedVersion(v)) if v == "2.0"
        ));
    }

    #[test]
    fn rejects_short_iv() {
        let mut env = sample();
        env.iv = STANDARD.encode([0u8; 8]);
        assert!(env.validate().is_err());
    }

    #[test]
    fn rejects_wrong_tag_length() {
        let mut env = sample();
        env.auth_tag = STANDARD.encode([0u8; 12]);
        assert!(env.validate().is_err());
    }

    #[test]
    fn rejects_uppercase_integrity_hash() {
        let mut env = sample();
        env.integrity_hash = "AB".repeat(32);
        assert!(env.validate().is_err());
    }

    #[test]
    fn metadata_survives_roundtrip() {
        let mut env = sample();
        env.metadata = Some("conversation=c-9".into());
        let back = Envelope::from_json(&env.to_json().unwrap()).unwrap();
        assert_eq!(back.metadata.as_deref(), Some("conversation=c-9"));
    }
}
