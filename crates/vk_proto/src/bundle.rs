//! Public pre-key bundle
//!
//! What a user publishes so that peers can start sessions with them while
//! they are offline. Secret halves never appear here.

use serde::{Deserialize, Serialize};

/// Published key bundle, all fields base64-encoded key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicBundle {
    /// Ed25519 identity public key.
    pub identity_public: String,
    /// X25519 signed pre-key public.
    pub signed_pre_key_public: String,
    /// Ed25519 signature over the raw SPK public bytes.
    pub signed_pre_key_signature: String,
    /// X25519 one-time pre-key public. Absent when the pool is exhausted;
    /// sessions built from such a bundle lose one-time forward secrecy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_time_pre_key_public: Option<String>,
}

impl PublicBundle {
    pub fn has_one_time_key(&self) -> bool {
        self.one_time_pre_key_public.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_field_names_are_camel_case() {
        let bundle = PublicBundle {
            identity_public: "aWs=".into(),
            signed_pre_key_public: "c3Br".into(),
            signed_pre_key_signature: "c2ln".into(),
            one_time_pre_key_public: Some("b3Br".into()),
        };
        let json = serde_json::to_string(&bundle).unwrap();
        assert!(json.contains("\"identityPublic\""));
        assert!(json.contains("\"signedPreKeyPublic\""));
        assert!(json.contains("\"signedPreKeySignature\""));
        assert!(json.contains("\"oneTimePreKeyPublic\""));
    }

    #[test]
    fn one_time_key_omitted_when_pool_empty() {
        let bundle = PublicBundle {
            identity_public: "aWs=".into(),
            signed_pre_key_public: "c3Br".into(),
            signed_pre_key_signature: "c2ln".into(),
            one_time_pre_key_public: None,
        };
        let json = serde_json::to_string(&bundle).unwrap();
        assert!(!json.contains("oneTimePreKeyPublic"));
        assert!(!bundle.has_one_time_key());
    }
}
