//! Database row models, mapped to/from SQL rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KeyRow {
    pub user_id: String,
    /// Base64 Ed25519 identity public key.
    pub identity_public: String,
    /// Sealed Ed25519 identity secret.
    pub identity_secret_enc: String,
    /// Base64 X25519 signed pre-key public.
    pub spk_public: String,
    /// Sealed X25519 signed pre-key secret.
    pub spk_secret_enc: String,
    /// Base64 Ed25519 signature over the SPK public bytes.
    pub spk_signature: String,
    pub prev_spk_public: Option<String>,
    pub prev_spk_secret_enc: Option<String>,
    pub spk_rotated_at: Option<DateTime<Utc>>,
    /// Set when stored key material failed an integrity check.
    pub quarantined: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OneTimePrekeyRow {
    pub id: i64,
    pub user_id: String,
    /// Base64 X25519 public.
    pub public: String,
    /// Sealed X25519 secret.
    pub secret_enc: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub user_lo: String,
    pub user_hi: String,
    /// Sealed 32-byte root key.
    pub root_key_enc: String,
    /// Sealed 32-byte sending chain key.
    pub send_chain_key_enc: String,
    /// Next message number to send.
    pub send_count: i64,
    /// Sealed 32-byte receiving chain key.
    pub recv_chain_key_enc: String,
    /// Next message number the receiving chain expects.
    pub recv_count: i64,
    /// JSON replay-window state.
    pub replay_window: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRow {
    /// Canonical ascending ordering for a participant pair.
    pub fn order_pair(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }
}
