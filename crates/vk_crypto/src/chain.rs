//! Symmetric message chain
//!
//! Every message N gets its own key pair derived from the current chain key:
//!
//!   HKDF-SHA256(ikm = CK, salt = N as 4-byte big-endian,
//!               info = "vaultke-e2ee-msg-v1") → 64 bytes
//!     = encryption key (32) || auth key (32)
//!
//! After each send/receive the chain advances one-way:
//!
//!   CK' = HMAC-SHA-256(CK, 0x02)
//!
//! The advance is irreversible, so compromising CK' never exposes keys for
//! messages already delivered (forward secrecy along the chain).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{error::CryptoError, kdf};

/// HKDF info string for per-message key derivation.
pub const MESSAGE_INFO: &[u8] = b"vaultke-e2ee-msg-v1";

/// Domain-separation byte for the chain advance MAC.
const CHAIN_ADVANCE_LABEL: [u8; 1] = [0x02];

type HmacSha256 = Hmac<Sha256>;

/// Keys for exactly one message. Zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct MessageKeys {
    /// AES-256-GCM key for the ciphertext.
    pub enc_key: [u8; 32],
    /// Auth key mixed into the integrity hash.
    pub auth_key: [u8; 32],
}

/// Derive the keys for message number `n` from the current chain key.
///
/// The message number is bound into the derivation as the HKDF salt, so a
/// transcript that reorders envelopes cannot make key material line up.
pub fn message_keys(chain_key: &[u8; 32], n: u32) -> Result<MessageKeys, CryptoError> {
    let salt = n.to_be_bytes();
    let mut okm = [0u8; 64];
    kdf::hkdf_expand(chain_key, Some(&salt), MESSAGE_INFO, &mut okm)?;

    let mut enc_key = [0u8; 32];
    let mut auth_key = [0u8; 32];
    enc_key.copy_from_slice(&okm[..32]);
    auth_key.copy_from_slice(&okm[32..]);
    okm.zeroize();

    Ok(MessageKeys { enc_key, auth_key })
}

/// Advance the chain one step: CK' = HMAC-SHA-256(CK, 0x02).
pub fn advance(chain_key: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(chain_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    mac.update(&CHAIN_ADVANCE_LABEL);
    let out = mac.finalize().into_bytes();
    let mut next = [0u8; 32];
    next.copy_from_slice(&out);
    Ok(next)
}
