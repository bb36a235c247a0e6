//! At-rest sealing for stored secrets
//!
//! Secret columns (identity secrets, pre-key secrets, chain keys) are never
//! written to the database in the clear. They are sealed under a process-level
//! master key with XChaCha20-Poly1305, a fresh 24-byte nonce per seal, and the
//! nonce prefixed to the stored blob.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

const NONCE_LEN: usize = 24;

/// Process-level key for at-rest sealing. Zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Seal `plaintext` under the master key. Output: nonce || ciphertext+tag.
pub fn seal(master: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(master.as_bytes())
        .map_err(|_| CryptoError::AeadSeal)?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ct = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::AeadSeal)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ct.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ct);
    Ok(blob)
}

/// Open a blob produced by [`seal`]. Fails on truncation or tag mismatch.
pub fn open(master: &MasterKey, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < NONCE_LEN {
        return Err(CryptoError::AeadOpen);
    }
    let (nonce, ct) = blob.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new_from_slice(master.as_bytes())
        .map_err(|_| CryptoError::AeadOpen)?;
    cipher
        .decrypt(XNonce::from_slice(nonce), ct)
        .map_err(|_| CryptoError::AeadOpen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let master = MasterKey::generate();
        let blob = seal(&master, b"chain key bytes").unwrap();
        assert_eq!(open(&master, &blob).unwrap(), b"chain key bytes");
    }

    #[test]
    fn wrong_master_key_fails() {
        let blob = seal(&MasterKey::generate(), b"secret").unwrap();
        assert!(open(&MasterKey::generate(), &blob).is_err());
    }

    #[test]
    fn truncated_blob_fails() {
        let master = MasterKey::generate();
        let blob = seal(&master, b"secret").unwrap();
        assert!(open(&master, &blob[..10]).is_err());
    }

    #[test]
    fn nonces_differ_between_seals() {
        let master = MasterKey::generate();
        let a = seal(&master, b"same input").unwrap();
        let b = seal(&master, b"same input").unwrap();
        assert_ne!(a, b);
    }
}
