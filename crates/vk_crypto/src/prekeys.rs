//! Pre-key generation
//!
//! - Signed pre-key (SPK): X25519 keypair, public half signed by the user's
//!   Ed25519 identity key. Rotated on policy (weekly default); the previous
//!   public half is retained for a grace window to accept in-flight sessions.
//! - One-time pre-keys (OPK): X25519 keypairs consumed once per session
//!   initiation. Batch-generated; the pool is replenished when it drops below
//!   the low-water mark.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::identity::IdentityKeyPair;

/// A freshly generated signed pre-key: secret, public, and the identity
/// signature over the raw public bytes.
pub struct SignedPrekey {
    pub secret: StaticSecret,
    pub public: X25519Public,
    pub signature: Vec<u8>,
}

/// Generate a signed pre-key: an X25519 keypair with the public half signed
/// by the user's Ed25519 identity key.
pub fn generate_signed_prekey(identity: &IdentityKeyPair) -> SignedPrekey {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = X25519Public::from(&secret);
    let signature = identity.sign(public.as_bytes());
    SignedPrekey {
        secret,
        public,
        signature,
    }
}

/// Generate a batch of one-time pre-keys (X25519).
pub fn generate_one_time_prekeys(count: usize) -> Vec<(StaticSecret, X25519Public)> {
    (0..count)
        .map(|_| {
            let s = StaticSecret::random_from_rng(OsRng);
            let p = X25519Public::from(&s);
            (s, p)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKeyPair;

    #[test]
    fn signed_prekey_signature_verifies() {
        let ik = IdentityKeyPair::generate();
        let spk = generate_signed_prekey(&ik);
        IdentityKeyPair::verify(&ik.public.0, spk.public.as_bytes(), &spk.signature).unwrap();
    }

    #[test]
    fn one_time_batch_is_distinct() {
        let batch = generate_one_time_prekeys(8);
        assert_eq!(batch.len(), 8);
        for i in 0..batch.len() {
            for j in (i + 1)..batch.len() {
                assert_ne!(batch[i].1.as_bytes(), batch[j].1.as_bytes());
            }
        }
    }
}
