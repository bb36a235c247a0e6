//! Asynchronous key agreement for session bootstrap.
//!
//! References:
//!   - Signal X3DH spec: <https://signal.org/docs/specifications/x3dh/>
//!   - RFC 7748 (X25519): <https://datatracker.ietf.org/doc/html/rfc7748>
//!   - RFC 5869 (HKDF):  <https://datatracker.ietf.org/doc/html/rfc5869>
//!
//! The initiator combines their long-term key, the recipient's published key
//! bundle, and one fresh ephemeral keypair EK:
//!
//!   DH1 = DH(IK_init, SPK_recip)   (mutual authentication)
//!   DH2 = DH(EK,      IK_recip)    (forward secrecy)
//!   DH3 = DH(EK,      SPK_recip)   (replay protection)
//!   DH4 = DH(EK,      OPK_recip)   (one-time forward secrecy, optional)
//!
//!   HKDF-SHA256(ikm = DH1 || DH2 || DH3 [|| DH4], info = "vaultke-e2ee-root-v1")
//!     → 64 bytes = root key (32) || initial chain key (32)
//!
//! Non-negotiable: the SPK signature MUST verify against the recipient's
//! identity key before any DH is computed.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{error::CryptoError, identity, identity::IdentityKeyPair, kdf};

/// HKDF info string binding the derivation to this protocol version.
pub const ROOT_INFO: &[u8] = b"vaultke-e2ee-root-v1";

/// The recipient side of a session bootstrap, decoded to raw key bytes.
pub struct PeerBundle {
    /// Ed25519 identity public key.
    pub identity_public: [u8; 32],
    /// X25519 signed pre-key public.
    pub signed_prekey_public: [u8; 32],
    /// Ed25519 signature over the raw SPK public bytes.
    pub signed_prekey_signature: Vec<u8>,
    /// X25519 one-time pre-key public, when the pool had one.
    pub one_time_public: Option<[u8; 32]>,
}

/// Result of the agreement: root key + initial chain key. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct RootSecret {
    pub root_key: [u8; 32],
    pub chain_key: [u8; 32],
}

/// Derive the shared root secret as the initiating side.
///
/// Steps:
///   1. Verify the SPK signature using the recipient's Ed25519 identity key.
///   2. Convert both identity keys to X25519.
///   3. Generate ONE ephemeral X25519 keypair.
///   4. Compute DH1..DH4 and feed the concatenation through HKDF.
pub fn derive_root_secret(
    initiator: &IdentityKeyPair,
    peer: &PeerBundle,
) -> Result<RootSecret, CryptoError> {
    // ── 1. Verify SPK signature ──────────────────────────────────────────
    IdentityKeyPair::verify(
        &peer.identity_public,
        &peer.signed_prekey_public,
        &peer.signed_prekey_signature,
    )?;

    // ── 2. Convert identity keys to X25519 ───────────────────────────────
    let ik_init = initiator.to_x25519_secret();
    let ik_peer = identity::ed25519_pub_to_x25519(&peer.identity_public)?;
    let spk_peer = X25519Public::from(peer.signed_prekey_public);

    // ── 3. Generate ephemeral key ────────────────────────────────────────
    let ek = StaticSecret::random_from_rng(OsRng);

    // ── 4. DH calculations (single EK for all) ───────────────────────────
    let dh1 = ik_init.diffie_hellman(&spk_peer); // IK_init × SPK_peer
    let dh2 = ek.diffie_hellman(&ik_peer); //        EK × IK_peer
    let dh3 = ek.diffie_hellman(&spk_peer); //       EK × SPK_peer

    let mut ikm = Vec::with_capacity(4 * 32);
    ikm.extend_from_slice(dh1.as_bytes());
    ikm.extend_from_slice(dh2.as_bytes());
    ikm.extend_from_slice(dh3.as_bytes());

    if let Some(opk_raw) = peer.one_time_public {
        let opk_peer = X25519Public::from(opk_raw);
        let dh4 = ek.diffie_hellman(&opk_peer); //   EK × OPK_peer
        ikm.extend_from_slice(dh4.as_bytes());
    }

    let mut okm = [0u8; 64];
    kdf::hkdf_expand(&ikm, None, ROOT_INFO, &mut okm)?;
    ikm.zeroize();

    let mut root_key = [0u8; 32];
    let mut chain_key = [0u8; 32];
    root_key.copy_from_slice(&okm[..32]);
    chain_key.copy_from_slice(&okm[32..]);
    okm.zeroize();

    Ok(RootSecret {
        root_key,
        chain_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prekeys::{generate_one_time_prekeys, generate_signed_prekey};

    fn bundle_for(ik: &IdentityKeyPair, with_opk: bool) -> PeerBundle {
        let spk = generate_signed_prekey(ik);
        let opk = with_opk.then(|| generate_one_time_prekeys(1).remove(0));
        PeerBundle {
            identity_public: ik.public.as_array().unwrap(),
            signed_prekey_public: *spk.public.as_bytes(),
            signed_prekey_signature: spk.signature,
            one_time_public: opk.map(|(_, p)| *p.as_bytes()),
        }
    }

    #[test]
    fn derives_root_and_chain_key() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let secret = derive_root_secret(&alice, &bundle_for(&bob, true)).unwrap();
        assert_ne!(secret.root_key, [0u8; 32]);
        assert_ne!(secret.chain_key, [0u8; 32]);
        assert_ne!(secret.root_key, secret.chain_key);
    }

    #[test]
    fn distinct_peers_yield_distinct_secrets() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let carol = IdentityKeyPair::generate();
        let s1 = derive_root_secret(&alice, &bundle_for(&bob, false)).unwrap();
        let s2 = derive_root_secret(&alice, &bundle_for(&carol, false)).unwrap();
        assert_ne!(s1.root_key, s2.root_key);
    }

    #[test]
    fn rejects_spk_signed_by_wrong_identity() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let evil = IdentityKeyPair::generate();

        let spk = generate_signed_prekey(&bob);
        let bundle = PeerBundle {
            identity_public: bob.public.as_array().unwrap(),
            signed_prekey_public: *spk.public.as_bytes(),
            // Signature from the wrong identity key
            signed_prekey_signature: evil.sign(spk.public.as_bytes()),
            one_time_public: None,
        };

        assert!(matches!(
            derive_root_secret(&alice, &bundle),
            Err(CryptoError::SignatureVerification)
        ));
    }

    #[test]
    fn opk_changes_the_derivation() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let spk = generate_signed_prekey(&bob);
        let opk = generate_one_time_prekeys(1).remove(0);

        let without_opk = PeerBundle {
            identity_public: bob.public.as_array().unwrap(),
            signed_prekey_public: *spk.public.as_bytes(),
            signed_prekey_signature: spk.signature.clone(),
            one_time_public: None,
        };
        let with_opk = PeerBundle {
            one_time_public: Some(*opk.1.as_bytes()),
            signed_prekey_signature: spk.signature.clone(),
            ..without_opk
        };
        assert!(derive_root_secret(&alice, &without_opk).is_ok());
        assert!(derive_root_secret(&alice, &with_opk).is_ok());
    }
}
