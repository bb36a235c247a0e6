//! Safety-number fingerprints
//!
//! Both parties of a conversation can compare a short code out-of-band to
//! detect identity-key substitution. The code is symmetric: the two identity
//! publics are ordered by ascending byte value before hashing, so either side
//! computes the same string.

use sha2::{Digest, Sha256};

use crate::error::CryptoError;

/// Compute the 32-hex-character safety number for a pair of identity keys.
pub fn safety_number(a: &[u8], b: &[u8]) -> Result<String, CryptoError> {
    if a.len() != 32 || b.len() != 32 {
        return Err(CryptoError::InvalidKey(
            "Identity public keys must be 32 bytes".into(),
        ));
    }
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(lo);
    hasher.update(hi);
    let digest = hasher.finalize();
    Ok(hex::encode(&digest[..16]))
}

/// Constant-time equality for fixed-length digests and tags.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_regardless_of_argument_order() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_eq!(
            safety_number(&a, &b).unwrap(),
            safety_number(&b, &a).unwrap()
        );
    }

    #[test]
    fn is_32_lowercase_hex_chars() {
        let a = [9u8; 32];
        let b = [200u8; 32];
        let sn = safety_number(&a, &b).unwrap();
        assert_eq!(sn.len(), 32);
        assert!(sn.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn different_pairs_differ() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let c = [3u8; 32];
        assert_ne!(
            safety_number(&a, &b).unwrap(),
            safety_number(&a, &c).unwrap()
        );
    }

    #[test]
    fn rejects_wrong_length_keys() {
        assert!(safety_number(&[0u8; 31], &[0u8; 32]).is_err());
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abcd", b"abcd"));
        assert!(!constant_time_eq(b"abcd", b"abce"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
