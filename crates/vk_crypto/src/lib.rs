//! vk_crypto: Vaultke E2EE core cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - No I/O and no async in this crate, pure computation only.
//!
//! # Module layout
//! - `identity`:  long-term Ed25519 identity keys + X25519 conversion
//! - `prekeys`:   signed pre-keys and one-time pre-key batches
//! - `agreement`: multi-DH root-secret derivation (session bootstrap)
//! - `chain`:     per-message key derivation + one-way chain advance
//! - `aead`:      AES-256-GCM envelope sealing (12-byte IV, split tag)
//! - `sealed`:    XChaCha20-Poly1305 at-rest sealing for stored secrets
//! - `kdf`:       HKDF-SHA256 helpers
//! - `safety`:    pair-unique safety-number fingerprint
//! - `error`:     unified error type

pub mod aead;
pub mod agreement;
pub mod chain;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod prekeys;
pub mod safety;
pub mod sealed;

pub use error::CryptoError;
