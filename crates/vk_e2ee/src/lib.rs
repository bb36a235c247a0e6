//! vk_e2ee: the Vaultke end-to-end encryption core.
//!
//! Public surface, mirroring the deployed contract:
//!
//! - `initialise_user_keys(user_id)` / `get_bundle(user_id)`
//! - `encrypt_message(sender, recipient, plaintext, metadata?)`
//! - `decrypt_message(envelope_or_fallback_string)`
//! - `compute_safety_number(user_a, user_b)`
//! - `rotate_signed_pre_key(user_id)`
//!
//! Construction: open a [`vk_store::Store`], then `E2eeCore::new(store,
//! E2eeConfig::default())`. The handle is `Arc`-wrapped and safe to share
//! across tasks; operations on one user or session serialise, everything
//! else runs in parallel.

pub mod codec;
pub mod config;
pub mod error;
pub mod keystore;
pub mod ratchet;
pub mod safety;
pub mod service;

pub use codec::{session_id_for, OpenedMessage};
pub use config::E2eeConfig;
pub use error::{E2eeError, ErrorKind};
pub use service::E2eeCore;

pub use vk_proto::{Envelope, PublicBundle, SecurityLevel};
