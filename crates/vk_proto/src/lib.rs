//! vk_proto: wire formats for the Vaultke E2EE message layer
//!
//! Everything that crosses a process boundary lives here: the encrypted
//! message envelope, the public pre-key bundle, and the legacy fallback
//! format recognizer. Field names are camelCase on the wire to match the
//! deployed JSON contract and must not change.

pub mod bundle;
pub mod envelope;
pub mod error;
pub mod fallback;

pub use bundle::PublicBundle;
pub use envelope::{Envelope, SecurityLevel, ENVELOPE_VERSION};
pub use error::ProtoError;
pub use fallback::FallbackMessage;
