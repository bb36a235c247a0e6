//! vk_store: SQLite persistence for the Vaultke E2EE core
//!
//! All secret columns are sealed with the process master key before they hit
//! disk (see `vk_crypto::sealed`). Row models are plain data; the repository
//! methods on [`Store`] own all SQL.

pub mod db;
pub mod error;
pub mod keys;
pub mod locks;
pub mod models;
pub mod sessions;

pub use db::Store;
pub use error::StoreError;
pub use locks::LockRegistry;
