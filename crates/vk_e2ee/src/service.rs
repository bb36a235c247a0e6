//! Core service handle
//!
//! [`E2eeCore`] owns the store, the keyed lock registry, the skipped-key
//! cache, and the configuration. The operation implementations are split by
//! concern: key management in `keystore`, envelope work in `codec`, safety
//! numbers in `safety`.

use std::future::Future;
use std::sync::Arc;

use vk_store::{LockRegistry, Store, StoreError};

use crate::{
    config::E2eeConfig,
    error::{E2eeError, ErrorKind},
    ratchet::SkippedKeys,
};

pub struct E2eeCore {
    pub(crate) store: Store,
    pub(crate) locks: LockRegistry,
    pub(crate) skipped: SkippedKeys,
    pub(crate) config: E2eeConfig,
}

impl E2eeCore {
    pub fn new(store: Store, config: E2eeConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            locks: LockRegistry::new(),
            skipped: SkippedKeys::new(),
            config,
        })
    }

    pub fn config(&self) -> &E2eeConfig {
        &self.config
    }

    /// Run one store round-trip under the configured deadline. A deadline
    /// miss surfaces as a storage failure; there is no internal retry.
    pub(crate) async fn timed<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, E2eeError> {
        match tokio::time::timeout(self.config.store_deadline(), fut).await {
            Ok(result) => result.map_err(E2eeError::from),
            Err(_) => Err(E2eeError::with_cause(
                ErrorKind::StorageError,
                "store deadline elapsed",
            )),
        }
    }
}
