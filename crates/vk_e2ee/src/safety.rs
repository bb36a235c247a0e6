//! Safety numbers over stored identity keys.

use base64::{engine::general_purpose::STANDARD, Engine};

use vk_crypto::safety;

use crate::{
    error::{E2eeError, ErrorKind},
    service::E2eeCore,
};

impl E2eeCore {
    /// Compute the pair's 32-hex-character safety number. Symmetric in its
    /// arguments; fails only when a user has no key record.
    pub async fn compute_safety_number(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<String, E2eeError> {
        let a = self.identity_public(user_a).await?;
        let b = self.identity_public(user_b).await?;
        Ok(safety::safety_number(&a, &b)?)
    }

    async fn identity_public(&self, user_id: &str) -> Result<Vec<u8>, E2eeError> {
        let row = self
            .timed(self.store.get_key_set(user_id))
            .await?
            .ok_or_else(|| E2eeError::new(ErrorKind::UnknownUserError))?;
        STANDARD
            .decode(&row.identity_public)
            .map_err(|e| E2eeError::with_cause(ErrorKind::InvalidKeyError, e))
    }
}
