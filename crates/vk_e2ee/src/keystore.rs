//! Key store operations: identity initialization, bundle hand-out, pre-key
//! pool maintenance, signed pre-key rotation.
//!
//! Locking discipline: `initialise_user_keys`, `rotate_signed_pre_key`, and
//! pool replenishment take the per-user write lock; `get_bundle` takes the
//! read lock (the pool hand-out itself is made atomic by the store, not by
//! the lock).

use std::sync::Arc;

use chrono::Utc;

use vk_crypto::{identity::IdentityKeyPair, prekeys};
use vk_proto::PublicBundle;
use vk_store::models::KeyRow;
use vk_store::keys::NewKeySet;

use crate::{
    error::{E2eeError, ErrorKind},
    service::E2eeCore,
};

impl E2eeCore {
    /// Create a user's full key set if they have none, otherwise return the
    /// current bundle unchanged. Never regenerates an existing identity key.
    /// An existing user whose one-time pool has run dry gets it topped back
    /// up, so re-init after a partial failure converges.
    ///
    /// The returned bundle carries no one-time key; pool hand-out is
    /// exclusively `get_bundle`'s job.
    pub async fn initialise_user_keys(&self, user_id: &str) -> Result<PublicBundle, E2eeError> {
        let lock = self.locks.user_lock(user_id);
        let _guard = lock.write().await;

        if let Some(row) = self.timed(self.store.get_key_set(user_id)).await? {
            if row.quarantined {
                return Err(E2eeError::new(ErrorKind::KeyIntegrityError));
            }
            let depth = self
                .timed(self.store.count_one_time_prekeys(user_id))
                .await?;
            if depth == 0 {
                self.top_up_pool_locked(user_id).await?;
            }
            return Ok(bundle_from_row(&row, None));
        }

        let identity = IdentityKeyPair::generate();
        let spk = prekeys::generate_signed_prekey(&identity);
        let one_time = prekeys::generate_one_time_prekeys(self.config.initial_pool_size);

        let new = NewKeySet {
            user_id: user_id.to_string(),
            identity_public: identity.public.to_b64(),
            identity_secret_enc: self.store.seal_value(identity.secret_bytes())?,
            spk_public: b64(spk.public.as_bytes()),
            spk_secret_enc: self.store.seal_value(spk.secret.as_bytes())?,
            spk_signature: b64(&spk.signature),
        };
        let pool: Vec<(String, String)> = one_time
            .iter()
            .map(|(secret, public)| {
                Ok((
                    b64(public.as_bytes()),
                    self.store.seal_value(secret.as_bytes())?,
                ))
            })
            .collect::<Result<_, E2eeError>>()?;

        // One transaction: a user with keys but no pool is never observable.
        self.timed(self.store.insert_key_set_with_pool(&new, &pool))
            .await?;

        tracing::info!(
            target: "vk_e2ee",
            event = "user_keys_initialised",
            user_id = %user_id,
            pool_size = pool.len(),
        );

        Ok(PublicBundle {
            identity_public: new.identity_public,
            signed_pre_key_public: new.spk_public,
            signed_pre_key_signature: new.spk_signature,
            one_time_pre_key_public: None,
        })
    }

    /// Hand out a bundle for session initiation, consuming one one-time
    /// pre-key atomically. Kicks off a background replenish when the pool
    /// drops below the low-water mark.
    pub async fn get_bundle(self: &Arc<Self>, user_id: &str) -> Result<PublicBundle, E2eeError> {
        let lock = self.locks.user_lock(user_id);
        let _guard = lock.read().await;

        let row = self.timed(self.store.require_key_set(user_id)).await?;

        let taken = self.timed(self.store.take_one_time_prekey(user_id)).await?;
        if taken.is_none() && !self.config.allow_weak_bundles {
            return Err(E2eeError::new(ErrorKind::PreKeyExhaustedError));
        }

        let depth = self
            .timed(self.store.count_one_time_prekeys(user_id))
            .await?;
        if (depth as usize) < self.config.pool_low_water {
            let core = Arc::clone(self);
            let user = user_id.to_string();
            tokio::spawn(async move {
                if let Err(err) = core.replenish_one_time_pool(&user).await {
                    tracing::warn!(
                        target: "vk_e2ee",
                        event = "pool_replenish_failed",
                        user_id = %user,
                        correlation_id = %err.correlation_id,
                    );
                }
            });
        }

        tracing::debug!(
            target: "vk_e2ee",
            event = "bundle_issued",
            user_id = %user_id,
            pool_depth = depth,
            weak = taken.is_none(),
        );

        Ok(bundle_from_row(&row, taken.map(|r| r.public)))
    }

    /// Top the one-time pool back up to its initial size.
    pub async fn replenish_one_time_pool(&self, user_id: &str) -> Result<usize, E2eeError> {
        let lock = self.locks.user_lock(user_id);
        let _guard = lock.write().await;
        self.top_up_pool_locked(user_id).await
    }

    /// Body of pool replenishment. Caller MUST hold the user write lock.
    async fn top_up_pool_locked(&self, user_id: &str) -> Result<usize, E2eeError> {
        let depth = self
            .timed(self.store.count_one_time_prekeys(user_id))
            .await? as usize;
        if depth >= self.config.initial_pool_size {
            return Ok(0);
        }

        let missing = self.config.initial_pool_size - depth;
        let batch: Vec<(String, String)> = prekeys::generate_one_time_prekeys(missing)
            .iter()
            .map(|(secret, public)| {
                Ok((
                    b64(public.as_bytes()),
                    self.store.seal_value(secret.as_bytes())?,
                ))
            })
            .collect::<Result<_, E2eeError>>()?;
        self.timed(self.store.insert_one_time_prekeys(user_id, &batch))
            .await?;

        tracing::info!(
            target: "vk_e2ee",
            event = "pool_replenished",
            user_id = %user_id,
            added = missing,
        );
        Ok(missing)
    }

    /// Generate a fresh signed pre-key. The previous public half is retained
    /// for the grace window so in-flight sessions still resolve.
    pub async fn rotate_signed_pre_key(&self, user_id: &str) -> Result<String, E2eeError> {
        let lock = self.locks.user_lock(user_id);
        let _guard = lock.write().await;

        let row = self.timed(self.store.require_key_set(user_id)).await?;
        let identity = self.load_identity(&row).await?;
        let spk = prekeys::generate_signed_prekey(&identity);

        let spk_public = b64(spk.public.as_bytes());
        let spk_secret_enc = self.store.seal_value(spk.secret.as_bytes())?;
        let spk_signature = b64(&spk.signature);
        self.timed(self.store.rotate_signed_prekey(
            user_id,
            &spk_public,
            &spk_secret_enc,
            &spk_signature,
        ))
        .await?;

        tracing::info!(
            target: "vk_e2ee",
            event = "spk_rotated",
            user_id = %user_id,
        );
        Ok(spk_public)
    }

    /// Drop the retained previous SPK once the grace window has elapsed.
    /// Safe to call on any schedule; does nothing while the window is open.
    pub async fn expire_previous_spk(&self, user_id: &str) -> Result<bool, E2eeError> {
        let lock = self.locks.user_lock(user_id);
        let _guard = lock.write().await;

        let row = self.timed(self.store.require_key_set(user_id)).await?;
        let (Some(_), Some(rotated_at)) = (&row.prev_spk_public, row.spk_rotated_at) else {
            return Ok(false);
        };
        let age = Utc::now().signed_duration_since(rotated_at);
        if age.to_std().unwrap_or_default() < self.config.spk_grace() {
            return Ok(false);
        }
        self.timed(self.store.clear_previous_spk(user_id)).await?;
        Ok(true)
    }

    /// Open a user's sealed identity secret. Corruption quarantines the row
    /// and fails the operation; it is never silently repaired.
    pub(crate) async fn load_identity(&self, row: &KeyRow) -> Result<IdentityKeyPair, E2eeError> {
        let secret = match self.store.open_value(&row.identity_secret_enc) {
            Ok(bytes) if bytes.len() == 32 => bytes,
            _ => {
                self.timed(self.store.quarantine_keys(&row.user_id)).await?;
                tracing::error!(
                    target: "vk_e2ee",
                    event = "key_material_quarantined",
                    user_id = %row.user_id,
                );
                return Err(E2eeError::new(ErrorKind::KeyIntegrityError));
            }
        };
        IdentityKeyPair::from_bytes(&secret)
            .map_err(|e| E2eeError::with_cause(ErrorKind::KeyIntegrityError, e))
    }
}

pub(crate) fn bundle_from_row(row: &KeyRow, one_time: Option<String>) -> PublicBundle {
    PublicBundle {
        identity_public: row.identity_public.clone(),
        signed_pre_key_public: row.spk_public.clone(),
        signed_pre_key_signature: row.spk_signature.clone(),
        one_time_pre_key_public: one_time,
    }
}

pub(crate) fn b64(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.encode(bytes)
}
