//! Key-material repository: identity keys, signed pre-keys, one-time pool.

use crate::{db::Store, error::StoreError, models::{KeyRow, OneTimePrekeyRow}};

/// Parameters for inserting a complete key set in one statement.
pub struct NewKeySet {
    pub user_id: String,
    pub identity_public: String,
    pub identity_secret_enc: String,
    pub spk_public: String,
    pub spk_secret_enc: String,
    pub spk_signature: String,
}

impl Store {
    /// Insert a freshly generated key set. Fails if the user already has one.
    pub async fn insert_key_set(&self, new: &NewKeySet) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO e2ee_keys \
             (user_id, identity_public, identity_secret_enc, spk_public, spk_secret_enc, spk_signature) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.user_id)
        .bind(&new.identity_public)
        .bind(&new.identity_secret_enc)
        .bind(&new.spk_public)
        .bind(&new.spk_secret_enc)
        .bind(&new.spk_signature)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a key set together with its initial one-time pool in one
    /// transaction. Either both land or neither does; a user with keys but
    /// no pool is never observable.
    pub async fn insert_key_set_with_pool(
        &self,
        new: &NewKeySet,
        pool: &[(String, String)],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO e2ee_keys \
             (user_id, identity_public, identity_secret_enc, spk_public, spk_secret_enc, spk_signature) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.user_id)
        .bind(&new.identity_public)
        .bind(&new.identity_secret_enc)
        .bind(&new.spk_public)
        .bind(&new.spk_secret_enc)
        .bind(&new.spk_signature)
        .execute(&mut *tx)
        .await?;
        for (public, secret_enc) in pool {
            sqlx::query(
                "INSERT INTO e2ee_one_time_prekeys (user_id, public, secret_enc) VALUES (?, ?, ?)",
            )
            .bind(&new.user_id)
            .bind(public)
            .bind(secret_enc)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Fetch a user's key row, or None if they never initialized.
    pub async fn get_key_set(&self, user_id: &str) -> Result<Option<KeyRow>, StoreError> {
        let row = sqlx::query_as::<_, KeyRow>("SELECT * FROM e2ee_keys WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Like [`get_key_set`] but errors on missing or quarantined rows, which
    /// is what every operational path wants.
    ///
    /// [`get_key_set`]: Store::get_key_set
    pub async fn require_key_set(&self, user_id: &str) -> Result<KeyRow, StoreError> {
        let row = self
            .get_key_set(user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("keys for user {user_id}")))?;
        if row.quarantined {
            return Err(StoreError::Quarantined(user_id.to_string()));
        }
        Ok(row)
    }

    /// Rotate the signed pre-key: the current SPK becomes the previous one
    /// (kept for the grace window), the new SPK takes its place.
    pub async fn rotate_signed_prekey(
        &self,
        user_id: &str,
        spk_public: &str,
        spk_secret_enc: &str,
        spk_signature: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE e2ee_keys SET \
             prev_spk_public = spk_public, \
             prev_spk_secret_enc = spk_secret_enc, \
             spk_public = ?, spk_secret_enc = ?, spk_signature = ?, \
             spk_rotated_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP \
             WHERE user_id = ?",
        )
        .bind(spk_public)
        .bind(spk_secret_enc)
        .bind(spk_signature)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("keys for user {user_id}")));
        }
        Ok(())
    }

    /// Drop the retained previous SPK once its grace window has passed.
    pub async fn clear_previous_spk(&self, user_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE e2ee_keys SET prev_spk_public = NULL, prev_spk_secret_enc = NULL, \
             updated_at = CURRENT_TIMESTAMP WHERE user_id = ?",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a user's key material as unusable after a failed integrity check.
    pub async fn quarantine_keys(&self, user_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE e2ee_keys SET quarantined = 1, updated_at = CURRENT_TIMESTAMP \
             WHERE user_id = ?",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── One-time pre-key pool ────────────────────────────────────────────────

    /// Add a batch of one-time pre-keys to a user's pool.
    pub async fn insert_one_time_prekeys(
        &self,
        user_id: &str,
        keys: &[(String, String)],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for (public, secret_enc) in keys {
            sqlx::query(
                "INSERT INTO e2ee_one_time_prekeys (user_id, public, secret_enc) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(public)
            .bind(secret_enc)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Current pool depth for a user.
    pub async fn count_one_time_prekeys(&self, user_id: &str) -> Result<i64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM e2ee_one_time_prekeys WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Atomically remove and return one pre-key from the pool. Two concurrent
    /// callers can never receive the same key: the DELETE claims the row.
    pub async fn take_one_time_prekey(
        &self,
        user_id: &str,
    ) -> Result<Option<OneTimePrekeyRow>, StoreError> {
        let row = sqlx::query_as::<_, OneTimePrekeyRow>(
            "DELETE FROM e2ee_one_time_prekeys \
             WHERE id = (SELECT id FROM e2ee_one_time_prekeys WHERE user_id = ? ORDER BY id LIMIT 1) \
             RETURNING *",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;
    use vk_crypto::sealed::MasterKey;

    async fn test_store() -> Store {
        let db_path = PathBuf::from(format!("/tmp/vk-store-test-{}.db", Uuid::new_v4()));
        Store::open(&db_path, MasterKey::generate())
            .await
            .expect("open store")
    }

    fn sample_key_set(user_id: &str) -> NewKeySet {
        NewKeySet {
            user_id: user_id.into(),
            identity_public: "aWRwdWI=".into(),
            identity_secret_enc: "c2VhbGVk".into(),
            spk_public: "c3BrcHVi".into(),
            spk_secret_enc: "c2VhbGVk".into(),
            spk_signature: "c2ln".into(),
        }
    }

    #[tokio::test]
    async fn insert_and_require_key_set() {
        let store = test_store().await;
        store.insert_key_set(&sample_key_set("alice")).await.unwrap();

        let row = store.require_key_set("alice").await.unwrap();
        assert_eq!(row.identity_public, "aWRwdWI=");
        assert!(!row.quarantined);
        assert!(row.prev_spk_public.is_none());
    }

    #[tokio::test]
    async fn combined_insert_is_all_or_nothing() {
        let store = test_store().await;
        let pool: Vec<(String, String)> = (0..3)
            .map(|i| (format!("pub-{i}"), format!("sec-{i}")))
            .collect();
        store
            .insert_key_set_with_pool(&sample_key_set("alice"), &pool)
            .await
            .unwrap();
        assert_eq!(store.count_one_time_prekeys("alice").await.unwrap(), 3);

        // A conflicting key row rolls the whole transaction back, pool
        // included.
        assert!(store
            .insert_key_set_with_pool(&sample_key_set("alice"), &pool)
            .await
            .is_err());
        assert_eq!(store.count_one_time_prekeys("alice").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn duplicate_insert_fails() {
        let store = test_store().await;
        store.insert_key_set(&sample_key_set("alice")).await.unwrap();
        assert!(store.insert_key_set(&sample_key_set("alice")).await.is_err());
    }

    #[tokio::test]
    async fn rotation_retains_previous_spk() {
        let store = test_store().await;
        store.insert_key_set(&sample_key_set("alice")).await.unwrap();

        store
            .rotate_signed_prekey("alice", "bmV3cHVi", "bmV3c2Vj", "bmV3c2ln")
            .await
            .unwrap();

        let row = store.require_key_set("alice").await.unwrap();
        assert_eq!(row.spk_public, "bmV3cHVi");
        assert_eq!(row.prev_spk_public.as_deref(), Some("c3BrcHVi"));
        assert!(row.spk_rotated_at.is_some());

        store.clear_previous_spk("alice").await.unwrap();
        let row = store.require_key_set("alice").await.unwrap();
        assert!(row.prev_spk_public.is_none());
    }

    #[tokio::test]
    async fn quarantined_keys_are_refused() {
        let store = test_store().await;
        store.insert_key_set(&sample_key_set("alice")).await.unwrap();
        store.quarantine_keys("alice").await.unwrap();

        assert!(matches!(
            store.require_key_set("alice").await,
            Err(StoreError::Quarantined(_))
        ));
        // Raw fetch still works for diagnostics.
        assert!(store.get_key_set("alice").await.unwrap().unwrap().quarantined);
    }

    #[tokio::test]
    async fn one_time_pool_take_is_consuming() {
        let store = test_store().await;
        store.insert_key_set(&sample_key_set("alice")).await.unwrap();

        let batch: Vec<(String, String)> = (0..3)
            .map(|i| (format!("pub-{i}"), format!("sec-{i}")))
            .collect();
        store.insert_one_time_prekeys("alice", &batch).await.unwrap();
        assert_eq!(store.count_one_time_prekeys("alice").await.unwrap(), 3);

        let taken = store.take_one_time_prekey("alice").await.unwrap().unwrap();
        assert_eq!(taken.public, "pub-0");
        assert_eq!(store.count_one_time_prekeys("alice").await.unwrap(), 2);

        // Exhaust the pool
        store.take_one_time_prekey("alice").await.unwrap().unwrap();
        store.take_one_time_prekey("alice").await.unwrap().unwrap();
        assert!(store.take_one_time_prekey("alice").await.unwrap().is_none());
    }
}
