//! Database abstraction over SQLite via sqlx.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

use vk_crypto::sealed::{self, MasterKey};

use crate::error::StoreError;

/// Central store handle. Cheap to clone (pool is Arc internally).
#[derive(Clone)]
pub struct Store {
    pub pool: SqlitePool,
    master: MasterKey,
}

impl Store {
    /// Open (or create) the SQLite database at `db_path` and run pending
    /// migrations.
    ///
    /// WAL journal mode and foreign-key enforcement are configured at
    /// connection time, not inside a migration: SQLite forbids changing
    /// `journal_mode` inside a transaction and sqlx wraps every migration
    /// in one.
    pub async fn open(db_path: &Path, master: MasterKey) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self { pool, master })
    }

    // ── Sealing helpers ──────────────────────────────────────────────────────

    /// Seal a secret value for storage. Output is base64 of nonce||ciphertext.
    pub fn seal_value(&self, plaintext: &[u8]) -> Result<String, StoreError> {
        let blob = sealed::seal(&self.master, plaintext)?;
        Ok(STANDARD.encode(blob))
    }

    /// Open a sealed column value back to plaintext bytes.
    pub fn open_value(&self, b64: &str) -> Result<Vec<u8>, StoreError> {
        let blob = STANDARD
            .decode(b64)
            .map_err(vk_crypto::CryptoError::Base64Decode)?;
        Ok(sealed::open(&self.master, &blob)?)
    }

    /// Open a sealed column that must hold exactly 32 bytes of key material.
    pub fn open_key32(&self, b64: &str) -> Result<[u8; 32], StoreError> {
        let bytes = self.open_value(b64)?;
        bytes.try_into().map_err(|_| {
            StoreError::Crypto(vk_crypto::CryptoError::InvalidKey(
                "Sealed key is not 32 bytes".into(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Store;
    use std::path::PathBuf;
    use uuid::Uuid;
    use vk_crypto::sealed::MasterKey;

    #[tokio::test]
    async fn open_runs_migrations_and_seals_roundtrip() {
        let db_path = PathBuf::from(format!("/tmp/vk-store-test-{}.db", Uuid::new_v4()));
        let store = Store::open(&db_path, MasterKey::generate())
            .await
            .expect("open store");

        let sealed = store.seal_value(b"secret key bytes").unwrap();
        assert_ne!(sealed.as_bytes(), b"secret key bytes");
        assert_eq!(store.open_value(&sealed).unwrap(), b"secret key bytes");

        // Schema exists
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM e2ee_keys")
                .fetch_one(&store.pool)
                .await
                .expect("query e2ee_keys");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn open_key32_rejects_wrong_length() {
        let db_path = PathBuf::from(format!("/tmp/vk-store-test-{}.db", Uuid::new_v4()));
        let store = Store::open(&db_path, MasterKey::generate())
            .await
            .expect("open store");

        let sealed = store.seal_value(b"short").unwrap();
        assert!(store.open_key32(&sealed).is_err());
    }
}
