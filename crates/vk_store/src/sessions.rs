//! Session repository: one row per participant pair.

use crate::{db::Store, error::StoreError, models::SessionRow};

/// Parameters for creating a session row.
pub struct NewSession {
    pub id: String,
    pub user_lo: String,
    pub user_hi: String,
    pub root_key_enc: String,
    pub send_chain_key_enc: String,
    pub recv_chain_key_enc: String,
    pub replay_window: String,
}

impl Store {
    pub async fn insert_session(&self, new: &NewSession) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO e2ee_sessions \
             (id, user_lo, user_hi, root_key_enc, send_chain_key_enc, recv_chain_key_enc, replay_window) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.id)
        .bind(&new.user_lo)
        .bind(&new.user_hi)
        .bind(&new.root_key_enc)
        .bind(&new.send_chain_key_enc)
        .bind(&new.recv_chain_key_enc)
        .bind(&new.replay_window)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<SessionRow>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM e2ee_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Look up the session for a participant pair, in either direction.
    pub async fn get_session_by_pair(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<SessionRow>, StoreError> {
        let (lo, hi) = SessionRow::order_pair(a, b);
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM e2ee_sessions WHERE user_lo = ? AND user_hi = ?",
        )
        .bind(lo)
        .bind(hi)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Persist a send-side chain advance. Guarded by the expected counter so
    /// a lost race surfaces as zero rows affected instead of silent overwrite.
    pub async fn advance_send_chain(
        &self,
        id: &str,
        expected_count: i64,
        chain_key_enc: &str,
        new_count: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE e2ee_sessions SET send_chain_key_enc = ?, send_count = ?, \
             updated_at = CURRENT_TIMESTAMP WHERE id = ? AND send_count = ?",
        )
        .bind(chain_key_enc)
        .bind(new_count)
        .bind(id)
        .bind(expected_count)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "session {id} at send counter {expected_count}"
            )));
        }
        Ok(())
    }

    /// Persist receive-side progress: chain key, expected counter, and the
    /// replay window, all in one statement.
    pub async fn advance_recv_chain(
        &self,
        id: &str,
        chain_key_enc: &str,
        new_count: i64,
        replay_window: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE e2ee_sessions SET recv_chain_key_enc = ?, recv_count = ?, replay_window = ?, \
             updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(chain_key_enc)
        .bind(new_count)
        .bind(replay_window)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("session {id}")));
        }
        Ok(())
    }

    /// Update only the replay window (replay rejected before any chain work).
    pub async fn update_replay_window(
        &self,
        id: &str,
        replay_window: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE e2ee_sessions SET replay_window = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ?",
        )
        .bind(replay_window)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove every session a user participates in. Used on key reset, where
    /// old sessions can never decrypt again.
    pub async fn delete_sessions_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM e2ee_sessions WHERE user_lo = ? OR user_hi = ?")
                .bind(user_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
