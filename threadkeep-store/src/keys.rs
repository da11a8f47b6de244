//! Per-user provider API keys, sealed with [`SecretCipher`] before they touch disk.
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{from_millis, to_millis, SecretCipher, Store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredApiKey {
    pub api_key: String,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub async fn put_api_key(
        &self,
        user_id: &str,
        plaintext: &str,
        cipher: &SecretCipher,
    ) -> Result<DateTime<Utc>> {
        let sealed = cipher.seal(plaintext)?;
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO api_keys (user_id, encrypted_value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
               encrypted_value = excluded.encrypted_value,
               updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(sealed)
        .bind(to_millis(now))
        .execute(self.pool())
        .await?;
        tracing::info!(user_id, key_id = cipher.key_id(), "store.api_key.stored");
        from_millis(to_millis(now))
    }

    pub async fn get_api_key(
        &self,
        user_id: &str,
        cipher: &SecretCipher,
    ) -> Result<Option<StoredApiKey>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT encrypted_value, updated_at FROM api_keys WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(self.pool())
                .await?;
        let Some((sealed, updated_at)) = row else {
            return Ok(None);
        };
        Ok(Some(StoredApiKey {
            api_key: cipher.open(&sealed)?,
            updated_at: from_millis(updated_at)?,
        }))
    }

    pub async fn delete_api_key(&self, user_id: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM api_keys WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(res.rows_affected() == 1)
    }
}
