use anyhow::Result;

use crate::Store;

/// Setting name for a provider key pulled from the proxy.
pub const PROVIDER_API_KEY: &str = "provider_api_key";

impl Store {
    pub async fn get_setting(&self, name: &str) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar("SELECT value FROM settings WHERE name = ?")
                .bind(name)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    pub async fn set_setting(&self, name: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (name, value) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        )
        .bind(name)
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn delete_setting(&self, name: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM settings WHERE name = ?")
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(res.rows_affected() == 1)
    }
}
