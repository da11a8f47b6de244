//! SQLite persistence for threadkeep.
//!
//! One schema serves both processes: the client keeps its saved items,
//! thread cache, and settings here; the proxy keeps encrypted provider keys.
//! All queries go through a shared [`SqlitePool`]; writes that touch more than
//! one table run in a transaction.
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub mod crypto;
pub mod items;
pub mod keys;
pub mod settings;
pub mod threads;

pub use crypto::SecretCipher;
pub use items::{ImportReport, SavedItem};
pub use keys::StoredApiKey;
pub use threads::ThreadCacheEntry;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS saved_items (
    tweet_id   TEXT PRIMARY KEY NOT NULL,
    url        TEXT NOT NULL,
    tweet_json TEXT NOT NULL,
    saved_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_saved_items_saved_at ON saved_items (saved_at DESC);

CREATE TABLE IF NOT EXISTS thread_cache (
    tweet_id      TEXT PRIMARY KEY NOT NULL,
    root_tweet_id TEXT NOT NULL,
    tweets_json   TEXT NOT NULL,
    fetched_at    INTEGER NOT NULL,
    truncated     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS settings (
    name  TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_keys (
    user_id         TEXT PRIMARY KEY NOT NULL,
    encrypted_value TEXT NOT NULL,
    updated_at      INTEGER NOT NULL
);
"#;

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url: {url}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .with_context(|| format!("failed to open database: {url}"))?;
        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(url, "store.connected");
        Ok(store)
    }

    /// Private in-memory database; a single connection keeps it alive.
    pub async fn memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("failed to apply schema")?;

        // Databases created before the page cap was recorded lack the column.
        let has_truncated: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('thread_cache') WHERE name = 'truncated'",
        )
        .fetch_one(&self.pool)
        .await?;
        if !has_truncated {
            sqlx::query("ALTER TABLE thread_cache ADD COLUMN truncated INTEGER NOT NULL DEFAULT 0")
                .execute(&self.pool)
                .await
                .context("failed to add thread_cache.truncated")?;
            tracing::info!("store.migrated.thread_cache_truncated");
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .with_context(|| format!("timestamp out of range: {ms}"))
}
