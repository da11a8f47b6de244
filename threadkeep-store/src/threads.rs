//! Cached thread content for saved items.
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use threadkeep_social::twitter::Tweet;

use crate::{from_millis, to_millis, Store};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadCacheEntry {
    pub tweet_id: String,
    pub root_tweet_id: String,
    pub tweets: Vec<Tweet>,
    pub fetched_at: DateTime<Utc>,
    /// The provider page cap cut the thread short when it was fetched.
    #[serde(default)]
    pub truncated: bool,
}

impl ThreadCacheEntry {
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < ttl
    }
}

#[derive(sqlx::FromRow)]
struct ThreadRow {
    tweet_id: String,
    root_tweet_id: String,
    tweets_json: String,
    fetched_at: i64,
    truncated: bool,
}

impl Store {
    /// Cache a thread. Only saved tweets own a cache entry, so this is a
    /// no-op returning `false` when the item does not exist.
    pub async fn put_thread(&self, entry: &ThreadCacheEntry) -> Result<bool> {
        let res = sqlx::query(
            "INSERT INTO thread_cache (tweet_id, root_tweet_id, tweets_json, fetched_at, truncated)
             SELECT ?, ?, ?, ?, ?
             WHERE EXISTS (SELECT 1 FROM saved_items WHERE tweet_id = ?)
             ON CONFLICT(tweet_id) DO UPDATE SET
               root_tweet_id = excluded.root_tweet_id,
               tweets_json = excluded.tweets_json,
               fetched_at = excluded.fetched_at,
               truncated = excluded.truncated",
        )
        .bind(&entry.tweet_id)
        .bind(&entry.root_tweet_id)
        .bind(serde_json::to_string(&entry.tweets)?)
        .bind(to_millis(entry.fetched_at))
        .bind(entry.truncated)
        .bind(&entry.tweet_id)
        .execute(self.pool())
        .await?;

        let stored = res.rows_affected() == 1;
        tracing::debug!(
            tweet_id = %entry.tweet_id,
            tweets = entry.tweets.len(),
            stored,
            "store.thread.cached"
        );
        Ok(stored)
    }

    pub async fn get_thread(&self, tweet_id: &str) -> Result<Option<ThreadCacheEntry>> {
        let row: Option<ThreadRow> = sqlx::query_as(
            "SELECT tweet_id, root_tweet_id, tweets_json, fetched_at, truncated
             FROM thread_cache WHERE tweet_id = ?",
        )
        .bind(tweet_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| -> Result<ThreadCacheEntry> {
            let tweets = serde_json::from_str(&r.tweets_json)
                .with_context(|| format!("corrupt thread cache for {}", r.tweet_id))?;
            Ok(ThreadCacheEntry {
                tweet_id: r.tweet_id,
                root_tweet_id: r.root_tweet_id,
                tweets,
                fetched_at: from_millis(r.fetched_at)?,
                truncated: r.truncated,
            })
        })
        .transpose()
    }

    /// Delete cache entries whose saved item no longer exists.
    pub async fn gc_orphan_threads(&self) -> Result<u64> {
        let removed = sqlx::query(
            "DELETE FROM thread_cache
             WHERE tweet_id NOT IN (SELECT tweet_id FROM saved_items)",
        )
        .execute(self.pool())
        .await?
        .rows_affected();
        if removed > 0 {
            tracing::info!(removed, "store.thread.gc");
        }
        Ok(removed)
    }
}
