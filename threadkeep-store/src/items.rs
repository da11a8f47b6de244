//! The saved collection: one row per tweet, newest first.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use threadkeep_social::twitter::Tweet;

use crate::{from_millis, to_millis, Store};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedItem {
    pub tweet_id: String,
    pub url: String,
    pub tweet: Tweet,
    pub saved_at: DateTime<Utc>,
}

impl SavedItem {
    pub fn new(tweet: Tweet, url: impl Into<String>) -> Self {
        Self {
            tweet_id: tweet.id.clone(),
            url: url.into(),
            tweet,
            saved_at: Utc::now(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    tweet_id: String,
    url: String,
    tweet_json: String,
    saved_at: i64,
}

impl TryFrom<ItemRow> for SavedItem {
    type Error = anyhow::Error;

    fn try_from(row: ItemRow) -> Result<Self> {
        let tweet: Tweet = serde_json::from_str(&row.tweet_json)
            .with_context(|| format!("corrupt tweet payload for {}", row.tweet_id))?;
        Ok(SavedItem {
            tweet_id: row.tweet_id,
            url: row.url,
            tweet,
            saved_at: from_millis(row.saved_at)?,
        })
    }
}

/// Outcome of merging an exported collection into the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

const SELECT_ITEMS: &str = "SELECT tweet_id, url, tweet_json, saved_at FROM saved_items";

impl Store {
    /// Insert unless the tweet is already saved. Returns whether a row was added;
    /// an existing item keeps its original `saved_at` and position.
    pub async fn save_item(&self, item: &SavedItem) -> Result<bool> {
        let tweet_json = serde_json::to_string(&item.tweet)?;
        let res = sqlx::query(
            "INSERT INTO saved_items (tweet_id, url, tweet_json, saved_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(tweet_id) DO NOTHING",
        )
        .bind(&item.tweet_id)
        .bind(&item.url)
        .bind(tweet_json)
        .bind(to_millis(item.saved_at))
        .execute(self.pool())
        .await?;

        let inserted = res.rows_affected() == 1;
        tracing::debug!(tweet_id = %item.tweet_id, inserted, "store.item.saved");
        Ok(inserted)
    }

    /// Replace the stored tweet payload, keeping `saved_at`.
    pub async fn update_item_tweet(&self, tweet: &Tweet) -> Result<bool> {
        let res = sqlx::query("UPDATE saved_items SET tweet_json = ? WHERE tweet_id = ?")
            .bind(serde_json::to_string(tweet)?)
            .bind(&tweet.id)
            .execute(self.pool())
            .await?;
        Ok(res.rows_affected() == 1)
    }

    /// Most recently saved first; equal timestamps fall back to newer tweet ids.
    pub async fn list_items(&self) -> Result<Vec<SavedItem>> {
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "{SELECT_ITEMS} ORDER BY saved_at DESC, length(tweet_id) DESC, tweet_id DESC"
        ))
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(SavedItem::try_from).collect()
    }

    pub async fn get_item(&self, tweet_id: &str) -> Result<Option<SavedItem>> {
        let row: Option<ItemRow> = sqlx::query_as(&format!("{SELECT_ITEMS} WHERE tweet_id = ?"))
            .bind(tweet_id)
            .fetch_optional(self.pool())
            .await?;
        row.map(SavedItem::try_from).transpose()
    }

    /// Remove an item together with its cached thread.
    pub async fn delete_item(&self, tweet_id: &str) -> Result<bool> {
        let mut tx = self.pool().begin().await?;
        let removed = sqlx::query("DELETE FROM saved_items WHERE tweet_id = ?")
            .bind(tweet_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM thread_cache WHERE tweet_id = ?")
            .bind(tweet_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(tweet_id, removed, "store.item.deleted");
        Ok(removed == 1)
    }

    /// Swap the whole collection for `items`. Thread caches of items that are
    /// not kept are dropped in the same transaction.
    pub async fn replace_items(&self, items: &[SavedItem]) -> Result<usize> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM saved_items").execute(&mut *tx).await?;

        let mut written = 0;
        for item in items {
            written += sqlx::query(
                "INSERT INTO saved_items (tweet_id, url, tweet_json, saved_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(tweet_id) DO NOTHING",
            )
            .bind(&item.tweet_id)
            .bind(&item.url)
            .bind(serde_json::to_string(&item.tweet)?)
            .bind(to_millis(item.saved_at))
            .execute(&mut *tx)
            .await?
            .rows_affected() as usize;
        }

        sqlx::query(
            "DELETE FROM thread_cache
             WHERE tweet_id NOT IN (SELECT tweet_id FROM saved_items)",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(items = written, "store.items.replaced");
        Ok(written)
    }

    /// Merge items: new ids are inserted, existing ids are replaced only by a
    /// newer `saved_at`, everything else is skipped.
    pub async fn import_items(&self, items: &[SavedItem]) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let mut tx = self.pool().begin().await?;

        for item in items {
            let existing: Option<i64> =
                sqlx::query_scalar("SELECT saved_at FROM saved_items WHERE tweet_id = ?")
                    .bind(&item.tweet_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let saved_at = to_millis(item.saved_at);
            if existing.is_some_and(|at| at >= saved_at) {
                report.skipped += 1;
                continue;
            }

            sqlx::query(
                "INSERT INTO saved_items (tweet_id, url, tweet_json, saved_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(tweet_id) DO UPDATE SET
                   url = excluded.url,
                   tweet_json = excluded.tweet_json,
                   saved_at = excluded.saved_at",
            )
            .bind(&item.tweet_id)
            .bind(&item.url)
            .bind(serde_json::to_string(&item.tweet)?)
            .bind(saved_at)
            .execute(&mut *tx)
            .await?;

            if existing.is_some() {
                report.updated += 1;
            } else {
                report.inserted += 1;
            }
        }

        tx.commit().await?;
        tracing::info!(
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            "store.items.imported"
        );
        Ok(report)
    }
}
