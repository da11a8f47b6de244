//! Client-side operations behind the `threadkeep` subcommands.
//!
//! A [`Session`] pairs the local [`Store`] with a [`ProxyClient`]. Saved items
//! and their thread caches live only in the local store; the proxy is used for
//! tweet content and for syncing the provider key between devices.
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use threadkeep_config::ClientConfig;
use threadkeep_social::twitter::{
    Tweet, TweetRef, client::MAX_BATCH_IDS, parse_tweet_ref, reconstruct_thread,
    url::canonical_url,
};
use threadkeep_store::{
    ImportReport, SavedItem, Store, ThreadCacheEntry, settings::PROVIDER_API_KEY,
};

use crate::client::ProxyClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(String),
    AlreadySaved(String),
    NotFound(String),
    Invalid { input: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadSource {
    Cache,
    Proxy,
    /// The proxy failed and an expired cache entry was used instead.
    StaleCache,
}

#[derive(Debug, Clone)]
pub struct ThreadView {
    pub tweet_id: String,
    pub tweets: Vec<Tweet>,
    pub source: ThreadSource,
    pub truncated: bool,
    pub saved: bool,
}

pub struct Session {
    store: Store,
    proxy: ProxyClient,
    config_key: Option<String>,
    cache_ttl: Duration,
    max_pages: Option<u32>,
}

impl Session {
    /// Open the local store and point a proxy client at `client.proxy_url`.
    ///
    /// The provider key sent to the proxy is `client.api_key` when set,
    /// otherwise the key last stored with `key set` or `key pull`.
    pub async fn open(config: &ClientConfig) -> Result<Self> {
        let store = Store::connect(&config.database_url).await?;
        let proxy = ProxyClient::new(&config.proxy_url)
            .with_context(|| format!("invalid client.proxy_url: {}", config.proxy_url))?
            .with_auth_token(config.auth_token().map(str::to_string));
        let mut session = Self::new(store, proxy, config);
        let key = session.local_key().await?;
        session.proxy = session.proxy.with_api_key(key);
        Ok(session)
    }

    pub fn new(store: Store, proxy: ProxyClient, config: &ClientConfig) -> Self {
        let ttl_secs = i64::try_from(config.thread_cache_ttl_secs).unwrap_or(i64::MAX / 1000);
        Self {
            store,
            proxy,
            config_key: config.api_key().map(str::to_string),
            cache_ttl: Duration::try_seconds(ttl_secs).unwrap_or(Duration::MAX),
            max_pages: config.max_pages,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Fetch and save every parseable input. Ids already in the collection
    /// are not fetched again and keep their position.
    pub async fn save(&self, inputs: &[String]) -> Result<Vec<SaveOutcome>> {
        let mut outcomes = Vec::with_capacity(inputs.len());
        let mut pending: Vec<TweetRef> = Vec::new();

        for input in inputs {
            let tweet_ref = match parse_tweet_ref(input) {
                Ok(r) => r,
                Err(err) => {
                    outcomes.push(SaveOutcome::Invalid {
                        input: input.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            if self.store.get_item(&tweet_ref.tweet_id).await?.is_some() {
                outcomes.push(SaveOutcome::AlreadySaved(tweet_ref.tweet_id));
            } else if !pending.iter().any(|p| p.tweet_id == tweet_ref.tweet_id) {
                pending.push(tweet_ref);
            }
        }

        for chunk in pending.chunks(MAX_BATCH_IDS) {
            let ids: Vec<String> = chunk.iter().map(|r| r.tweet_id.clone()).collect();
            let tweets = self
                .proxy
                .get_tweets(&ids)
                .await
                .context("failed to fetch tweets from the proxy")?;

            for tweet_ref in chunk {
                let Some(tweet) = tweets.iter().find(|t| t.id == tweet_ref.tweet_id) else {
                    outcomes.push(SaveOutcome::NotFound(tweet_ref.tweet_id.clone()));
                    continue;
                };
                let handle = tweet.author_handle().or(tweet_ref.handle.as_deref());
                let item = SavedItem::new(tweet.clone(), canonical_url(handle, &tweet.id));
                let id = tweet.id.clone();
                if self.store.save_item(&item).await? {
                    outcomes.push(SaveOutcome::Saved(id));
                } else {
                    outcomes.push(SaveOutcome::AlreadySaved(id));
                }
            }
        }

        tracing::info!(inputs = inputs.len(), "client.save.done");
        Ok(outcomes)
    }

    pub async fn list(&self) -> Result<Vec<SavedItem>> {
        self.store.list_items().await
    }

    /// The focal author's thread around `input`, from cache when fresh.
    pub async fn show(&self, input: &str, refresh: bool) -> Result<ThreadView> {
        let tweet_id = parse_tweet_ref(input)?.tweet_id;
        let saved = self.store.get_item(&tweet_id).await?.is_some();
        let cached = self.store.get_thread(&tweet_id).await?;

        if let Some(entry) = cached.as_ref().filter(|e| !refresh && e.is_fresh(self.cache_ttl, Utc::now())) {
            tracing::debug!(tweet_id = %tweet_id, "client.thread.cache_hit");
            return Ok(ThreadView {
                tweet_id,
                tweets: entry.tweets.clone(),
                source: ThreadSource::Cache,
                truncated: entry.truncated,
                saved,
            });
        }

        let context = match self.proxy.get_thread(&tweet_id, self.max_pages).await {
            Ok(context) => context,
            Err(err) => {
                let Some(entry) = cached else {
                    return Err(err).context("failed to fetch thread from the proxy");
                };
                tracing::warn!(tweet_id = %tweet_id, error = %err, "client.thread.stale_cache");
                return Ok(ThreadView {
                    tweet_id,
                    tweets: entry.tweets,
                    source: ThreadSource::StaleCache,
                    truncated: entry.truncated,
                    saved,
                });
            }
        };

        let truncated = context.truncated;
        let tweets = reconstruct_thread(&tweet_id, context.tweets);
        if saved {
            if let Some(focal) = tweets.iter().find(|t| t.id == tweet_id) {
                self.store.update_item_tweet(focal).await?;
            }
            self.store
                .put_thread(&ThreadCacheEntry {
                    tweet_id: tweet_id.clone(),
                    root_tweet_id: context.root_tweet_id,
                    tweets: tweets.clone(),
                    fetched_at: Utc::now(),
                    truncated,
                })
                .await?;
        }

        Ok(ThreadView {
            tweet_id,
            tweets,
            source: ThreadSource::Proxy,
            truncated,
            saved,
        })
    }

    pub async fn remove(&self, input: &str) -> Result<bool> {
        let tweet_id = parse_tweet_ref(input)?.tweet_id;
        self.store.delete_item(&tweet_id).await
    }

    pub async fn export_json(&self) -> Result<String> {
        let items = self.store.list_items().await?;
        Ok(serde_json::to_string_pretty(&items)?)
    }

    /// Merge an exported list, or swap the collection for it with `replace`.
    pub async fn import_json(&self, json: &str, replace: bool) -> Result<ImportReport> {
        let items: Vec<SavedItem> =
            serde_json::from_str(json).context("import file is not a threadkeep export")?;
        if !replace {
            return self.store.import_items(&items).await;
        }
        let written = self.store.replace_items(&items).await?;
        Ok(ImportReport {
            inserted: written,
            updated: 0,
            skipped: items.len() - written,
        })
    }

    pub async fn gc(&self) -> Result<u64> {
        self.store.gc_orphan_threads().await
    }

    async fn local_key(&self) -> Result<Option<String>> {
        if let Some(key) = &self.config_key {
            return Ok(Some(key.clone()));
        }
        self.store.get_setting(PROVIDER_API_KEY).await
    }

    pub async fn set_local_key(&self, api_key: &str) -> Result<()> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            bail!("API key must not be empty");
        }
        self.store.set_setting(PROVIDER_API_KEY, api_key).await
    }

    /// Upload the local key so other devices can pull it.
    pub async fn push_key(&self) -> Result<DateTime<Utc>> {
        self.require_auth()?;
        let Some(key) = self.local_key().await? else {
            bail!("no local API key; run `threadkeep key set <key>` first");
        };
        self.proxy
            .put_key(&key)
            .await
            .context("failed to push API key")
    }

    /// Store the proxy's copy locally. Returns `false` when the proxy has none.
    pub async fn pull_key(&self) -> Result<bool> {
        self.require_auth()?;
        let Some(remote) = self.proxy.get_key().await.context("failed to pull API key")? else {
            return Ok(false);
        };
        self.store.set_setting(PROVIDER_API_KEY, &remote.api_key).await?;
        tracing::info!(updated_at = %remote.updated_at, "client.api_key.pulled");
        Ok(true)
    }

    pub async fn clear_key(&self, remote: bool) -> Result<()> {
        if remote {
            self.require_auth()?;
            self.proxy
                .delete_key()
                .await
                .context("failed to delete remote API key")?;
        }
        self.store.delete_setting(PROVIDER_API_KEY).await?;
        Ok(())
    }

    fn require_auth(&self) -> Result<()> {
        if !self.proxy.has_auth_token() {
            bail!("key sync needs client.auth_token (THREADKEEP__CLIENT__AUTH_TOKEN)");
        }
        Ok(())
    }
}
