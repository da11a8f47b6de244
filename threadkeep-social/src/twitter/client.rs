//! Thin wrapper around the twitterapi.io tweet endpoints.
//!
//! Handles the `X-API-Key` header, request parameter shaping, the provider's
//! `status: error` envelope, and cursor pagination for thread context.
use std::borrow::Cow;
use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;
use threadkeep_http::{Auth, HttpClient, HttpError, RequestOpts};

use crate::twitter::thread::dedupe_by_id;
use crate::twitter::types::{ThreadContext, ThreadPage, Tweet, TweetsResponse};

pub const API_KEY_HEADER: &str = "X-API-Key";
/// Provider limit for one batch lookup.
pub const MAX_BATCH_IDS: usize = 100;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("provider reported an error: {0}")]
    Provider(String),
    #[error("too many tweet ids: {0} (max 100)")]
    TooManyIds(usize),
    #[error("tweet {0} not found")]
    NotFound(String),
}

#[derive(Clone, Debug)]
pub struct TweetApi {
    http: HttpClient,
    api_key: String,
}

impl TweetApi {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            http: HttpClient::new(base_url)?,
            api_key: api_key.into(),
        })
    }

    /// Reuse a preconfigured client (shared timeouts and retry budget).
    pub fn with_http(http: HttpClient, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
        }
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.http = self.http.with_timeout(dur);
        self
    }

    fn opts<'a>(&'a self, query: Vec<(&'a str, Cow<'a, str>)>) -> RequestOpts<'a> {
        RequestOpts {
            auth: Some(Auth::ApiKey {
                header: API_KEY_HEADER,
                key: &self.api_key,
            }),
            query: Some(query),
            ..Default::default()
        }
    }

    /// Batch lookup. Order follows the provider; missing ids are simply absent.
    pub async fn get_tweets(&self, ids: &[String]) -> Result<Vec<Tweet>, ProviderError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_BATCH_IDS {
            return Err(ProviderError::TooManyIds(ids.len()));
        }
        let joined = ids.join(",");
        let resp: TweetsResponse = self
            .http
            .get_json(
                "twitter/tweets",
                self.opts(vec![("tweet_ids", Cow::Owned(joined))]),
            )
            .await?;
        if resp.envelope.is_error() {
            return Err(ProviderError::Provider(
                resp.envelope.msg.unwrap_or_default(),
            ));
        }
        tracing::debug!(requested = ids.len(), returned = resp.tweets.len(), "provider.tweets");
        Ok(resp.tweets)
    }

    pub async fn get_tweet(&self, id: &str) -> Result<Tweet, ProviderError> {
        self.get_tweets(&[id.to_string()])
            .await?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    /// One page of a tweet's conversation context.
    pub async fn get_thread_page(
        &self,
        tweet_id: &str,
        cursor: Option<&str>,
    ) -> Result<ThreadPage, ProviderError> {
        let mut query = vec![("tweetId", Cow::Borrowed(tweet_id))];
        if let Some(c) = cursor.filter(|c| !c.is_empty()) {
            query.push(("cursor", Cow::Borrowed(c)));
        }
        let page: ThreadPage = self
            .http
            .get_json("twitter/tweet/thread_context", self.opts(query))
            .await?;
        if page.envelope.is_error() {
            return Err(ProviderError::Provider(page.envelope.msg.unwrap_or_default()));
        }
        Ok(page)
    }

    /// Aggregate a conversation across provider pages.
    ///
    /// Stops when the provider reports no next page, hands back an empty or
    /// already seen cursor, or after `max_pages` pages. Tweets are
    /// deduplicated by id (first occurrence wins) and the focal tweet is
    /// fetched on its own when no page contained it.
    pub async fn get_thread(
        &self,
        tweet_id: &str,
        max_pages: u32,
    ) -> Result<ThreadContext, ProviderError> {
        let max_pages = max_pages.max(1);
        let mut collected: Vec<Tweet> = Vec::new();
        let mut cursors_seen: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;
        let mut truncated = false;

        loop {
            let page = self.get_thread_page(tweet_id, cursor.as_deref()).await?;
            pages += 1;
            let page_len = page.tweets.len();
            collected.extend(page.tweets);

            let next = page
                .next_cursor
                .filter(|c| page.has_next_page && !c.is_empty());
            tracing::debug!(
                tweet_id,
                page = pages,
                page_len,
                has_next = next.is_some(),
                "provider.thread.page"
            );

            let Some(next) = next else { break };
            if !cursors_seen.insert(next.clone()) {
                tracing::warn!(tweet_id, cursor = %next, "provider.thread.cursor_repeated");
                break;
            }
            if pages >= max_pages {
                truncated = true;
                break;
            }
            cursor = Some(next);
        }

        let mut tweets = dedupe_by_id(collected);
        if !tweets.iter().any(|t| t.id == tweet_id) {
            let focal = self.get_tweet(tweet_id).await?;
            tweets.insert(0, focal);
        }

        let root_tweet_id = tweets
            .iter()
            .find(|t| t.id == tweet_id)
            .and_then(|t| t.conversation_id.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| tweet_id.to_string());

        tracing::info!(
            tweet_id,
            root_tweet_id = %root_tweet_id,
            pages,
            tweets = tweets.len(),
            truncated,
            "provider.thread.fetched"
        );

        Ok(ThreadContext {
            tweet_id: tweet_id.to_string(),
            root_tweet_id,
            tweets,
            pages,
            truncated,
        })
    }
}
