//! HTTP client for the threadkeep proxy.
use std::borrow::Cow;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use threadkeep_http::{Auth, HttpClient, HttpError, RequestOpts};
use threadkeep_social::twitter::{ThreadContext, Tweet};

#[derive(Debug, Deserialize)]
struct TweetsBody {
    #[serde(default)]
    tweets: Vec<Tweet>,
}

/// A provider key held by the proxy for the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteKey {
    pub api_key: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStored {
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct ProxyClient {
    http: HttpClient,
    api_key: Option<String>,
    auth_token: Option<String>,
}

impl ProxyClient {
    pub fn new(proxy_url: &str) -> Result<Self, HttpError> {
        Ok(Self {
            http: HttpClient::new(proxy_url)?,
            api_key: None,
            auth_token: None,
        })
    }

    /// Provider key forwarded as `X-API-Key`. Without one the proxy falls
    /// back to the caller's stored key or its own default.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn has_auth_token(&self) -> bool {
        self.auth_token.is_some()
    }

    fn opts<'a>(&'a self, query: Vec<(&'a str, Cow<'a, str>)>) -> RequestOpts<'a> {
        let mut headers = HeaderMap::new();
        if let Some(value) = self
            .api_key
            .as_deref()
            .and_then(|k| HeaderValue::from_str(k).ok())
        {
            headers.insert(HeaderName::from_static("x-api-key"), value);
        }
        RequestOpts {
            auth: self.auth_token.as_deref().map(Auth::Bearer),
            headers: Some(headers),
            query: (!query.is_empty()).then_some(query),
            ..Default::default()
        }
    }

    pub async fn get_tweets(&self, ids: &[String]) -> Result<Vec<Tweet>, HttpError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body: TweetsBody = self
            .http
            .get_json(
                "api/tweets",
                self.opts(vec![("ids", Cow::Owned(ids.join(",")))]),
            )
            .await?;
        Ok(body.tweets)
    }

    pub async fn get_tweet(&self, id: &str) -> Result<Tweet, HttpError> {
        self.http
            .get_json(&format!("api/tweets/{id}"), self.opts(Vec::new()))
            .await
    }

    pub async fn get_thread(
        &self,
        id: &str,
        max_pages: Option<u32>,
    ) -> Result<ThreadContext, HttpError> {
        let query = max_pages
            .map(|n| vec![("max_pages", Cow::Owned(n.to_string()))])
            .unwrap_or_default();
        self.http
            .get_json(&format!("api/thread/{id}"), self.opts(query))
            .await
    }

    /// `None` when the proxy holds no key for this user.
    pub async fn get_key(&self) -> Result<Option<RemoteKey>, HttpError> {
        match self.http.get_json("api/key", self.opts(Vec::new())).await {
            Ok(key) => Ok(Some(key)),
            Err(err) if err.status().is_some_and(|s| s.as_u16() == 404) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn put_key(&self, api_key: &str) -> Result<DateTime<Utc>, HttpError> {
        let stored: KeyStored = self
            .http
            .put_json("api/key", &json!({ "apiKey": api_key }), self.opts(Vec::new()))
            .await?;
        Ok(stored.updated_at)
    }

    pub async fn delete_key(&self) -> Result<(), HttpError> {
        let _: Value = self
            .http
            .delete_json("api/key", self.opts(Vec::new()))
            .await?;
        Ok(())
    }
}
