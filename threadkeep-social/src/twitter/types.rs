use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A provider post. Only the fields threadkeep reads are typed; everything
/// else is kept in `extra` so stored payloads stay faithful to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tweet {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(
        default,
        rename = "quoted_tweet",
        skip_serializing_if = "Option::is_none"
    )]
    pub quoted_tweet: Option<Box<Tweet>>,
    #[serde(
        default,
        rename = "retweeted_tweet",
        skip_serializing_if = "Option::is_none"
    )]
    pub retweeted_tweet: Option<Box<Tweet>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tweet {
    /// Snowflake ids grow with time, so this doubles as a chronological key.
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.parse().ok()
    }

    pub fn author_handle(&self) -> Option<&str> {
        self.author
            .as_ref()
            .map(|a| a.user_name.as_str())
            .filter(|h| !h.is_empty())
    }

    pub fn author_id(&self) -> Option<&str> {
        self.author.as_ref().and_then(|a| a.id.as_deref())
    }

    /// Provider URL when present, otherwise the canonical status URL.
    pub fn status_url(&self) -> String {
        match &self.url {
            Some(u) if !u.is_empty() => u.clone(),
            _ => crate::twitter::url::canonical_url(self.author_handle(), &self.id),
        }
    }

    /// Media URLs from `extendedEntities.media` / `entities.media`.
    pub fn media_urls(&self) -> Vec<String> {
        ["extendedEntities", "entities"]
            .iter()
            .filter_map(|k| self.extra.get(*k))
            .filter_map(|e| e.get("media").and_then(Value::as_array))
            .find(|media| !media.is_empty())
            .map(|media| {
                media
                    .iter()
                    .filter_map(|m| {
                        m.get("media_url_https")
                            .or_else(|| m.get("url"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Envelope shared by every provider response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
}

impl Envelope {
    pub fn is_error(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("error"))
    }
}

/// `GET twitter/tweets?tweet_ids=...`
#[derive(Debug, Clone, Deserialize)]
pub struct TweetsResponse {
    #[serde(default)]
    pub tweets: Vec<Tweet>,
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// `GET twitter/tweet/thread_context?tweetId=...&cursor=...`
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadPage {
    #[serde(default, alias = "replies")]
    pub tweets: Vec<Tweet>,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// A focal tweet's conversation aggregated across provider pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadContext {
    pub tweet_id: String,
    pub root_tweet_id: String,
    pub tweets: Vec<Tweet>,
    pub pages: u32,
    /// More pages were available when the page cap was reached.
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_fields_survive_roundtrip() {
        let raw = json!({
            "id": "1850000000000000001",
            "text": "hello",
            "createdAt": "Tue Oct 15 10:00:00 +0000 2024",
            "likeCount": 12,
            "author": { "id": "42", "userName": "alice", "name": "Alice", "followers": 7 },
            "quoted_tweet": { "id": "9", "text": "quoted" },
            "isReply": false
        });
        let tweet: Tweet = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(tweet.author_handle(), Some("alice"));
        assert_eq!(tweet.quoted_tweet.as_ref().unwrap().text, "quoted");
        assert_eq!(tweet.extra["likeCount"], 12);

        let back = serde_json::to_value(&tweet).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn null_optional_fields_are_accepted() {
        let tweet: Tweet = serde_json::from_value(json!({
            "id": "5",
            "text": "x",
            "inReplyToId": null,
            "quoted_tweet": null
        }))
        .unwrap();
        assert!(tweet.in_reply_to_id.is_none());
        assert!(tweet.quoted_tweet.is_none());
    }

    #[test]
    fn status_url_falls_back_to_canonical() {
        let tweet: Tweet =
            serde_json::from_value(json!({"id": "77", "author": {"userName": "bob"}})).unwrap();
        assert_eq!(tweet.status_url(), "https://x.com/bob/status/77");
    }

    #[test]
    fn media_urls_prefer_extended_entities() {
        let tweet: Tweet = serde_json::from_value(json!({
            "id": "1",
            "extendedEntities": { "media": [
                { "media_url_https": "https://pbs.example/a.jpg" },
                { "media_url_https": "https://pbs.example/b.jpg" }
            ]},
            "entities": { "media": [ { "media_url_https": "https://pbs.example/a.jpg" } ] }
        }))
        .unwrap();
        assert_eq!(
            tweet.media_urls(),
            vec!["https://pbs.example/a.jpg", "https://pbs.example/b.jpg"]
        );
    }

    #[test]
    fn thread_page_accepts_replies_alias() {
        let page: ThreadPage = serde_json::from_value(json!({
            "replies": [ { "id": "1", "text": "a" } ],
            "has_next_page": true,
            "next_cursor": "c1",
            "status": "success"
        }))
        .unwrap();
        assert_eq!(page.tweets.len(), 1);
        assert!(page.has_next_page);
        assert!(!page.envelope.is_error());
    }
}
