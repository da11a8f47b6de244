//! Parsing pasted tweet links into tweet ids.
use thiserror::Error;
use url::Url;

const TWEET_HOSTS: &[&str] = &[
    "twitter.com",
    "x.com",
    "mobile.twitter.com",
    "mobile.x.com",
    "fxtwitter.com",
    "vxtwitter.com",
    "fixupx.com",
    "fixvx.com",
    "nitter.net",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TweetUrlError {
    #[error("empty input")]
    Empty,
    #[error("not a URL or tweet id: {0}")]
    Malformed(String),
    #[error("unsupported host: {0}")]
    UnsupportedHost(String),
    #[error("no status id in path: {0}")]
    MissingStatus(String),
}

/// A tweet reference extracted from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetRef {
    pub tweet_id: String,
    pub handle: Option<String>,
}

impl TweetRef {
    pub fn canonical_url(&self) -> String {
        canonical_url(self.handle.as_deref(), &self.tweet_id)
    }
}

/// Canonical `x.com` status URL; `/i/web/status/<id>` when the handle is unknown.
pub fn canonical_url(handle: Option<&str>, id: &str) -> String {
    match handle {
        Some(h) if !h.is_empty() => format!("https://x.com/{h}/status/{id}"),
        _ => format!("https://x.com/i/web/status/{id}"),
    }
}

fn is_tweet_id(s: &str) -> bool {
    !s.is_empty() && s.len() <= 20 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Accepts tweet links from the usual hosts and mirrors, with or without a
/// scheme, plus bare numeric ids.
///
/// ```
/// use threadkeep_social::twitter::url::parse_tweet_ref;
///
/// let r = parse_tweet_ref("https://x.com/alice/status/1850000000000000001?s=20").unwrap();
/// assert_eq!(r.tweet_id, "1850000000000000001");
/// assert_eq!(r.handle.as_deref(), Some("alice"));
/// ```
pub fn parse_tweet_ref(input: &str) -> Result<TweetRef, TweetUrlError> {
    let trimmed = input.trim().trim_matches(|c| c == '<' || c == '>');
    if trimmed.is_empty() {
        return Err(TweetUrlError::Empty);
    }
    if is_tweet_id(trimmed) {
        return Ok(TweetRef {
            tweet_id: trimmed.to_string(),
            handle: None,
        });
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&with_scheme).map_err(|_| TweetUrlError::Malformed(trimmed.into()))?;

    let host = url
        .host_str()
        .ok_or_else(|| TweetUrlError::Malformed(trimmed.into()))?
        .to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if !TWEET_HOSTS.contains(&host) {
        return Err(TweetUrlError::UnsupportedHost(host.to_string()));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    // <handle>/status/<id>, i/web/status/<id>, i/status/<id>, <handle>/statuses/<id>
    let pos = segments
        .iter()
        .position(|s| matches!(*s, "status" | "statuses"))
        .ok_or_else(|| TweetUrlError::MissingStatus(url.path().to_string()))?;
    let id = segments
        .get(pos + 1)
        .filter(|s| is_tweet_id(s))
        .ok_or_else(|| TweetUrlError::MissingStatus(url.path().to_string()))?;

    let handle = match pos {
        1 if segments[0] != "i" => Some(segments[0].trim_start_matches('@').to_string()),
        _ => None,
    };

    Ok(TweetRef {
        tweet_id: (*id).to_string(),
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_of(input: &str) -> String {
        parse_tweet_ref(input).unwrap().tweet_id
    }

    #[test]
    fn accepts_common_shapes() {
        assert_eq!(id_of("https://twitter.com/jack/status/20"), "20");
        assert_eq!(id_of("https://www.x.com/jack/status/20/photo/1"), "20");
        assert_eq!(id_of("x.com/jack/status/20?s=46&t=abc"), "20");
        assert_eq!(id_of("https://mobile.twitter.com/jack/statuses/20#frag"), "20");
        assert_eq!(id_of("https://fxtwitter.com/jack/status/20"), "20");
        assert_eq!(id_of("https://x.com/i/web/status/20"), "20");
        assert_eq!(id_of("https://x.com/i/status/20"), "20");
        assert_eq!(id_of("  20  "), "20");
        assert_eq!(id_of("<https://x.com/jack/status/20>"), "20");
    }

    #[test]
    fn handle_is_kept_except_for_i_paths() {
        let r = parse_tweet_ref("https://x.com/Jack/status/20").unwrap();
        assert_eq!(r.handle.as_deref(), Some("Jack"));
        assert_eq!(r.canonical_url(), "https://x.com/Jack/status/20");

        let r = parse_tweet_ref("https://x.com/i/web/status/20").unwrap();
        assert_eq!(r.handle, None);
        assert_eq!(r.canonical_url(), "https://x.com/i/web/status/20");
    }

    #[test]
    fn rejects_non_tweets() {
        assert_eq!(parse_tweet_ref("   "), Err(TweetUrlError::Empty));
        assert!(matches!(
            parse_tweet_ref("https://example.com/jack/status/20"),
            Err(TweetUrlError::UnsupportedHost(h)) if h == "example.com"
        ));
        assert!(matches!(
            parse_tweet_ref("https://x.com/jack"),
            Err(TweetUrlError::MissingStatus(_))
        ));
        assert!(matches!(
            parse_tweet_ref("https://x.com/jack/status/abc"),
            Err(TweetUrlError::MissingStatus(_))
        ));
        assert!(parse_tweet_ref("not a url at all").is_err());
    }
}
