//! Plain-text rendering of saved items and threads.
//!
//! Consecutive tweets by one author share a single header line. Quoted and
//! retweeted posts are nested with a `> ` gutter, at most [`MAX_NESTING`]
//! levels deep; anything deeper collapses to its link.
use threadkeep_social::twitter::{Tweet, thread::same_author};
use threadkeep_store::SavedItem;

pub const MAX_NESTING: usize = 2;
const MIN_WIDTH: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    width: usize,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(80)
    }
}

impl Renderer {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(MIN_WIDTH),
        }
    }

    pub fn thread(&self, tweets: &[Tweet]) -> String {
        let mut out = String::new();
        let mut prev: Option<&Tweet> = None;
        for tweet in tweets {
            let new_run = prev.is_none_or(|p| !same_author(p, tweet));
            if new_run {
                if prev.is_some() {
                    out.push('\n');
                }
                out.push_str(&header(tweet));
                out.push('\n');
            }
            self.body(tweet, 0, &mut out);
            prev = Some(tweet);
        }
        out
    }

    /// One line per saved item for `list`.
    pub fn item_line(&self, item: &SavedItem) -> String {
        let handle = item.tweet.author_handle().unwrap_or("unknown");
        let lead = format!(
            "{}  {:<20}  @{}  ",
            item.saved_at.format("%Y-%m-%d"),
            item.tweet_id,
            handle
        );
        let room = self.width.saturating_sub(lead.chars().count()).max(10);
        format!("{lead}{}", snippet(&item.tweet.text, room))
    }

    fn body(&self, tweet: &Tweet, depth: usize, out: &mut String) {
        let gutter = "> ".repeat(depth);
        let width = self.width.saturating_sub(gutter.len()).max(MIN_WIDTH / 2);

        for raw_line in tweet.text.split('\n') {
            if raw_line.trim().is_empty() {
                out.push_str(gutter.trim_end());
                out.push('\n');
                continue;
            }
            for seg in textwrap::wrap(raw_line, width) {
                out.push_str(&gutter);
                out.push_str(&seg);
                out.push('\n');
            }
        }

        for url in tweet.media_urls() {
            out.push_str(&format!("{gutter}[media] {url}\n"));
        }

        let nested = [
            ("quoting", tweet.quoted_tweet.as_deref()),
            ("retweet of", tweet.retweeted_tweet.as_deref()),
        ];
        for (label, inner) in nested {
            let Some(inner) = inner else { continue };
            if depth < MAX_NESTING {
                let inner_gutter = "> ".repeat(depth + 1);
                out.push_str(&format!("{inner_gutter}{label} {}\n", header(inner)));
                self.body(inner, depth + 1, out);
            } else {
                out.push_str(&format!("{gutter}[{label}] {}\n", inner.status_url()));
            }
        }
    }
}

fn header(tweet: &Tweet) -> String {
    let handle = tweet.author_handle().unwrap_or("unknown");
    let name = tweet
        .author
        .as_ref()
        .and_then(|a| a.name.as_deref())
        .filter(|n| !n.is_empty());
    let mut line = match name {
        Some(name) => format!("{name} (@{handle})"),
        None => format!("@{handle}"),
    };
    if let Some(at) = tweet.created_at.as_deref().filter(|s| !s.is_empty()) {
        line.push_str(" · ");
        line.push_str(at);
    }
    line
}

/// First line of `text`, cut to `max` chars with an ellipsis.
fn snippet(text: &str, max: usize) -> String {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if first.chars().count() <= max {
        return first.to_string();
    }
    let cut: String = first.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn tweet(v: Value) -> Tweet {
        serde_json::from_value(v).unwrap()
    }

    fn by(id: &str, author: &str, text: &str) -> Value {
        json!({
            "id": id,
            "text": text,
            "author": { "id": author, "userName": author, "name": author.to_uppercase() }
        })
    }

    #[test]
    fn one_header_per_author_run() {
        let tweets = vec![
            tweet(by("1", "ann", "first")),
            tweet(by("2", "ann", "second")),
            tweet(by("3", "bob", "reply")),
            tweet(by("4", "ann", "back")),
        ];
        let out = Renderer::new(80).thread(&tweets);
        assert_eq!(out.matches("ANN (@ann)").count(), 2);
        assert_eq!(out.matches("BOB (@bob)").count(), 1);
        assert!(out.starts_with("ANN (@ann)\nfirst\nsecond\n\nBOB (@bob)\nreply\n"));
    }

    #[test]
    fn wraps_to_width() {
        let long = "word ".repeat(40);
        let out = Renderer::new(30).thread(&[tweet(by("1", "ann", long.trim()))]);
        assert!(out.lines().count() > 5);
        assert!(out.lines().all(|l| l.chars().count() <= 30));
    }

    #[test]
    fn nests_quotes_up_to_the_limit() {
        let mut deepest = by("4", "dan", "deepest");
        deepest["url"] = json!("https://x.com/dan/status/4");
        let mut third = by("3", "cat", "third");
        third["quoted_tweet"] = deepest;
        let mut second = by("2", "bob", "second");
        second["quoted_tweet"] = third;
        let mut top = by("1", "ann", "top");
        top["quoted_tweet"] = second;

        let out = Renderer::new(80).thread(&[tweet(top)]);
        assert!(out.contains("> quoting BOB (@bob)\n> second\n"));
        assert!(out.contains("> > quoting CAT (@cat)\n> > third\n"));
        assert!(out.contains("> > [quoting] https://x.com/dan/status/4\n"));
        assert!(!out.contains("deepest"));
    }

    #[test]
    fn lists_media_and_retweets() {
        let mut v = by("1", "ann", "RT @bob: pic");
        v["retweeted_tweet"] = by("2", "bob", "pic");
        v["extendedEntities"] = json!({ "media": [{ "media_url_https": "https://pbs.twimg.com/a.jpg" }] });
        let out = Renderer::new(80).thread(&[tweet(v)]);
        assert!(out.contains("[media] https://pbs.twimg.com/a.jpg\n"));
        assert!(out.contains("> retweet of BOB (@bob)\n> pic\n"));
    }

    #[test]
    fn snippets_take_the_first_line() {
        assert_eq!(snippet("\nhello\nworld", 20), "hello");
        assert_eq!(snippet("abcdefghij", 5), "abcd…");
    }
}
