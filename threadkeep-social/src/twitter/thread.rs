//! Rebuilding an author's thread from an unordered bag of conversation tweets.
//!
//! Provider pages mix the author's self-replies with everyone else's replies
//! and may repeat tweets across pages. A thread here is the reply chain
//! written by the focal tweet's author:
//!
//! 1. drop duplicate ids (first occurrence wins)
//! 2. keep tweets by the focal author only
//! 3. walk up `inReplyToId` from the focal tweet to the earliest same-author ancestor
//! 4. pick the root: the conversation root when it is the author's, else the
//!    ancestor from step 3, else (when step 3 stopped at a tweet whose parent
//!    the provider never returned) the earliest parentless tweet of the author
//! 5. walk down from the root and from the focal ancestor, oldest first
use std::collections::{HashMap, HashSet};

use super::types::Tweet;

/// Same author by id when both sides carry one, else by handle (case-insensitive).
pub fn same_author(a: &Tweet, b: &Tweet) -> bool {
    match (a.author_id(), b.author_id()) {
        (Some(x), Some(y)) => x == y,
        _ => match (a.author_handle(), b.author_handle()) {
            (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
            _ => false,
        },
    }
}

/// Chronological key: numeric snowflake id, non-numeric ids last by text.
fn chrono_key(t: &Tweet) -> (u64, &str) {
    (t.numeric_id().unwrap_or(u64::MAX), t.id.as_str())
}

/// Drop repeated ids, keeping the first occurrence and the input order.
pub fn dedupe_by_id(tweets: impl IntoIterator<Item = Tweet>) -> Vec<Tweet> {
    let mut seen = HashSet::new();
    tweets
        .into_iter()
        .filter(|t| seen.insert(t.id.clone()))
        .collect()
}

/// Reconstruct the focal author's self-reply chain, oldest first.
///
/// Returns an empty list only when `focal_id` is not among `tweets`.
///
/// ```
/// use threadkeep_social::twitter::{reconstruct_thread, Tweet};
/// use serde_json::json;
///
/// let tweets: Vec<Tweet> = serde_json::from_value(json!([
///     { "id": "3", "inReplyToId": "2", "author": { "id": "a", "userName": "ann" } },
///     { "id": "1", "author": { "id": "a", "userName": "ann" } },
///     { "id": "2", "inReplyToId": "1", "author": { "id": "b", "userName": "bob" } },
///     { "id": "4", "inReplyToId": "1", "author": { "id": "a", "userName": "ann" } }
/// ])).unwrap();
///
/// let chain = reconstruct_thread("4", tweets);
/// let ids: Vec<&str> = chain.iter().map(|t| t.id.as_str()).collect();
/// assert_eq!(ids, ["1", "4"]);
/// ```
pub fn reconstruct_thread(focal_id: &str, tweets: impl IntoIterator<Item = Tweet>) -> Vec<Tweet> {
    let tweets = dedupe_by_id(tweets);
    let Some(focal) = tweets.iter().find(|t| t.id == focal_id).cloned() else {
        return Vec::new();
    };
    let fetched: HashSet<String> = tweets.iter().map(|t| t.id.clone()).collect();

    let mut by_id: HashMap<String, Tweet> = tweets
        .into_iter()
        .filter(|t| t.id == focal.id || same_author(t, &focal))
        .map(|t| (t.id.clone(), t))
        .collect();

    // Walk up to the focal ancestor; guard against reply cycles in bad data.
    let mut top_id = focal.id.clone();
    let mut visited = HashSet::from([top_id.clone()]);
    while let Some(parent) = by_id
        .get(&top_id)
        .and_then(|t| t.in_reply_to_id.as_deref())
        .filter(|p| by_id.contains_key(*p))
    {
        if !visited.insert(parent.to_string()) {
            break;
        }
        top_id = parent.to_string();
    }

    let root_id = match focal.conversation_id.as_deref() {
        Some(conv) if by_id.contains_key(conv) => conv.to_string(),
        _ => {
            let gap = by_id
                .get(&top_id)
                .and_then(|t| t.in_reply_to_id.as_deref())
                .is_some_and(|p| !fetched.contains(p));
            if gap {
                earliest_parentless(&by_id).unwrap_or_else(|| top_id.clone())
            } else {
                top_id.clone()
            }
        }
    };

    // Children index restricted to the author's tweets.
    let mut children: HashMap<&str, Vec<&Tweet>> = HashMap::new();
    for t in by_id.values() {
        if let Some(parent) = t.in_reply_to_id.as_deref() {
            if by_id.contains_key(parent) {
                children.entry(parent).or_default().push(t);
            }
        }
    }

    let mut keep: HashSet<String> = HashSet::from([root_id.clone(), top_id.clone()]);
    let mut frontier = vec![root_id.as_str(), top_id.as_str()];
    while let Some(id) = frontier.pop() {
        for child in children.get(id).into_iter().flatten() {
            if keep.insert(child.id.clone()) {
                frontier.push(child.id.as_str());
            }
        }
    }
    // The focal tweet always belongs to its own thread, even when its parent
    // chain has gaps the provider did not return.
    keep.insert(focal.id.clone());

    let mut chain: Vec<Tweet> = keep.iter().filter_map(|id| by_id.remove(id)).collect();
    chain.sort_by(|a, b| chrono_key(a).cmp(&chrono_key(b)));
    chain
}

/// Earliest tweet whose parent is absent from `by_id`.
fn earliest_parentless(by_id: &HashMap<String, Tweet>) -> Option<String> {
    by_id
        .values()
        .filter(|t| {
            t.in_reply_to_id
                .as_deref()
                .is_none_or(|p| !by_id.contains_key(p))
        })
        .min_by(|a, b| chrono_key(a).cmp(&chrono_key(b)))
        .map(|t| t.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tw(id: &str, parent: Option<&str>, author: (&str, &str)) -> Tweet {
        serde_json::from_value(json!({
            "id": id,
            "text": format!("tweet {id}"),
            "inReplyToId": parent,
            "author": { "id": author.0, "userName": author.1 }
        }))
        .unwrap()
    }

    const ANN: (&str, &str) = ("1", "ann");
    const BOB: (&str, &str) = ("2", "bob");

    fn ids(chain: &[Tweet]) -> Vec<&str> {
        chain.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn rebuilds_chain_from_shuffled_duplicated_pages() {
        let tweets = vec![
            tw("103", Some("102"), ANN),
            tw("101", None, ANN),
            tw("150", Some("101"), BOB),
            tw("102", Some("101"), ANN),
            tw("103", Some("102"), ANN),
            tw("104", Some("103"), ANN),
        ];
        let chain = reconstruct_thread("102", tweets);
        assert_eq!(ids(&chain), ["101", "102", "103", "104"]);
    }

    #[test]
    fn author_replies_to_others_are_excluded() {
        let tweets = vec![
            tw("101", None, ANN),
            tw("102", Some("101"), ANN),
            tw("150", Some("101"), BOB),
            tw("151", Some("150"), ANN),
        ];
        let chain = reconstruct_thread("101", tweets);
        assert_eq!(ids(&chain), ["101", "102"]);
    }

    #[test]
    fn root_survives_a_missing_parent() {
        let tweets = vec![tw("101", None, ANN), tw("105", Some("104"), ANN)];
        let chain = reconstruct_thread("105", tweets);
        assert_eq!(ids(&chain), ["101", "105"]);
    }

    #[test]
    fn gap_in_the_middle_keeps_both_segments() {
        let in_conv = |id: &str, parent: Option<&str>| {
            let mut t = tw(id, parent, ANN);
            t.conversation_id = Some("101".into());
            t
        };
        let tweets = vec![
            in_conv("105", Some("104")),
            in_conv("101", None),
            in_conv("102", Some("101")),
            tw("150", Some("102"), BOB),
            in_conv("104", Some("103")),
        ];
        let chain = reconstruct_thread("105", tweets);
        assert_eq!(ids(&chain), ["101", "102", "104", "105"]);
    }

    #[test]
    fn reply_to_another_author_starts_its_own_chain() {
        let tweets = vec![
            tw("101", None, ANN),
            tw("150", Some("101"), BOB),
            tw("151", Some("150"), ANN),
            tw("152", Some("151"), ANN),
        ];
        let chain = reconstruct_thread("151", tweets);
        assert_eq!(ids(&chain), ["151", "152"]);
    }

    #[test]
    fn unknown_focal_yields_empty() {
        assert!(reconstruct_thread("999", vec![tw("1", None, ANN)]).is_empty());
    }

    #[test]
    fn reply_cycles_terminate() {
        let tweets = vec![tw("10", Some("11"), ANN), tw("11", Some("10"), ANN)];
        let chain = reconstruct_thread("10", tweets);
        assert_eq!(ids(&chain), ["10", "11"]);
    }

    #[test]
    fn handle_fallback_when_ids_missing() {
        let a: Tweet = serde_json::from_value(json!({"id": "1", "author": {"userName": "Ann"}}))
            .unwrap();
        let b: Tweet = serde_json::from_value(json!({"id": "2", "author": {"userName": "ann"}}))
            .unwrap();
        let c: Tweet = serde_json::from_value(json!({"id": "3"})).unwrap();
        assert!(same_author(&a, &b));
        assert!(!same_author(&a, &c));
    }
}
