//! Twitter/X provider integration.
//!
//! - [`client`]: API-key authenticated provider client and thread pagination
//! - [`types`]: provider payloads; unknown fields survive a round-trip
//! - [`url`]: turning pasted links into tweet ids
//! - [`thread`]: rebuilding an author's self-reply chain from provider pages
pub mod client;
pub mod thread;
pub mod types;
pub mod url;

pub use client::{ProviderError, TweetApi};
pub use thread::reconstruct_thread;
pub use types::{Author, ThreadContext, Tweet};
pub use url::{TweetRef, TweetUrlError, parse_tweet_ref};
