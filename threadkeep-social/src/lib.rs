//! Tweet provider clients and the thread logic built on top of them.
//!
//! Only the twitterapi.io-shaped provider is implemented. See [`twitter`] for the
//! client, pagination, URL parsing, and thread reconstruction.
pub mod twitter;
