//! Types and helpers shared by every threadkeep crate.
//!
//! Kept small on purpose so the HTTP, store, and server crates can all depend on it:
//!
//! - [`observability`]: one-shot `tracing` initialisation for binaries and tests
//! - [`ThreadkeepError`] and [`Result`]: config and crypto failures
//! - [`LogFormat`]: log encoding shared between config and observability
//!
//! ```rust
//! use threadkeep_common::{LogFormat, ThreadkeepError};
//!
//! let format: LogFormat = "json".parse().unwrap();
//! assert_eq!(format, LogFormat::Json);
//!
//! let err = ThreadkeepError::Crypto("bad key".into());
//! assert_eq!(err.to_string(), "Crypto error: bad key");
//! ```
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod observability;

/// Output encoding for structured logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ThreadkeepError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ThreadkeepError::Config(format!(
                "unknown log format `{other}` (expected text or json)"
            ))),
        }
    }
}

/// Error types surfaced across the threadkeep workspace.
#[derive(thiserror::Error, Debug)]
pub enum ThreadkeepError {
    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A secret could not be sealed or opened.
    #[error("Crypto error: {0}")]
    Crypto(String),

}

/// Convenient alias for results that use [`ThreadkeepError`].
pub type Result<T> = std::result::Result<T, ThreadkeepError>;
