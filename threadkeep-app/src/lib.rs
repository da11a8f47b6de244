//! The `threadkeep` terminal client.
//!
//! [`session::Session`] implements the client subcommands against a local
//! store and the proxy, [`render::Renderer`] turns tweets into text.
pub mod client;
pub mod render;
pub mod session;

pub use client::{ProxyClient, RemoteKey};
pub use render::Renderer;
pub use session::{SaveOutcome, Session, ThreadSource, ThreadView};
