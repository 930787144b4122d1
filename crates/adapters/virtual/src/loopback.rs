//! In-process protocol binding.
//!
//! Hrefs look like `{kind}://{node}/{thing-slug}/{property|action|event}/{name}`
//! and a Thing's description is served at `{kind}://{node}/{thing-slug}`.

mod client;
mod error;
mod network;
mod server;

pub use client::LoopbackClient;
pub use error::LoopbackError;
pub use network::LoopbackNetwork;
pub use server::{DEFAULT_KIND, LoopbackServer};
