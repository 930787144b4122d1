//! Loopback-specific errors and their mapping onto [`WotError`].

use wothub_domain::error::{NotFoundError, WotError};

/// Failures of the in-process transport itself.
#[derive(Debug, thiserror::Error)]
pub enum LoopbackError {
    #[error("no {kind} node named {node:?} on the loopback network")]
    UnknownNode { kind: String, node: String },

    #[error("node {node:?} is already attached for {kind}")]
    AddressInUse { kind: String, node: String },

    #[error("malformed loopback address {href:?}")]
    InvalidHref { href: String },

    #[error("nothing published at {href}")]
    UnknownRoute { href: String },

    #[error("{kind} loopback server is not running")]
    NotRunning { kind: String },
}

impl From<LoopbackError> for WotError {
    fn from(err: LoopbackError) -> Self {
        match err {
            LoopbackError::UnknownNode { .. } | LoopbackError::AddressInUse { .. } => {
                WotError::connection(err)
            }
            LoopbackError::UnknownRoute { href } => NotFoundError {
                entity: "Route",
                id: href,
            }
            .into(),
            LoopbackError::InvalidHref { .. } | LoopbackError::NotRunning { .. } => {
                WotError::protocol(err)
            }
        }
    }
}
