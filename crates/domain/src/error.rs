//! Error taxonomy shared by every layer of the workspace.
//!
//! Each adapter defines its own typed error and converts it into
//! [`WotError`] at the adapter boundary, so no transport-specific error type
//! ever reaches the things, the hub or the servient.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data_schema::SchemaViolation;

/// Boxed error used for opaque sources crossing layer boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error for every interaction with a Thing.
#[derive(Debug, thiserror::Error)]
pub enum WotError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("unsupported media type: {media_type}")]
    UnsupportedMediaType { media_type: String },

    #[error("failed to decode {media_type} payload")]
    Decode {
        media_type: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to encode {media_type} payload")]
    Encode {
        media_type: String,
        #[source]
        source: BoxError,
    },

    #[error("action failed: {message}")]
    Action { message: String },

    #[error("no usable binding for affordance {affordance}")]
    NoUsableBinding { affordance: String },

    #[error("connection error: {reason}")]
    Connection { reason: String },

    #[error("operation timed out")]
    Timeout,

    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    #[error(transparent)]
    Binding(#[from] BindingError),
}

/// Domain invariant violations.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("invalid name {0:?}: only ASCII letters, digits, '-' and '_' are allowed")]
    InvalidName(String),

    #[error("invalid thing id {0:?}")]
    InvalidThingId(String),

    #[error("duplicate affordance {0:?}")]
    DuplicateAffordance(String),

    #[error("thing {0} is already registered")]
    DuplicateThing(String),

    #[error("property {0:?} is not writable")]
    NotWritable(String),

    #[error("property {0:?} is not observable")]
    NotObservable(String),

    #[error("affordance {0:?} does not support subscriptions")]
    NotSubscribable(String),

    #[error("already subscribed to {0:?}")]
    DuplicateSubscription(String),

    #[error(transparent)]
    Schema(#[from] SchemaViolation),

    /// A validation failure reported by a remote peer.
    #[error("{0}")]
    Remote(String),
}

/// Returned when a requested resource does not exist.
#[derive(Debug, thiserror::Error)]
#[error("{entity} not found: {id}")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Failures of binding lifecycle operations on the servient.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("a {kind} binding is already running")]
    AlreadyRunning { kind: String },

    #[error("failed to start {kind} binding")]
    Start {
        kind: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to stop {kind} binding")]
    Stop {
        kind: String,
        #[source]
        source: BoxError,
    },

    #[error("{kind} binding failed to publish {affordance}")]
    Publish {
        kind: String,
        affordance: String,
        #[source]
        source: BoxError,
    },
}

/// Stable, wire-friendly name of a [`WotError`] variant.
///
/// Server adapters send it next to the error message so that client adapters
/// can rebuild the same variant on the other side of the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    UnsupportedMediaType,
    Decode,
    Encode,
    Action,
    NoUsableBinding,
    Connection,
    Timeout,
    Protocol,
    Binding,
}

impl ErrorKind {
    /// The `snake_case` wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::UnsupportedMediaType => "unsupported_media_type",
            Self::Decode => "decode",
            Self::Encode => "encode",
            Self::Action => "action",
            Self::NoUsableBinding => "no_usable_binding",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Protocol => "protocol",
            Self::Binding => "binding",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message-only error used to carry a remote failure as a `source`.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct RemoteMessage(String);

impl WotError {
    /// The wire name of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::UnsupportedMediaType { .. } => ErrorKind::UnsupportedMediaType,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Encode { .. } => ErrorKind::Encode,
            Self::Action { .. } => ErrorKind::Action,
            Self::NoUsableBinding { .. } => ErrorKind::NoUsableBinding,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Timeout => ErrorKind::Timeout,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Binding(_) => ErrorKind::Binding,
        }
    }

    /// Message sent over the wire alongside [`kind`](Self::kind).
    ///
    /// For action failures this is the handler's own message, unprefixed.
    #[must_use]
    pub fn wire_message(&self) -> String {
        match self {
            Self::Action { message } => message.clone(),
            Self::UnsupportedMediaType { media_type } => media_type.clone(),
            Self::Validation(ValidationError::Remote(message)) => message.clone(),
            Self::Decode { source, .. } | Self::Encode { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }

    /// Rebuild an error reported by a remote peer.
    #[must_use]
    pub fn from_remote(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Validation => ValidationError::Remote(message).into(),
            ErrorKind::NotFound => NotFoundError {
                entity: "Remote resource",
                id: message,
            }
            .into(),
            ErrorKind::UnsupportedMediaType => Self::UnsupportedMediaType {
                media_type: message,
            },
            ErrorKind::Decode => Self::Decode {
                media_type: "remote".to_string(),
                source: Box::new(RemoteMessage(message)),
            },
            ErrorKind::Encode => Self::Encode {
                media_type: "remote".to_string(),
                source: Box::new(RemoteMessage(message)),
            },
            ErrorKind::Action => Self::Action { message },
            ErrorKind::NoUsableBinding => Self::NoUsableBinding {
                affordance: message,
            },
            ErrorKind::Connection => Self::Connection { reason: message },
            ErrorKind::Timeout => Self::Timeout,
            ErrorKind::Protocol | ErrorKind::Binding => Self::Protocol { reason: message },
        }
    }

    /// Shorthand for [`WotError::Action`].
    pub fn action(message: impl Into<String>) -> Self {
        Self::Action {
            message: message.into(),
        }
    }

    /// Shorthand for [`WotError::Connection`].
    pub fn connection(reason: impl fmt::Display) -> Self {
        Self::Connection {
            reason: reason.to_string(),
        }
    }

    /// Shorthand for [`WotError::Protocol`].
    pub fn protocol(reason: impl fmt::Display) -> Self {
        Self::Protocol {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_keep_handler_message_when_rebuilding_action_error() {
        let original = WotError::action("lamp is broken");
        let rebuilt = WotError::from_remote(original.kind(), original.wire_message());
        assert!(matches!(rebuilt, WotError::Action { message } if message == "lamp is broken"));
    }

    #[test]
    fn should_rebuild_not_found_as_not_found() {
        let original: WotError = NotFoundError {
            entity: "Thing",
            id: "urn:x".to_string(),
        }
        .into();
        let rebuilt = WotError::from_remote(original.kind(), original.wire_message());
        assert!(matches!(rebuilt, WotError::NotFound(_)));
    }

    #[test]
    fn should_rebuild_validation_errors_as_remote_validation() {
        let original: WotError = ValidationError::NotWritable("status".to_string()).into();
        let rebuilt = WotError::from_remote(original.kind(), original.wire_message());
        assert!(matches!(
            rebuilt,
            WotError::Validation(ValidationError::Remote(_))
        ));
    }

    #[test]
    fn should_serialize_kind_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnsupportedMediaType).unwrap();
        assert_eq!(json, "\"unsupported_media_type\"");
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
    }

    #[test]
    fn should_display_not_found_error() {
        let err = NotFoundError {
            entity: "Property",
            id: "brightness".to_string(),
        };
        assert_eq!(err.to_string(), "Property not found: brightness");
    }

    #[test]
    fn should_map_every_variant_to_its_kind() {
        assert_eq!(WotError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(WotError::connection("refused").kind(), ErrorKind::Connection);
        assert_eq!(WotError::protocol("bad frame").kind(), ErrorKind::Protocol);
        assert_eq!(
            WotError::NoUsableBinding {
                affordance: "x".to_string()
            }
            .kind(),
            ErrorKind::NoUsableBinding
        );
    }
}
