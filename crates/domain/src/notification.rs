//! Notifications pushed to subscribers when a property changes or an event
//! fires.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ThingId;

/// Why a notification was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PropertyChange,
    Event,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PropertyChange => f.write_str("property_change"),
            Self::Event => f.write_str("event"),
        }
    }
}

/// An encoded payload together with its media type.
///
/// Cloning is cheap: the bytes are shared between every subscriber that asked
/// for the same media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub media_type: String,
    pub body: Arc<[u8]>,
}

impl Content {
    pub fn new(media_type: impl Into<String>, body: impl Into<Arc<[u8]>>) -> Self {
        Self {
            media_type: media_type.into(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }
}

/// One change delivered to one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub thing_id: ThingId,
    pub affordance: String,
    pub kind: NotificationKind,
    pub content: Content,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Build a notification stamped with the current time.
    pub fn now(
        thing_id: ThingId,
        affordance: impl Into<String>,
        kind: NotificationKind,
        content: Content,
    ) -> Self {
        Self {
            thing_id,
            affordance: affordance.into(),
            kind,
            content,
            timestamp: Utc::now(),
        }
    }
}
