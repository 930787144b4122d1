//! Servient lifecycle events: an immutable record of a registry change.
//!
//! Events are produced when Things are registered or unregistered, when
//! bindings are added or removed, and whenever a Thing Description is
//! regenerated as a consequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::form::BindingKind;
use crate::id::ThingId;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServientEventKind {
    ThingRegistered { thing_id: ThingId },
    ThingUnregistered { thing_id: ThingId },
    BindingAdded { binding: BindingKind },
    BindingRemoved { binding: BindingKind },
    DescriptionChanged { thing_id: ThingId },
}

/// A lifecycle event with the time it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServientEvent {
    #[serde(flatten)]
    pub kind: ServientEventKind,
    pub timestamp: DateTime<Utc>,
}

impl ServientEvent {
    /// Record `kind` at the current time.
    #[must_use]
    pub fn new(kind: ServientEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    /// The Thing concerned, for thing-scoped events.
    #[must_use]
    pub fn thing_id(&self) -> Option<&ThingId> {
        match &self.kind {
            ServientEventKind::ThingRegistered { thing_id }
            | ServientEventKind::ThingUnregistered { thing_id }
            | ServientEventKind::DescriptionChanged { thing_id } => Some(thing_id),
            ServientEventKind::BindingAdded { .. } | ServientEventKind::BindingRemoved { .. } => {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_with_type_tag() {
        let event = ServientEvent::new(ServientEventKind::BindingAdded {
            binding: BindingKind::new("http"),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "binding_added");
        assert_eq!(json["binding"], "http");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn should_expose_thing_id_for_thing_events() {
        let thing_id = ThingId::new("urn:dev:wot:lamp").unwrap();
        let event = ServientEvent::new(ServientEventKind::DescriptionChanged {
            thing_id: thing_id.clone(),
        });
        assert_eq!(event.thing_id(), Some(&thing_id));
        let binding = ServientEvent::new(ServientEventKind::BindingRemoved {
            binding: BindingKind::new("mqtt"),
        });
        assert_eq!(binding.thing_id(), None);
    }
}
