//! Interaction affordances: the named properties, actions and events of a Thing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data_schema::DataSchema;
use crate::error::ValidationError;
use crate::form::Operation;

/// A readable (and possibly writable / observable) value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAffordance {
    #[serde(flatten)]
    pub schema: DataSchema,
    #[serde(default)]
    pub observable: bool,
    #[serde(default = "default_true")]
    pub writable: bool,
}

/// An invocable function with optional input and output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionAffordance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<DataSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<DataSchema>,
    #[serde(default)]
    pub safe: bool,
    #[serde(default)]
    pub idempotent: bool,
}

/// A source of asynchronous notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventAffordance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataSchema>,
}

fn default_true() -> bool {
    true
}

/// Which of the three interaction patterns an affordance follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AffordanceKind {
    Property,
    Action,
    Event,
}

impl AffordanceKind {
    /// Entity name used in not-found errors.
    #[must_use]
    pub fn entity_name(self) -> &'static str {
        match self {
            Self::Property => "Property",
            Self::Action => "Action",
            Self::Event => "Event",
        }
    }
}

impl fmt::Display for AffordanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Property => "property",
            Self::Action => "action",
            Self::Event => "event",
        };
        f.write_str(name)
    }
}

/// One interaction affordance of a Thing.
#[derive(Debug, Clone, PartialEq)]
pub enum Affordance {
    Property(PropertyAffordance),
    Action(ActionAffordance),
    Event(EventAffordance),
}

impl Affordance {
    /// A writable, non-observable property of the given shape.
    #[must_use]
    pub fn property(schema: DataSchema) -> Self {
        Self::Property(PropertyAffordance {
            schema,
            observable: false,
            writable: true,
        })
    }

    /// A writable property that pushes change notifications.
    #[must_use]
    pub fn observable_property(schema: DataSchema) -> Self {
        Self::Property(PropertyAffordance {
            schema,
            observable: true,
            writable: true,
        })
    }

    /// An action with the given input and output shapes.
    #[must_use]
    pub fn action(input: Option<DataSchema>, output: Option<DataSchema>) -> Self {
        Self::Action(ActionAffordance {
            input,
            output,
            ..ActionAffordance::default()
        })
    }

    /// An event emitting payloads of the given shape.
    #[must_use]
    pub fn event(data: Option<DataSchema>) -> Self {
        Self::Event(EventAffordance {
            data,
            ..EventAffordance::default()
        })
    }

    /// Mark a property read-only. No effect on actions and events.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        if let Self::Property(property) = &mut self {
            property.writable = false;
        }
        self
    }

    #[must_use]
    pub fn kind(&self) -> AffordanceKind {
        match self {
            Self::Property(_) => AffordanceKind::Property,
            Self::Action(_) => AffordanceKind::Action,
            Self::Event(_) => AffordanceKind::Event,
        }
    }

    /// Operations a binding should advertise for this affordance.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        match self {
            Self::Property(property) => {
                let mut ops = vec![Operation::ReadProperty];
                if property.writable {
                    ops.push(Operation::WriteProperty);
                }
                if property.observable {
                    ops.push(Operation::ObserveProperty);
                    ops.push(Operation::UnobserveProperty);
                }
                ops
            }
            Self::Action(_) => vec![Operation::InvokeAction],
            Self::Event(_) => vec![Operation::SubscribeEvent, Operation::UnsubscribeEvent],
        }
    }

    /// Whether subscriptions to this affordance produce notifications.
    #[must_use]
    pub fn is_subscribable(&self) -> bool {
        match self {
            Self::Property(property) => property.observable,
            Self::Action(_) => false,
            Self::Event(_) => true,
        }
    }
}

/// Check that `name` is a safe machine-readable affordance name.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyName`] or [`ValidationError::InvalidName`].
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    Ok(())
}
