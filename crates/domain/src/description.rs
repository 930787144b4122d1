//! Thing Descriptions: the serializable, binding-aware view of a Thing.
//!
//! A [`ThingDescription`] is never patched in place. The servient regenerates
//! it from the [`Thing`] model and the forms currently published by the
//! running server bindings, and hands out immutable snapshots.
//!
//! The JSON shape follows the W3C Thing Description: `properties`, `actions`
//! and `events` objects whose entries carry their schema fields plus `forms`.
//! Entry order is significant and survives a JSON round trip.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::affordance::{
    ActionAffordance, Affordance, AffordanceKind, EventAffordance, PropertyAffordance,
};
use crate::form::{BindingKind, Form, Operation};
use crate::id::ThingId;
use crate::thing::Thing;

/// JSON-LD context of version 1 Thing Descriptions.
pub const TD_CONTEXT: &str = "https://www.w3.org/2019/wot/td/v1";

/// Insertion-ordered string-keyed map.
///
/// Serializes as a JSON object and keeps entries in document order when
/// deserialized.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedMap<T>(Vec<(String, T)>);

impl<T> Default for NamedMap<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> NamedMap<T> {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&T> {
        self.0
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value)
    }

    /// Insert or replace; a replaced entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: T) {
        let name = name.into();
        if let Some(slot) = self.0.iter_mut().find(|(candidate, _)| *candidate == name) {
            slot.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Serialize> Serialize for NamedMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for NamedMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NamedMapVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for NamedMapVisitor<T> {
            type Value = NamedMap<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of named affordances")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = NamedMap(Vec::with_capacity(access.size_hint().unwrap_or(0)));
                while let Some((name, value)) = access.next_entry::<String, T>()? {
                    map.insert(name, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(NamedMapVisitor(PhantomData))
    }
}

/// A property entry of a Thing Description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescription {
    #[serde(flatten)]
    pub affordance: PropertyAffordance,
    #[serde(default)]
    pub forms: Vec<Form>,
}

/// An action entry of a Thing Description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescription {
    #[serde(flatten)]
    pub affordance: ActionAffordance,
    #[serde(default)]
    pub forms: Vec<Form>,
}

/// An event entry of a Thing Description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDescription {
    #[serde(flatten)]
    pub affordance: EventAffordance,
    #[serde(default)]
    pub forms: Vec<Form>,
}

/// Serializable description of a Thing and the forms through which it is
/// currently reachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingDescription {
    #[serde(rename = "@context", default = "default_context")]
    pub context: String,
    pub id: ThingId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "NamedMap::is_empty")]
    pub properties: NamedMap<PropertyDescription>,
    #[serde(default, skip_serializing_if = "NamedMap::is_empty")]
    pub actions: NamedMap<ActionDescription>,
    #[serde(default, skip_serializing_if = "NamedMap::is_empty")]
    pub events: NamedMap<EventDescription>,
}

fn default_context() -> String {
    TD_CONTEXT.to_string()
}

impl ThingDescription {
    /// Build a description of `thing` using the forms returned by `forms_for`
    /// for each affordance name.
    pub fn generate(thing: &Thing, mut forms_for: impl FnMut(&str) -> Vec<Form>) -> Self {
        let mut description = Self {
            context: default_context(),
            id: thing.id.clone(),
            title: thing.title.clone(),
            description: thing.description.clone(),
            properties: NamedMap::default(),
            actions: NamedMap::default(),
            events: NamedMap::default(),
        };
        for (name, affordance) in thing.affordances() {
            let forms = forms_for(name);
            match affordance {
                Affordance::Property(property) => description.properties.insert(
                    name,
                    PropertyDescription {
                        affordance: property.clone(),
                        forms,
                    },
                ),
                Affordance::Action(action) => description.actions.insert(
                    name,
                    ActionDescription {
                        affordance: action.clone(),
                        forms,
                    },
                ),
                Affordance::Event(event) => description.events.insert(
                    name,
                    EventDescription {
                        affordance: event.clone(),
                        forms,
                    },
                ),
            }
        }
        description
    }

    /// Which kind of affordance `name` refers to, if any.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<AffordanceKind> {
        if self.properties.get(name).is_some() {
            Some(AffordanceKind::Property)
        } else if self.actions.get(name).is_some() {
            Some(AffordanceKind::Action)
        } else if self.events.get(name).is_some() {
            Some(AffordanceKind::Event)
        } else {
            None
        }
    }

    /// Forms of the affordance called `name`, in description order.
    #[must_use]
    pub fn forms(&self, name: &str) -> Option<&[Form]> {
        self.properties
            .get(name)
            .map(|p| p.forms.as_slice())
            .or_else(|| self.actions.get(name).map(|a| a.forms.as_slice()))
            .or_else(|| self.events.get(name).map(|e| e.forms.as_slice()))
    }

    /// Every form of every affordance, paired with the affordance name.
    pub fn all_forms(&self) -> impl Iterator<Item = (&str, &Form)> {
        let properties = self
            .properties
            .iter()
            .flat_map(|(name, p)| p.forms.iter().map(move |f| (name, f)));
        let actions = self
            .actions
            .iter()
            .flat_map(|(name, a)| a.forms.iter().map(move |f| (name, f)));
        let events = self
            .events
            .iter()
            .flat_map(|(name, e)| e.forms.iter().map(move |f| (name, f)));
        properties.chain(actions).chain(events)
    }

    /// Whether any form of the description belongs to `kind`.
    #[must_use]
    pub fn has_binding(&self, kind: &BindingKind) -> bool {
        self.all_forms().any(|(_, form)| &form.binding == kind)
    }

    /// Forms of `name` that allow `operation`, in description order.
    pub fn forms_for<'a>(
        &'a self,
        name: &str,
        operation: Operation,
    ) -> impl Iterator<Item = &'a Form> + use<'a> {
        self.forms(name)
            .unwrap_or_default()
            .iter()
            .filter(move |form| form.allows(operation))
    }
}
