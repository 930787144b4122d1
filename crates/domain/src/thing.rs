//! Thing: the interaction model of a device or service.
//!
//! A [`Thing`] is the binding-independent part of a Thing Description: its
//! identity and its affordances, in declaration order. Forms are attached
//! later, when the servient publishes the Thing on its bindings.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::affordance::{
    ActionAffordance, Affordance, EventAffordance, PropertyAffordance, validate_name,
};
use crate::error::ValidationError;
use crate::id::ThingId;

/// A device or service described by its interaction affordances.
#[derive(Debug, Clone, PartialEq)]
pub struct Thing {
    pub id: ThingId,
    pub title: String,
    pub description: Option<String>,
    affordances: Vec<(String, Affordance)>,
    initial_values: BTreeMap<String, Value>,
}

impl Thing {
    /// Create a builder for a Thing with the given identity.
    #[must_use]
    pub fn builder(id: impl Into<String>) -> ThingBuilder {
        ThingBuilder {
            id: id.into(),
            ..ThingBuilder::default()
        }
    }

    /// All affordances, in declaration order.
    pub fn affordances(&self) -> impl Iterator<Item = (&str, &Affordance)> {
        self.affordances
            .iter()
            .map(|(name, affordance)| (name.as_str(), affordance))
    }

    #[must_use]
    pub fn affordance(&self, name: &str) -> Option<&Affordance> {
        self.affordances
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, affordance)| affordance)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyAffordance> {
        match self.affordance(name) {
            Some(Affordance::Property(property)) => Some(property),
            _ => None,
        }
    }

    #[must_use]
    pub fn action(&self, name: &str) -> Option<&ActionAffordance> {
        match self.affordance(name) {
            Some(Affordance::Action(action)) => Some(action),
            _ => None,
        }
    }

    #[must_use]
    pub fn event(&self, name: &str) -> Option<&EventAffordance> {
        match self.affordance(name) {
            Some(Affordance::Event(event)) => Some(event),
            _ => None,
        }
    }

    /// Value a property holds right after the Thing is exposed.
    ///
    /// Properties without an explicit initial value start as `null`.
    #[must_use]
    pub fn initial_value(&self, name: &str) -> Value {
        self.initial_values.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Append an affordance to a Thing that is already built.
    ///
    /// `initial_value` only applies to properties.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the name is unsafe or taken, or
    /// the initial value does not match the property schema. The Thing is
    /// left unchanged.
    pub fn add_affordance(
        &mut self,
        name: impl Into<String>,
        affordance: Affordance,
        initial_value: Option<Value>,
    ) -> Result<(), ValidationError> {
        let name = name.into();
        validate_name(&name)?;
        if self.affordance(&name).is_some() {
            return Err(ValidationError::DuplicateAffordance(name));
        }
        if let Some(value) = &initial_value {
            let Affordance::Property(property) = &affordance else {
                return Err(ValidationError::InvalidName(name));
            };
            property.schema.validate(value)?;
        }
        if let Some(value) = initial_value {
            self.initial_values.insert(name.clone(), value);
        }
        self.affordances.push((name, affordance));
        Ok(())
    }

    /// Remove an affordance, returning it when it existed.
    pub fn remove_affordance(&mut self, name: &str) -> Option<Affordance> {
        let position = self
            .affordances
            .iter()
            .position(|(candidate, _)| candidate == name)?;
        self.initial_values.remove(name);
        Some(self.affordances.remove(position).1)
    }

    /// URL-safe name derived from the title and a hash of the identity.
    ///
    /// Deterministic, so addresses stay stable across restarts.
    #[must_use]
    pub fn slug(&self) -> String {
        let hash = self.id.uuid().simple().to_string();
        let short = &hash[..8];
        let title = slugify(&self.title);
        if title.is_empty() {
            short.to_string()
        } else {
            format!("{title}-{short}")
        }
    }
}

fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Step-by-step builder for [`Thing`].
#[derive(Debug, Default)]
pub struct ThingBuilder {
    id: String,
    title: Option<String>,
    description: Option<String>,
    affordances: Vec<(String, Affordance)>,
    initial_values: BTreeMap<String, Value>,
}

impl ThingBuilder {
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append an affordance; declaration order is preserved.
    #[must_use]
    pub fn affordance(mut self, name: impl Into<String>, affordance: Affordance) -> Self {
        self.affordances.push((name.into(), affordance));
        self
    }

    /// Append a property together with its initial value.
    #[must_use]
    pub fn property_with_value(
        mut self,
        name: impl Into<String>,
        affordance: Affordance,
        value: Value,
    ) -> Self {
        let name = name.into();
        self.initial_values.insert(name.clone(), value);
        self.affordances.push((name, affordance));
        self
    }

    /// Consume the builder, validate, and return a [`Thing`].
    ///
    /// The title defaults to the identity when none is given.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the identity is invalid, an
    /// affordance name is unsafe or duplicated, or an initial value does not
    /// match its property schema.
    pub fn build(self) -> Result<Thing, ValidationError> {
        let id = ThingId::new(self.id)?;
        for (index, (name, _)) in self.affordances.iter().enumerate() {
            validate_name(name)?;
            if self.affordances[..index].iter().any(|(seen, _)| seen == name) {
                return Err(ValidationError::DuplicateAffordance(name.clone()));
            }
        }
        let thing = Thing {
            title: self.title.unwrap_or_else(|| id.to_string()),
            id,
            description: self.description,
            affordances: self.affordances,
            initial_values: BTreeMap::new(),
        };
        for (name, value) in &self.initial_values {
            let property = thing
                .property(name)
                .ok_or_else(|| ValidationError::InvalidName(name.clone()))?;
            property.schema.validate(value)?;
        }
        Ok(Thing {
            initial_values: self.initial_values,
            ..thing
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_schema::DataSchema;
    use serde_json::json;

    fn lamp() -> Thing {
        Thing::builder("urn:dev:wot:com:example:servient:lamp")
            .title("MyLampThing")
            .affordance("status", Affordance::property(DataSchema::string()))
            .affordance("toggle", Affordance::action(None, None))
            .affordance(
                "overheating",
                Affordance::event(Some(DataSchema::string())),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn should_keep_declaration_order() {
        let lamp = lamp();
        let names: Vec<&str> = lamp.affordances().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["status", "toggle", "overheating"]);
    }

    #[test]
    fn should_look_up_affordances_by_kind() {
        let thing = lamp();
        assert!(thing.property("status").is_some());
        assert!(thing.action("toggle").is_some());
        assert!(thing.event("overheating").is_some());
        assert!(thing.property("toggle").is_none());
        assert!(thing.affordance("missing").is_none());
    }

    #[test]
    fn should_default_title_to_id() {
        let thing = Thing::builder("urn:dev:wot:fan").build().unwrap();
        assert_eq!(thing.title, "urn:dev:wot:fan");
    }

    #[test]
    fn should_append_affordance_after_build() {
        let mut thing = lamp();
        thing
            .add_affordance(
                "brightness",
                Affordance::property(DataSchema::integer()),
                Some(json!(40)),
            )
            .unwrap();

        let names: Vec<&str> = thing.affordances().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["status", "toggle", "overheating", "brightness"]);
        assert_eq!(thing.initial_value("brightness"), json!(40));
    }

    #[test]
    fn should_leave_thing_unchanged_when_added_affordance_is_invalid() {
        let mut thing = lamp();
        let before = thing.clone();
        assert!(matches!(
            thing.add_affordance("toggle", Affordance::action(None, None), None),
            Err(ValidationError::DuplicateAffordance(_))
        ));
        assert!(
            thing
                .add_affordance(
                    "level",
                    Affordance::property(DataSchema::integer()),
                    Some(json!("high"))
                )
                .is_err()
        );
        assert!(
            thing
                .add_affordance("blink", Affordance::action(None, None), Some(json!(1)))
                .is_err()
        );
        assert_eq!(thing, before);
    }

    #[test]
    fn should_remove_affordance_and_its_initial_value() {
        let mut thing = Thing::builder("urn:dev:wot:fan")
            .property_with_value("speed", Affordance::property(DataSchema::integer()), json!(3))
            .build()
            .unwrap();
        assert!(matches!(
            thing.remove_affordance("speed"),
            Some(Affordance::Property(_))
        ));
        assert!(thing.affordance("speed").is_none());
        assert_eq!(thing.initial_value("speed"), Value::Null);
        assert!(thing.remove_affordance("speed").is_none());
    }

    #[test]
    fn should_reject_duplicate_affordance_names() {
        let result = Thing::builder("urn:dev:wot:fan")
            .affordance("speed", Affordance::property(DataSchema::integer()))
            .affordance("speed", Affordance::action(None, None))
            .build();
        assert!(matches!(
            result,
            Err(ValidationError::DuplicateAffordance(name)) if name == "speed"
        ));
    }

    #[test]
    fn should_reject_unsafe_affordance_names() {
        let result = Thing::builder("urn:dev:wot:fan")
            .affordance("fan speed", Affordance::property(DataSchema::integer()))
            .build();
        assert!(matches!(result, Err(ValidationError::InvalidName(_))));
    }

    #[test]
    fn should_validate_initial_values_against_schema() {
        let result = Thing::builder("urn:dev:wot:thermo")
            .property_with_value(
                "temperature",
                Affordance::observable_property(DataSchema::number()),
                json!("warm"),
            )
            .build();
        assert!(matches!(result, Err(ValidationError::Schema(_))));
    }

    #[test]
    fn should_return_initial_value_or_null() {
        let thing = Thing::builder("urn:dev:wot:thermo")
            .property_with_value(
                "temperature",
                Affordance::observable_property(DataSchema::number()),
                json!(20),
            )
            .affordance("unit", Affordance::property(DataSchema::string()))
            .build()
            .unwrap();
        assert_eq!(thing.initial_value("temperature"), json!(20));
        assert_eq!(thing.initial_value("unit"), Value::Null);
    }

    #[test]
    fn should_build_stable_url_safe_slug() {
        let thing = lamp();
        let slug = thing.slug();
        assert!(slug.starts_with("mylampthing-"));
        assert_eq!(slug.len(), "mylampthing-".len() + 8);
        assert_eq!(slug, lamp().slug());
    }

    #[test]
    fn should_collapse_separators_in_slug() {
        assert_eq!(slugify("  Living Room / Lamp! "), "living-room-lamp");
        assert_eq!(slugify("---"), "");
    }
}
