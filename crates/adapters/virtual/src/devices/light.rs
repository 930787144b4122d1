//! Virtual lamp: an observable `on` property plus `turn_on`, `turn_off` and
//! `toggle` actions. Every change also fires a `switched` event.

use std::sync::{Arc, Weak};

use serde_json::{Value, json};
use wothub_app::ExposedThing;
use wothub_domain::affordance::Affordance;
use wothub_domain::data_schema::DataSchema;
use wothub_domain::error::{ValidationError, WotError};
use wothub_domain::thing::Thing;

/// A simulated lamp that can be turned on and off.
pub struct VirtualLamp {
    id: String,
    title: String,
}

impl Default for VirtualLamp {
    fn default() -> Self {
        Self {
            id: "urn:wothub:virtual:lamp".to_string(),
            title: "Virtual Lamp".to_string(),
        }
    }
}

impl VirtualLamp {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }

    /// Describe the lamp. It starts switched off.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the configured id is not usable.
    pub fn thing(&self) -> Result<Thing, ValidationError> {
        Thing::builder(self.id.clone())
            .title(self.title.clone())
            .description("Simulated lamp")
            .property_with_value(
                "on",
                Affordance::observable_property(
                    DataSchema::boolean().description("Whether the lamp is lit"),
                ),
                json!(false),
            )
            .affordance("turn_on", Affordance::action(None, Some(DataSchema::boolean())))
            .affordance("turn_off", Affordance::action(None, Some(DataSchema::boolean())))
            .affordance("toggle", Affordance::action(None, Some(DataSchema::boolean())))
            .affordance("switched", Affordance::event(Some(DataSchema::boolean())))
            .build()
    }

    /// Install the action handlers on the exposed lamp.
    ///
    /// # Errors
    ///
    /// Fails when `exposed` was not built from [`VirtualLamp::thing`].
    pub fn install(&self, exposed: &Arc<ExposedThing>) -> Result<(), WotError> {
        for (action, target) in [("turn_on", Some(true)), ("turn_off", Some(false)), ("toggle", None)] {
            let lamp = Arc::downgrade(exposed);
            exposed.set_action_handler(action, move |_| {
                let lamp = lamp.clone();
                async move { switch(&lamp, target) }
            })?;
        }
        Ok(())
    }
}

/// Set the lamp to `target`, or flip it when `None`, and return the new state.
fn switch(lamp: &Weak<ExposedThing>, target: Option<bool>) -> Result<Value, WotError> {
    let lamp = lamp
        .upgrade()
        .ok_or_else(|| WotError::action("lamp is no longer exposed"))?;
    let current = lamp.read_property("on")?.as_bool().unwrap_or(false);
    let next = target.unwrap_or(!current);
    if next != current {
        lamp.set_property("on", json!(next))?;
        lamp.emit_event("switched", &json!(next))?;
    }
    Ok(json!(next))
}

#[cfg(test)]
mod tests {
    use wothub_app::Servient;

    use super::*;

    async fn exposed_lamp() -> Arc<ExposedThing> {
        let lamp = VirtualLamp::default();
        let servient = Servient::default();
        let exposed = servient.register_thing(lamp.thing().unwrap()).await.unwrap();
        lamp.install(&exposed).unwrap();
        exposed
    }

    #[tokio::test]
    async fn should_default_to_off() {
        let exposed = exposed_lamp().await;
        assert_eq!(exposed.read_property("on").unwrap(), json!(false));
    }

    #[tokio::test]
    async fn should_turn_on_when_action_invoked() {
        let exposed = exposed_lamp().await;
        let output = exposed.invoke_action("turn_on", Value::Null).await.unwrap();
        assert_eq!(output, json!(true));
        assert_eq!(exposed.read_property("on").unwrap(), json!(true));
    }

    #[tokio::test]
    async fn should_toggle_back_and_forth() {
        let exposed = exposed_lamp().await;
        assert_eq!(exposed.invoke_action("toggle", Value::Null).await.unwrap(), json!(true));
        assert_eq!(exposed.invoke_action("toggle", Value::Null).await.unwrap(), json!(false));
    }

    #[tokio::test]
    async fn should_stay_off_when_turned_off_twice() {
        let exposed = exposed_lamp().await;
        exposed.invoke_action("turn_off", Value::Null).await.unwrap();
        let output = exposed.invoke_action("turn_off", Value::Null).await.unwrap();
        assert_eq!(output, json!(false));
    }

    #[test]
    fn should_reject_invalid_id() {
        assert!(VirtualLamp::new("", "Lamp").thing().is_err());
    }
}
