//! Virtual switch: a plain writable, observable `on` property.

use serde_json::json;
use wothub_domain::affordance::Affordance;
use wothub_domain::data_schema::DataSchema;
use wothub_domain::error::ValidationError;
use wothub_domain::thing::Thing;

/// A simulated wall switch. Consumers flip it by writing `on`.
pub struct VirtualSwitch {
    id: String,
    title: String,
}

impl Default for VirtualSwitch {
    fn default() -> Self {
        Self {
            id: "urn:wothub:virtual:switch".to_string(),
            title: "Virtual Switch".to_string(),
        }
    }
}

impl VirtualSwitch {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }

    /// # Errors
    ///
    /// Returns a validation error when the configured id is not usable.
    pub fn thing(&self) -> Result<Thing, ValidationError> {
        Thing::builder(self.id.clone())
            .title(self.title.clone())
            .description("Simulated switch")
            .property_with_value(
                "on",
                Affordance::observable_property(DataSchema::boolean()),
                json!(false),
            )
            .build()
    }
}

#[cfg(test)]
mod tests {
    use wothub_app::Servient;
    use wothub_domain::error::WotError;

    use super::*;

    #[tokio::test]
    async fn should_flip_when_written() {
        let servient = Servient::default();
        let exposed = servient
            .register_thing(VirtualSwitch::default().thing().unwrap())
            .await
            .unwrap();
        exposed.write_property("on", json!(true)).unwrap();
        assert_eq!(exposed.read_property("on").unwrap(), json!(true));
    }

    #[tokio::test]
    async fn should_reject_non_boolean_value() {
        let servient = Servient::default();
        let exposed = servient
            .register_thing(VirtualSwitch::default().thing().unwrap())
            .await
            .unwrap();
        let err = exposed.write_property("on", json!("yes")).unwrap_err();
        assert!(matches!(err, WotError::Validation(_)));
    }
}
