//! Virtual thermometer: a read-only, observable temperature reading.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use wothub_app::ExposedThing;
use wothub_domain::affordance::Affordance;
use wothub_domain::data_schema::DataSchema;
use wothub_domain::error::{ValidationError, WotError};
use wothub_domain::thing::Thing;

/// Reading reported before the first update.
pub const INITIAL_TEMPERATURE: f64 = 21.5;

const DEFAULT_THRESHOLD: f64 = 30.0;

/// A simulated temperature sensor.
///
/// Consumers cannot write `temperature`; new readings come from
/// [`VirtualThermometer::report`] or the [`simulate`](VirtualThermometer::simulate) task.
/// A reading above `threshold` fires the `overheat` event.
pub struct VirtualThermometer {
    id: String,
    title: String,
}

impl Default for VirtualThermometer {
    fn default() -> Self {
        Self {
            id: "urn:wothub:virtual:thermometer".to_string(),
            title: "Virtual Thermometer".to_string(),
        }
    }
}

impl VirtualThermometer {
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
            .description("Simulated temperature sensor")
            .property_with_value(
                "temperature",
                Affordance::observable_property(DataSchema::number().description("Degrees Celsius"))
                    .read_only(),
                json!(INITIAL_TEMPERATURE),
            )
            .property_with_value(
                "unit",
                Affordance::property(DataSchema::string()).read_only(),
                json!("\u{b0}C"),
            )
            .property_with_value(
                "threshold",
                Affordance::property(DataSchema::number().minimum(-50.0).maximum(150.0)),
                json!(DEFAULT_THRESHOLD),
            )
            .affordance("overheat", Affordance::event(Some(DataSchema::number())))
            .build()
    }

    /// Publish a new reading.
    ///
    /// # Errors
    ///
    /// Fails when `exposed` was not built from [`VirtualThermometer::thing`].
    pub fn report(exposed: &ExposedThing, celsius: f64) -> Result<(), WotError> {
        exposed.set_property("temperature", json!(celsius))?;
        let threshold = exposed
            .read_property("threshold")?
            .as_f64()
            .unwrap_or(DEFAULT_THRESHOLD);
        if celsius > threshold {
            exposed.emit_event("overheat", &json!(celsius))?;
        }
        Ok(())
    }

    /// Report a slowly oscillating reading every `period`.
    ///
    /// The task ends once the thing is dropped.
    #[must_use]
    pub fn simulate(exposed: &Arc<ExposedThing>, period: Duration) -> JoinHandle<()> {
        let thermometer = Arc::downgrade(exposed);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            let mut step: i32 = 0;
            let mut rising = true;
            loop {
                ticker.tick().await;
                let Some(exposed) = thermometer.upgrade() else {
                    break;
                };
                if step >= 8 {
                    rising = false;
                } else if step <= -8 {
                    rising = true;
                }
                step += if rising { 1 } else { -1 };
                let celsius = INITIAL_TEMPERATURE + f64::from(step) * 0.5;
                if let Err(error) = Self::report(&exposed, celsius) {
                    tracing::warn!(thing = %exposed.id(), %error, "failed to report reading");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use wothub_app::Servient;
    use wothub_domain::notification::NotificationKind;

    use super::*;

    async fn exposed_thermometer() -> Arc<ExposedThing> {
        let servient = Servient::default();
        servient
            .register_thing(VirtualThermometer::default().thing().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn should_report_initial_temperature() {
        let exposed = exposed_thermometer().await;
        assert_eq!(exposed.read_property("temperature").unwrap(), json!(21.5));
        assert_eq!(exposed.read_property("unit").unwrap(), json!("\u{b0}C"));
    }

    #[tokio::test]
    async fn should_reject_remote_write_of_reading() {
        let exposed = exposed_thermometer().await;
        let err = exposed.write_property("temperature", json!(40.0)).unwrap_err();
        assert!(matches!(
            err,
            WotError::Validation(ValidationError::NotWritable(_))
        ));
    }

    #[tokio::test]
    async fn should_fire_overheat_when_above_threshold() {
        let exposed = exposed_thermometer().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        exposed.subscribe("overheat", "application/json", tx).unwrap();

        VirtualThermometer::report(&exposed, 25.0).unwrap();
        assert!(rx.try_recv().is_err());

        VirtualThermometer::report(&exposed, 31.0).unwrap();
        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.kind, NotificationKind::Event);
        assert_eq!(notification.content.as_bytes(), b"31.0");
    }

    #[tokio::test(start_paused = true)]
    async fn should_update_reading_when_simulated() {
        let exposed = exposed_thermometer().await;
        let task = VirtualThermometer::simulate(&exposed, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(exposed.read_property("temperature").unwrap(), json!(22.0));
        task.abort();
    }
}
