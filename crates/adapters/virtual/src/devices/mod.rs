//! Virtual device implementations: lamp, thermometer, switch.
//!
//! Each device has a fixed Thing id so its slug, and therefore its
//! addresses, stay stable across restarts.

mod light;
mod sensor;
mod switch;

pub use light::VirtualLamp;
pub use sensor::{INITIAL_TEMPERATURE, VirtualThermometer};
pub use switch::VirtualSwitch;

use std::sync::Arc;

use wothub_app::{ExposedThing, Servient};
use wothub_domain::error::WotError;

/// Wrapper enum for the concrete virtual device types.
pub enum VirtualDevice {
    Lamp(VirtualLamp),
    Thermometer(VirtualThermometer),
    Switch(VirtualSwitch),
}

impl VirtualDevice {
    /// One of each device with its default identity.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::Lamp(VirtualLamp::default()),
            Self::Thermometer(VirtualThermometer::default()),
            Self::Switch(VirtualSwitch::default()),
        ]
    }

    /// Register the device on `servient` and wire its behaviour.
    ///
    /// # Errors
    ///
    /// Fails when the Thing is invalid or already registered.
    pub async fn expose(&self, servient: &Servient) -> Result<Arc<ExposedThing>, WotError> {
        let thing = match self {
            Self::Lamp(d) => d.thing()?,
            Self::Thermometer(d) => d.thing()?,
            Self::Switch(d) => d.thing()?,
        };
        let exposed = servient.register_thing(thing).await?;
        if let Self::Lamp(lamp) = self {
            lamp.install(&exposed)?;
        }
        Ok(exposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_expose_every_default_device() {
        let servient = Servient::default();
        for device in VirtualDevice::defaults() {
            device.expose(&servient).await.unwrap();
        }
        assert_eq!(servient.thing_descriptions().len(), 3);
    }

    #[tokio::test]
    async fn should_fail_when_device_exposed_twice() {
        let servient = Servient::default();
        let device = VirtualDevice::Switch(VirtualSwitch::default());
        device.expose(&servient).await.unwrap();
        assert!(device.expose(&servient).await.is_err());
    }
}
