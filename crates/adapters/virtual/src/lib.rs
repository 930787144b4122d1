//! # wothub-adapter-virtual
//!
//! In-process binding and simulated devices for testing and demonstration.
//!
//! ## Loopback binding
//!
//! [`LoopbackServer`] and [`LoopbackClient`] move encoded payloads over a
//! shared [`LoopbackNetwork`] instead of a socket. Giving servers distinct
//! binding kinds lets one process run several "protocols" side by side.
//!
//! ## Provided devices
//!
//! | Device | Thing id | Behaviour |
//! |--------|----------|-----------|
//! | Virtual Lamp | `urn:wothub:virtual:lamp` | `on` property, `turn_on` / `turn_off` / `toggle` actions, `switched` event |
//! | Virtual Thermometer | `urn:wothub:virtual:thermometer` | read-only observable `temperature`, `overheat` event |
//! | Virtual Switch | `urn:wothub:virtual:switch` | writable observable `on` |
//!
//! ## Dependency rule
//!
//! Depends on `wothub-app` (port traits) and `wothub-domain` only.

pub mod devices;
pub mod loopback;

pub use devices::{VirtualDevice, VirtualLamp, VirtualSwitch, VirtualThermometer};
pub use loopback::{LoopbackClient, LoopbackError, LoopbackNetwork, LoopbackServer};
