//! # wothub-adapter-mqtt
//!
//! MQTT protocol binding built on [rumqttc](https://docs.rs/rumqttc).
//!
//! ## Responsibilities
//! - [`MqttServer`] exposes registered Things under
//!   `{base_topic}/{slug}`: property values are retained, events are
//!   published as they are emitted, reads, writes and action invocations
//!   arrive on request topics.
//! - [`MqttClient`] performs the same interactions against any `mqtt` form,
//!   correlating action results by invocation id.
//!
//! Forms carry `mqtt://host:port/{topic}` hrefs; the topic layout is
//! described in [`topics`].
//!
//! ## Dependency rule
//! Depends on `wothub-app` (port traits) and `wothub-domain`. rumqttc types
//! stay inside this crate.

mod client;
mod config;
mod error;
pub mod message;
mod server;
pub mod topics;

pub use client::MqttClient;
pub use config::MqttBindingConfig;
pub use error::MqttError;
pub use server::MqttServer;
