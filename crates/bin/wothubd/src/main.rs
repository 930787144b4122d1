//! # wothubd: wothub daemon
//!
//! Composition root that wires the bindings and the demo Things into a
//! servient and runs until interrupted.
//!
//! ## Responsibilities
//! - Parse configuration (`wothub.toml`, env vars)
//! - Initialise `tracing` with the configured filter
//! - Build the servient and register the binding clients
//! - Start the HTTP, loopback and (optionally) MQTT servers
//! - Expose the virtual devices and drive the thermometer simulation
//! - Log directory changes and lifecycle events
//! - Shut every binding down on Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;
mod discovery;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use wothub_adapter_http_axum::{HttpClient, HttpServer};
use wothub_adapter_mqtt::{MqttClient, MqttServer};
use wothub_adapter_virtual::{
    LoopbackClient, LoopbackNetwork, LoopbackServer, VirtualDevice, VirtualThermometer,
};
use wothub_app::Servient;

use crate::config::Config;
use crate::discovery::{LogAdvertiser, log_events};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    let servient = Servient::builder().timeout(config.timeout()).build();
    let codecs = servient.codecs();
    let network = LoopbackNetwork::new();

    // Clients
    servient.add_client(Arc::new(
        HttpClient::new(Arc::clone(&codecs)).context("failed to build http client")?,
    ));
    servient.add_client(Arc::new(LoopbackClient::new(network.clone(), Arc::clone(&codecs))));
    if config.mqtt.enabled {
        servient.add_client(Arc::new(MqttClient::new(
            config.mqtt.binding.clone(),
            Arc::clone(&codecs),
        )));
    }

    // Discovery
    let events = log_events(servient.subscribe_events());
    servient.add_advertiser(Arc::new(LogAdvertiser)).await;

    // Servers
    servient
        .add_binding(Arc::new(HttpServer::new(config.http.clone(), Arc::clone(&codecs))))
        .await
        .context("failed to start http binding")?;
    if config.loopback.enabled {
        servient
            .add_binding(Arc::new(LoopbackServer::new(
                network,
                Arc::clone(&codecs),
                config.loopback.node.clone(),
            )))
            .await
            .context("failed to start loopback binding")?;
    }
    if config.mqtt.enabled {
        servient
            .add_binding(Arc::new(MqttServer::new(
                config.mqtt.binding.clone(),
                Arc::clone(&codecs),
            )))
            .await
            .context("failed to start mqtt binding")?;
    }

    // Devices
    let mut simulations = Vec::new();
    if config.devices.enabled {
        for device in VirtualDevice::defaults() {
            let exposed = device
                .expose(&servient)
                .await
                .context("failed to expose virtual device")?;
            if matches!(device, VirtualDevice::Thermometer(_)) {
                simulations.push(VirtualThermometer::simulate(&exposed, config.sample_period()));
            }
        }
    }

    tracing::info!(bindings = ?servient.bindings().await, "wothubd running");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("shutting down");
    for simulation in simulations {
        simulation.abort();
    }
    servient.shutdown().await;
    events.abort();
    Ok(())
}
