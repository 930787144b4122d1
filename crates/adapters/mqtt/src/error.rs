//! MQTT adapter error types.

use wothub_domain::error::WotError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The binding has not been started, or was stopped.
    #[error("MQTT client not connected")]
    NotConnected,

    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// Failed to parse an incoming envelope as JSON.
    #[error("failed to parse MQTT payload")]
    PayloadParse(#[source] serde_json::Error),

    /// The form href does not name a broker and topic.
    #[error("invalid MQTT href {0:?}")]
    InvalidHref(String),
}

impl From<MqttError> for WotError {
    fn from(err: MqttError) -> Self {
        match err {
            MqttError::NotConnected => WotError::connection(&err),
            MqttError::Client(ref source) => WotError::connection(format!("{err}: {source}")),
            MqttError::PayloadParse(source) => WotError::Decode {
                media_type: "application/json".to_string(),
                source: Box::new(source),
            },
            MqttError::InvalidHref(_) => WotError::protocol(&err),
        }
    }
}
