//! MQTT binding configuration.

use std::time::Duration;

use serde::Deserialize;
use wothub_domain::form::DEFAULT_CONTENT_TYPE;

/// Configuration shared by [`MqttServer`](crate::MqttServer) and
/// [`MqttClient`](crate::MqttClient).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttBindingConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier. The client role appends a random suffix.
    pub client_id: String,
    /// Topic prefix under which Things are exposed.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// How long the client waits for a read or action result, in seconds.
    pub response_timeout_secs: u16,
    /// Media type of property and event payloads.
    pub content_type: String,
}

impl Default for MqttBindingConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "wothub".to_string(),
            base_topic: "wothub".to_string(),
            keep_alive_secs: 30,
            response_timeout_secs: 10,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

impl MqttBindingConfig {
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs.max(5)))
    }

    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.response_timeout_secs.max(1)))
    }

    /// `host:port` of the broker, as written in form hrefs.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.broker_host, self.broker_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_sensible_defaults() {
        let config = MqttBindingConfig::default();
        assert_eq!(config.broker_host, "localhost");
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.client_id, "wothub");
        assert_eq!(config.base_topic, "wothub");
        assert_eq!(config.keep_alive_secs, 30);
        assert_eq!(config.content_type, "application/json");
    }

    #[test]
    fn should_deserialize_from_toml() {
        let toml = r#"
            broker_host = "mqtt.example.com"
            broker_port = 8883
            client_id = "my-hub"
            base_topic = "home"
            keep_alive_secs = 60
            response_timeout_secs = 3
        "#;
        let config: MqttBindingConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.authority(), "mqtt.example.com:8883");
        assert_eq!(config.client_id, "my-hub");
        assert_eq!(config.base_topic, "home");
        assert_eq!(config.keep_alive(), Duration::from_secs(60));
        assert_eq!(config.response_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn should_use_defaults_for_missing_fields() {
        let toml = r#"broker_host = "192.168.1.100""#;
        let config: MqttBindingConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.broker_host, "192.168.1.100");
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.client_id, "wothub");
    }
}
