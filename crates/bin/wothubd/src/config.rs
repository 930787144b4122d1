//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `wothub.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;
use wothub_adapter_http_axum::HttpBindingConfig;
use wothub_adapter_mqtt::MqttBindingConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Servient settings.
    pub servient: ServientConfig,
    /// HTTP binding settings.
    pub http: HttpBindingConfig,
    /// MQTT binding settings.
    pub mqtt: MqttConfig,
    /// In-process binding settings.
    pub loopback: LoopbackConfig,
    /// Demo Things.
    pub devices: DevicesConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServientConfig {
    /// Upper bound of every client interaction, in seconds.
    pub timeout_secs: u64,
}

/// The MQTT binding is only started when enabled.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub binding: MqttBindingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    pub enabled: bool,
    /// Node name written into loopback hrefs.
    pub node: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Expose the virtual lamp, thermometer and switch.
    pub enabled: bool,
    /// Thermometer sampling period, in milliseconds.
    pub sample_period_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `wothub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("wothub.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("WOTHUB_HTTP_HOST") {
            self.http.host = val;
        }
        if let Some(val) = var("WOTHUB_HTTP_PORT")
            && let Ok(port) = val.parse()
        {
            self.http.port = port;
        }
        if let Some(val) = var("WOTHUB_MQTT_BROKER") {
            self.mqtt.enabled = true;
            let split = val
                .rsplit_once(':')
                .and_then(|(host, port)| Some((host.to_string(), port.parse::<u16>().ok()?)));
            match split {
                Some((host, port)) => {
                    self.mqtt.binding.broker_host = host;
                    self.mqtt.binding.broker_port = port;
                }
                None => self.mqtt.binding.broker_host = val,
            }
        }
        if let Some(val) = var("WOTHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::Validation("http port must be non-zero".to_string()));
        }
        if self.servient.timeout_secs == 0 {
            return Err(ConfigError::Validation("timeout must be non-zero".to_string()));
        }
        if self.devices.enabled && self.devices.sample_period_ms == 0 {
            return Err(ConfigError::Validation(
                "sample period must be non-zero".to_string(),
            ));
        }
        if self.mqtt.enabled {
            let mqtt = &self.mqtt.binding;
            if mqtt.broker_host.is_empty() {
                return Err(ConfigError::Validation("mqtt broker host is empty".to_string()));
            }
            if mqtt.base_topic.is_empty() || mqtt.base_topic.contains(['+', '#']) {
                return Err(ConfigError::Validation(format!(
                    "invalid mqtt base topic {:?}",
                    mqtt.base_topic
                )));
            }
        }
        if self.loopback.enabled && (self.loopback.node.is_empty() || self.loopback.node.contains('/')) {
            return Err(ConfigError::Validation(format!(
                "invalid loopback node {:?}",
                self.loopback.node
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.servient.timeout_secs)
    }

    #[must_use]
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.devices.sample_period_ms)
    }
}

impl Default for ServientConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            node: "wothubd".to_string(),
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_period_ms: 5_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "wothubd=info,wothub=info,tower_http=debug".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn overridden(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).cloned());
        config
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.http.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(!config.mqtt.enabled);
        assert!(config.loopback.enabled);
        assert!(config.devices.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.mqtt.binding.broker_port, 1883);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [servient]
            timeout_secs = 3

            [http]
            host = '0.0.0.0'
            port = 9090
            base_url = 'https://hub.example.com'

            [mqtt]
            enabled = true
            broker_host = 'broker.local'
            base_topic = 'home'

            [loopback]
            enabled = false

            [devices]
            sample_period_ms = 250

            [logging]
            filter = 'debug'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.http.bind_addr(), "0.0.0.0:9090");
        assert_eq!(config.http.base_url.as_deref(), Some("https://hub.example.com"));
        assert!(config.mqtt.enabled);
        assert_eq!(config.mqtt.binding.authority(), "broker.local:1883");
        assert_eq!(config.mqtt.binding.base_topic, "home");
        assert!(!config.loopback.enabled);
        assert_eq!(config.sample_period(), Duration::from_millis(250));
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }

    #[test]
    fn should_override_http_from_env() {
        let config = overridden(&[("WOTHUB_HTTP_HOST", "0.0.0.0"), ("WOTHUB_HTTP_PORT", "9000")]);
        assert_eq!(config.http.bind_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn should_ignore_unparsable_port_override() {
        let config = overridden(&[("WOTHUB_HTTP_PORT", "eighty")]);
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn should_enable_mqtt_when_broker_is_given() {
        let config = overridden(&[("WOTHUB_MQTT_BROKER", "10.0.0.2:1884")]);
        assert!(config.mqtt.enabled);
        assert_eq!(config.mqtt.binding.authority(), "10.0.0.2:1884");

        let config = overridden(&[("WOTHUB_MQTT_BROKER", "broker")]);
        assert_eq!(config.mqtt.binding.authority(), "broker:1883");
    }

    #[test]
    fn should_prefer_rust_log_over_wothub_log() {
        let config = overridden(&[("WOTHUB_LOG", "warn"), ("RUST_LOG", "trace")]);
        assert_eq!(config.logging.filter, "trace");
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = Config::default();
        config.http.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_wildcard_base_topic_when_mqtt_enabled() {
        let mut config = Config::default();
        config.mqtt.binding.base_topic = "home/#".to_string();
        assert!(config.validate().is_ok());
        config.mqtt.enabled = true;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_loopback_node_with_slash() {
        let mut config = Config::default();
        config.loopback.node = "a/b".to_string();
        assert!(config.validate().is_err());
    }
}
