//! HTTP binding settings.

use serde::Deserialize;
use wothub_domain::form::DEFAULT_CONTENT_TYPE;

/// Listener and addressing configuration of the HTTP binding.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpBindingConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port. `0` lets the OS pick one; published hrefs use the actual port.
    pub port: u16,
    /// Base URL written into forms, e.g. `https://hub.example.com`.
    ///
    /// Derived from the bound address when unset.
    pub base_url: Option<String>,
    /// Media type advertised in published forms.
    pub content_type: String,
}

impl Default for HttpBindingConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            base_url: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

impl HttpBindingConfig {
    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Bind to `127.0.0.1` on an OS-assigned port.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            port: 0,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = HttpBindingConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.content_type, "application/json");
        assert!(config.base_url.is_none());
    }

    #[test]
    fn should_parse_partial_section() {
        let config: HttpBindingConfig = serde_json::from_value(serde_json::json!({
            "port": 9090,
            "base_url": "http://hub.local:9090"
        }))
        .unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9090);
        assert_eq!(config.base_url.as_deref(), Some("http://hub.local:9090"));
    }
}
