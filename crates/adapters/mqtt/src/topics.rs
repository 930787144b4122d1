//! Topic layout of the MQTT binding.
//!
//! Every Thing lives under `{base}/{slug}`:
//!
//! | Topic | Direction | Payload |
//! |-------|-----------|---------|
//! | `property/{name}` | server → client, retained | current value |
//! | `property/{name}/read` | client → server | ignored |
//! | `property/{name}/write` | client → server | [`WriteRequest`](crate::message::WriteRequest) |
//! | `property/{name}/write/result` | server → client | [`WriteResult`](crate::message::WriteResult) |
//! | `action/{name}` | client → server | [`ActionRequest`](crate::message::ActionRequest) |
//! | `action/{name}/result` | server → client | [`ActionResult`](crate::message::ActionResult) |
//! | `event/{name}` | server → client | event data |

use wothub_domain::affordance::AffordanceKind;

use crate::error::MqttError;

const READ: &str = "read";
const WRITE: &str = "write";
const RESULT: &str = "result";

/// Topic of a published affordance, as carried by its form.
#[must_use]
pub fn affordance_topic(base: &str, slug: &str, kind: AffordanceKind, name: &str) -> String {
    format!("{}/{slug}/{kind}/{name}", base.trim_end_matches('/'))
}

#[must_use]
pub fn read_topic(property_topic: &str) -> String {
    format!("{property_topic}/{READ}")
}

#[must_use]
pub fn write_topic(property_topic: &str) -> String {
    format!("{property_topic}/{WRITE}")
}

#[must_use]
pub fn result_topic(action_topic: &str) -> String {
    format!("{action_topic}/{RESULT}")
}

/// Filters the server subscribes to for inbound requests.
#[must_use]
pub fn request_filters(base: &str) -> [String; 3] {
    let base = base.trim_end_matches('/');
    [
        format!("{base}/+/property/+/{READ}"),
        format!("{base}/+/property/+/{WRITE}"),
        format!("{base}/+/action/+"),
    ]
}

/// An inbound request addressed to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    ReadProperty { slug: &'a str, name: &'a str },
    WriteProperty { slug: &'a str, name: &'a str },
    InvokeAction { slug: &'a str, name: &'a str },
}

impl<'a> Request<'a> {
    /// Recognise a request topic below `base`; anything else yields `None`.
    #[must_use]
    pub fn parse(base: &str, topic: &'a str) -> Option<Self> {
        let rest = topic
            .strip_prefix(base.trim_end_matches('/'))?
            .strip_prefix('/')?;
        let segments: Vec<&str> = rest.split('/').collect();
        match *segments.as_slice() {
            [slug, "property", name, READ] => Some(Self::ReadProperty { slug, name }),
            [slug, "property", name, WRITE] => Some(Self::WriteProperty { slug, name }),
            [slug, "action", name] => Some(Self::InvokeAction { slug, name }),
            _ => None,
        }
    }

    #[must_use]
    pub fn slug(&self) -> &'a str {
        match *self {
            Self::ReadProperty { slug, .. }
            | Self::WriteProperty { slug, .. }
            | Self::InvokeAction { slug, .. } => slug,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'a str {
        match *self {
            Self::ReadProperty { name, .. }
            | Self::WriteProperty { name, .. }
            | Self::InvokeAction { name, .. } => name,
        }
    }
}

/// Broker address and topic of an `mqtt://host[:port]/topic` href.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub topic: String,
}

impl Target {
    /// # Errors
    ///
    /// Returns [`MqttError::InvalidHref`] when the scheme is not `mqtt` or
    /// `mqtts`, or the topic is missing.
    pub fn parse(href: &str) -> Result<Self, MqttError> {
        let invalid = || MqttError::InvalidHref(href.to_string());
        let (default_port, rest) = if let Some(rest) = href.strip_prefix("mqtt://") {
            (1883, rest)
        } else if let Some(rest) = href.strip_prefix("mqtts://") {
            (8883, rest)
        } else {
            return Err(invalid());
        };
        let (authority, topic) = rest.split_once('/').ok_or_else(invalid)?;
        if topic.is_empty() || authority.is_empty() {
            return Err(invalid());
        }
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
            None => (authority, default_port),
        };
        Ok(Self {
            host: host.to_string(),
            port,
            topic: topic.to_string(),
        })
    }

    /// `host:port`, the key client connections are shared by.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_affordance_topics() {
        let topic = affordance_topic("wothub/", "lamp-1a2b", AffordanceKind::Property, "on");
        assert_eq!(topic, "wothub/lamp-1a2b/property/on");
        assert_eq!(read_topic(&topic), "wothub/lamp-1a2b/property/on/read");
        assert_eq!(write_topic(&topic), "wothub/lamp-1a2b/property/on/write");
        assert_eq!(
            result_topic(&write_topic(&topic)),
            "wothub/lamp-1a2b/property/on/write/result"
        );

        let action = affordance_topic("wothub", "lamp-1a2b", AffordanceKind::Action, "toggle");
        assert_eq!(result_topic(&action), "wothub/lamp-1a2b/action/toggle/result");
    }

    #[test]
    fn should_parse_request_topics() {
        assert_eq!(
            Request::parse("wothub", "wothub/lamp/property/on/read"),
            Some(Request::ReadProperty {
                slug: "lamp",
                name: "on"
            })
        );
        assert_eq!(
            Request::parse("wothub", "wothub/lamp/property/on/write"),
            Some(Request::WriteProperty {
                slug: "lamp",
                name: "on"
            })
        );
        let invoke = Request::parse("wothub", "wothub/lamp/action/toggle").unwrap();
        assert_eq!(invoke.slug(), "lamp");
        assert_eq!(invoke.name(), "toggle");
    }

    #[test]
    fn should_ignore_topics_the_server_publishes() {
        assert_eq!(Request::parse("wothub", "wothub/lamp/property/on"), None);
        assert_eq!(Request::parse("wothub", "wothub/lamp/action/toggle/result"), None);
        assert_eq!(Request::parse("wothub", "wothub/lamp/property/on/write/result"), None);
        assert_eq!(Request::parse("wothub", "wothub/lamp/event/switched"), None);
        assert_eq!(Request::parse("wothub", "other/lamp/action/toggle"), None);
        assert_eq!(Request::parse("wothub", "wothubx/lamp/action/toggle"), None);
    }

    #[test]
    fn should_match_request_filters_layout() {
        let filters = request_filters("home/");
        assert_eq!(filters[0], "home/+/property/+/read");
        assert_eq!(filters[2], "home/+/action/+");
    }

    #[test]
    fn should_parse_href_with_port() {
        let target = Target::parse("mqtt://broker.local:1884/wothub/lamp/property/on").unwrap();
        assert_eq!(target.host, "broker.local");
        assert_eq!(target.port, 1884);
        assert_eq!(target.topic, "wothub/lamp/property/on");
        assert_eq!(target.authority(), "broker.local:1884");
    }

    #[test]
    fn should_default_port_by_scheme() {
        assert_eq!(Target::parse("mqtt://broker/t").unwrap().port, 1883);
        assert_eq!(Target::parse("mqtts://broker/t").unwrap().port, 8883);
    }

    #[test]
    fn should_reject_invalid_hrefs() {
        for href in [
            "http://broker/t",
            "mqtt://broker",
            "mqtt://broker/",
            "mqtt:///topic",
            "mqtt://broker:port/t",
        ] {
            assert!(
                matches!(Target::parse(href), Err(MqttError::InvalidHref(_))),
                "{href}"
            );
        }
    }
}
