//! Forms: binding-specific addresses through which an affordance is reached.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Media type assumed when a form or a request does not name one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Name of a protocol binding (`http`, `mqtt`, `loopback`, …).
///
/// Binding kinds are compared case-insensitively; they are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BindingKind(String);

impl BindingKind {
    #[must_use]
    pub fn new(kind: impl AsRef<str>) -> Self {
        Self(kind.as_ref().to_ascii_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Infer the binding from the scheme of an href (`https://…` → `http`).
    #[must_use]
    pub fn from_href(href: &str) -> Option<Self> {
        let (scheme, _) = href.split_once("://")?;
        let scheme = scheme.to_ascii_lowercase();
        let kind = match scheme.as_str() {
            "https" => "http",
            "mqtts" => "mqtt",
            "coaps" => "coap",
            other => other,
        };
        Some(Self::new(kind))
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BindingKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

impl From<String> for BindingKind {
    fn from(kind: String) -> Self {
        Self::new(kind)
    }
}

impl From<BindingKind> for String {
    fn from(kind: BindingKind) -> Self {
        kind.0
    }
}

/// Interaction verb a form allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    ReadProperty,
    WriteProperty,
    ObserveProperty,
    UnobserveProperty,
    InvokeAction,
    SubscribeEvent,
    UnsubscribeEvent,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadProperty => "readproperty",
            Self::WriteProperty => "writeproperty",
            Self::ObserveProperty => "observeproperty",
            Self::UnobserveProperty => "unobserveproperty",
            Self::InvokeAction => "invokeaction",
            Self::SubscribeEvent => "subscribeevent",
            Self::UnsubscribeEvent => "unsubscribeevent",
        };
        f.write_str(name)
    }
}

/// A concrete address for an affordance on one binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawForm")]
pub struct Form {
    pub binding: BindingKind,
    pub href: String,
    pub content_type: String,
    pub op: Vec<Operation>,
}

impl Form {
    /// Create a form using the default content type.
    pub fn new(
        binding: impl Into<BindingKind>,
        href: impl Into<String>,
        op: impl IntoIterator<Item = Operation>,
    ) -> Self {
        Self {
            binding: binding.into(),
            href: href.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            op: op.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Whether this form allows `operation`.
    ///
    /// A form without any declared operation allows everything its
    /// affordance supports.
    #[must_use]
    pub fn allows(&self, operation: Operation) -> bool {
        self.op.is_empty() || self.op.contains(&operation)
    }
}

/// Wire shape accepted when reading descriptions produced elsewhere, where
/// `binding`, `contentType` and `op` may be missing.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawForm {
    #[serde(default)]
    binding: Option<BindingKind>,
    href: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    op: OneOrMany,
}

#[derive(Default, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    #[default]
    None,
    One(Operation),
    Many(Vec<Operation>),
}

impl From<RawForm> for Form {
    fn from(raw: RawForm) -> Self {
        let binding = raw
            .binding
            .or_else(|| BindingKind::from_href(&raw.href))
            .unwrap_or_else(|| BindingKind::new("unknown"));
        let op = match raw.op {
            OneOrMany::None => Vec::new(),
            OneOrMany::One(op) => vec![op],
            OneOrMany::Many(ops) => ops,
        };
        Self {
            binding,
            href: raw.href,
            content_type: raw
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            op,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_lowercase_binding_kind() {
        assert_eq!(BindingKind::new("HTTP").as_str(), "http");
    }

    #[test]
    fn should_infer_binding_from_secure_scheme() {
        assert_eq!(
            BindingKind::from_href("https://lamp.local/status"),
            Some(BindingKind::new("http"))
        );
        assert_eq!(
            BindingKind::from_href("coaps://mylamp.example.com/status"),
            Some(BindingKind::new("coap"))
        );
        assert_eq!(BindingKind::from_href("not a url"), None);
    }

    #[test]
    fn should_fill_defaults_when_reading_minimal_form() {
        let form: Form =
            serde_json::from_value(json!({"href": "mqtt://broker:1883/lamp/status"})).unwrap();
        assert_eq!(form.binding.as_str(), "mqtt");
        assert_eq!(form.content_type, DEFAULT_CONTENT_TYPE);
        assert!(form.op.is_empty());
        assert!(form.allows(Operation::ReadProperty));
    }

    #[test]
    fn should_accept_single_operation_string() {
        let form: Form = serde_json::from_value(
            json!({"href": "http://lamp/toggle", "op": "invokeaction"}),
        )
        .unwrap();
        assert_eq!(form.op, vec![Operation::InvokeAction]);
        assert!(!form.allows(Operation::ReadProperty));
    }

    #[test]
    fn should_roundtrip_through_serde_json() {
        let form = Form::new(
            "http",
            "http://127.0.0.1:8080/things/lamp/properties/on",
            [Operation::ReadProperty, Operation::WriteProperty],
        )
        .with_content_type("text/plain");
        let json = serde_json::to_value(&form).unwrap();
        assert_eq!(json["contentType"], "text/plain");
        assert_eq!(json["op"], json!(["readproperty", "writeproperty"]));
        let parsed: Form = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, form);
    }
}
