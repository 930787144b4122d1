//! Content codecs: conversion between interaction values and wire bytes.
//!
//! Every binding encodes and decodes payloads through the shared
//! [`CodecRegistry`], so adding a media type is a startup-time registration
//! rather than a change to each adapter.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use wothub_domain::error::{BoxError, WotError};
use wothub_domain::form::DEFAULT_CONTENT_TYPE;
use wothub_domain::notification::Content;

/// A (media type, encode, decode) triple.
pub trait ContentCodec: Send + Sync {
    /// Normalised media type handled by this codec.
    fn media_type(&self) -> &str;

    /// Serialize `value` to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` cannot be represented in this media type.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, BoxError>;

    /// Parse `bytes` back into a value.
    ///
    /// # Errors
    ///
    /// Returns an error when `bytes` are malformed for this media type.
    fn decode(&self, bytes: &[u8]) -> Result<Value, BoxError>;
}

/// `application/json`, backed by `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl ContentCodec for JsonCodec {
    fn media_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, BoxError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, BoxError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// `text/plain`.
///
/// Carries strings only, as raw UTF-8. Every decoded body is a string, so
/// other values are rejected on encode instead of coming back as text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodec;

impl ContentCodec for TextCodec {
    fn media_type(&self) -> &str {
        "text/plain"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, BoxError> {
        match value {
            Value::String(text) => Ok(text.as_bytes().to_vec()),
            other => Err(format!("text/plain carries strings only, found {other}").into()),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, BoxError> {
        let text = std::str::from_utf8(bytes)?;
        Ok(Value::String(text.to_string()))
    }
}

/// Lowercase a media type and strip its parameters.
///
/// `Application/JSON; charset=utf-8` becomes `application/json`. An empty
/// input maps to the default content type.
#[must_use]
pub fn normalize_media_type(media_type: &str) -> String {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence.is_empty() {
        DEFAULT_CONTENT_TYPE.to_string()
    } else {
        essence
    }
}

/// Registry of codecs keyed by normalised media type.
///
/// Populated at startup through `&mut self`, then shared behind an `Arc` for
/// concurrent lookups.
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn ContentCodec>>,
}

impl Default for CodecRegistry {
    /// A registry with the built-in JSON and plain-text codecs.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(JsonCodec);
        registry.register(TextCodec);
        registry
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut media_types: Vec<&String> = self.codecs.keys().collect();
        media_types.sort();
        f.debug_struct("CodecRegistry")
            .field("media_types", &media_types)
            .finish()
    }
}

impl CodecRegistry {
    /// A registry without any codec.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Add or replace the codec for its media type.
    pub fn register(&mut self, codec: impl ContentCodec + 'static) {
        let media_type = normalize_media_type(codec.media_type());
        tracing::debug!(%media_type, "registered content codec");
        self.codecs.insert(media_type, Arc::new(codec));
    }

    #[must_use]
    pub fn supports(&self, media_type: &str) -> bool {
        self.codecs.contains_key(&normalize_media_type(media_type))
    }

    fn codec(&self, media_type: &str) -> Result<(String, &Arc<dyn ContentCodec>), WotError> {
        let media_type = normalize_media_type(media_type);
        match self.codecs.get(&media_type) {
            Some(codec) => Ok((media_type, codec)),
            None => Err(WotError::UnsupportedMediaType { media_type }),
        }
    }

    /// Encode `value` as `media_type`.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::UnsupportedMediaType`] for unknown media types and
    /// [`WotError::Encode`] when the codec rejects the value.
    pub fn encode(&self, media_type: &str, value: &Value) -> Result<Content, WotError> {
        let (media_type, codec) = self.codec(media_type)?;
        let body = codec.encode(value).map_err(|source| WotError::Encode {
            media_type: media_type.clone(),
            source,
        })?;
        Ok(Content::new(media_type, body))
    }

    /// Decode `bytes` written as `media_type`.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::UnsupportedMediaType`] for unknown media types and
    /// [`WotError::Decode`] on malformed input.
    pub fn decode(&self, media_type: &str, bytes: &[u8]) -> Result<Value, WotError> {
        let (media_type, codec) = self.codec(media_type)?;
        codec
            .decode(bytes)
            .map_err(|source| WotError::Decode { media_type, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_roundtrip_json_values() {
        let registry = CodecRegistry::default();
        for value in [
            json!(null),
            json!(21.5),
            json!("on"),
            json!({"r": 255, "g": [1, 2]}),
        ] {
            let content = registry.encode("application/json", &value).unwrap();
            let decoded = registry
                .decode(&content.media_type, content.as_bytes())
                .unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn should_encode_strings_as_raw_text() {
        let registry = CodecRegistry::default();
        let content = registry.encode("text/plain", &json!("hello")).unwrap();
        assert_eq!(content.as_bytes(), b"hello");
    }

    #[test]
    fn should_roundtrip_json_looking_strings_as_text() {
        let registry = CodecRegistry::default();
        for value in [
            json!("42"),
            json!("true"),
            json!("null"),
            json!("{\"a\":1}"),
            json!(""),
        ] {
            let content = registry.encode("text/plain", &value).unwrap();
            let decoded = registry
                .decode(&content.media_type, content.as_bytes())
                .unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn should_reject_non_string_values_as_text() {
        let registry = CodecRegistry::default();
        for value in [json!(42), json!(true), json!(null), json!({"a": 1})] {
            let err = registry.encode("text/plain", &value).unwrap_err();
            assert!(matches!(err, WotError::Encode { .. }), "{value}");
        }
    }

    #[test]
    fn should_fail_with_decode_error_on_invalid_utf8_text() {
        let registry = CodecRegistry::default();
        let err = registry.decode("text/plain", &[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, WotError::Decode { .. }));
    }

    #[test]
    fn should_normalize_media_type_before_lookup() {
        let registry = CodecRegistry::default();
        let content = registry
            .encode("Application/JSON; charset=utf-8", &json!(true))
            .unwrap();
        assert_eq!(content.media_type, "application/json");
        assert!(registry.supports("TEXT/PLAIN"));
        assert_eq!(normalize_media_type(""), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn should_fail_with_unsupported_media_type_when_no_codec() {
        let registry = CodecRegistry::default();
        let err = registry.encode("application/cbor", &json!(1)).unwrap_err();
        assert!(
            matches!(err, WotError::UnsupportedMediaType { media_type } if media_type == "application/cbor")
        );
    }

    #[test]
    fn should_fail_with_decode_error_on_malformed_json() {
        let registry = CodecRegistry::default();
        let err = registry.decode("application/json", b"{not json").unwrap_err();
        assert!(matches!(err, WotError::Decode { .. }));
    }

    #[test]
    fn should_use_registered_plugin_codec() {
        struct Shouting;
        impl ContentCodec for Shouting {
            fn media_type(&self) -> &str {
                "text/x-shout"
            }
            fn encode(&self, value: &Value) -> Result<Vec<u8>, BoxError> {
                Ok(value.to_string().to_uppercase().into_bytes())
            }
            fn decode(&self, bytes: &[u8]) -> Result<Value, BoxError> {
                Ok(Value::String(String::from_utf8(bytes.to_vec())?.to_lowercase()))
            }
        }

        let mut registry = CodecRegistry::empty();
        registry.register(Shouting);
        let content = registry.encode("text/x-shout", &json!("hi")).unwrap();
        assert_eq!(content.as_bytes(), b"\"HI\"");
        assert!(!registry.supports("application/json"));
    }
}
