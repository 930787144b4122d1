//! JSON envelopes exchanged on write and action topics.
//!
//! Property and event payloads are bare values encoded with the form's
//! content type. Writes and action invocations are answered, so their
//! requests and replies carry a correlation id and travel wrapped, always
//! as JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wothub_domain::error::{ErrorKind, WotError};

use crate::error::MqttError;

/// Published by a client on `action/{name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: String,
    #[serde(default)]
    pub input: Value,
}

impl ActionRequest {
    /// A request with a fresh correlation id.
    #[must_use]
    pub fn new(input: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            input,
        }
    }
}

/// Published by the server on `action/{name}/result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl ActionResult {
    #[must_use]
    pub fn from_outcome(id: String, outcome: Result<Value, WotError>) -> Self {
        match outcome {
            Ok(result) => Self {
                id,
                result: Some(result),
                error: None,
                kind: None,
            },
            Err(err) => Self {
                id,
                result: None,
                error: Some(err.wire_message()),
                kind: Some(err.kind()),
            },
        }
    }

    /// Rebuild the outcome on the client side. A missing result is `null`.
    ///
    /// # Errors
    ///
    /// Returns the remote error, defaulting to an action failure when the
    /// server did not name a kind.
    pub fn into_outcome(self) -> Result<Value, WotError> {
        match self.error {
            Some(message) => Err(WotError::from_remote(
                self.kind.unwrap_or(ErrorKind::Action),
                message,
            )),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Published by a client on `property/{name}/write`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub id: String,
    pub value: Value,
}

impl WriteRequest {
    /// A request with a fresh correlation id.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            value,
        }
    }
}

/// Published by the server on `property/{name}/write/result` once the store
/// holds the new value, or the write was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl WriteResult {
    #[must_use]
    pub fn from_outcome(id: String, outcome: Result<(), WotError>) -> Self {
        match outcome {
            Ok(()) => Self {
                id,
                error: None,
                kind: None,
            },
            Err(err) => Self {
                id,
                error: Some(err.wire_message()),
                kind: Some(err.kind()),
            },
        }
    }

    /// # Errors
    ///
    /// Returns the remote error, defaulting to a protocol failure when the
    /// server did not name a kind.
    pub fn into_outcome(self) -> Result<(), WotError> {
        match self.error {
            Some(message) => Err(WotError::from_remote(
                self.kind.unwrap_or(ErrorKind::Protocol),
                message,
            )),
            None => Ok(()),
        }
    }
}

pub(crate) fn to_payload<T: Serialize>(message: &T) -> Vec<u8> {
    // serialising a struct of strings and JSON values cannot fail
    serde_json::to_vec(message).unwrap_or_default()
}

pub(crate) fn from_payload<'de, T: Deserialize<'de>>(payload: &'de [u8]) -> Result<T, MqttError> {
    serde_json::from_slice(payload).map_err(MqttError::PayloadParse)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn should_default_missing_input_to_null() {
        let request: ActionRequest = from_payload(br#"{"id":"42"}"#).unwrap();
        assert_eq!(request.id, "42");
        assert_eq!(request.input, Value::Null);
    }

    #[test]
    fn should_generate_distinct_ids() {
        assert_ne!(ActionRequest::new(json!(1)).id, ActionRequest::new(json!(1)).id);
    }

    #[test]
    fn should_write_success_without_error_fields() {
        let result = ActionResult::from_outcome("7".to_string(), Ok(json!(true)));
        let payload: Value = serde_json::from_slice(&to_payload(&result)).unwrap();
        assert_eq!(payload, json!({"id": "7", "result": true}));
    }

    #[test]
    fn should_carry_action_failure_message_and_kind() {
        let result = ActionResult::from_outcome("7".to_string(), Err(WotError::action("relay stuck")));
        let payload: Value = serde_json::from_slice(&to_payload(&result)).unwrap();
        assert_eq!(
            payload,
            json!({"id": "7", "error": "relay stuck", "kind": "action"})
        );

        let parsed: ActionResult = from_payload(&to_payload(&result)).unwrap();
        match parsed.into_outcome() {
            Err(WotError::Action { message }) => assert_eq!(message, "relay stuck"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn should_treat_missing_result_as_null() {
        let parsed: ActionResult = from_payload(br#"{"id":"1"}"#).unwrap();
        assert_eq!(parsed.into_outcome().unwrap(), Value::Null);
    }

    #[test]
    fn should_acknowledge_write_with_bare_id() {
        let result = WriteResult::from_outcome("9".to_string(), Ok(()));
        let payload: Value = serde_json::from_slice(&to_payload(&result)).unwrap();
        assert_eq!(payload, json!({"id": "9"}));
        let parsed: WriteResult = from_payload(&to_payload(&result)).unwrap();
        assert!(parsed.into_outcome().is_ok());
    }

    #[test]
    fn should_carry_write_rejection_back_as_validation_error() {
        let rejected = WotError::from_remote(ErrorKind::Validation, "/: expected boolean");
        let result = WriteResult::from_outcome("9".to_string(), Err(rejected));
        let payload: Value = serde_json::from_slice(&to_payload(&result)).unwrap();
        assert_eq!(payload["id"], "9");
        assert_eq!(payload["kind"], "validation");

        let parsed: WriteResult = from_payload(&to_payload(&result)).unwrap();
        assert!(matches!(parsed.into_outcome(), Err(WotError::Validation(_))));
    }

    #[test]
    fn should_wrap_written_value_with_correlation_id() {
        let request = WriteRequest::new(json!(25));
        let payload: Value = serde_json::from_slice(&to_payload(&request)).unwrap();
        assert_eq!(payload["value"], json!(25));
        assert_eq!(payload["id"], json!(request.id));
        assert_ne!(request.id, WriteRequest::new(json!(25)).id);
    }

    #[test]
    fn should_reject_malformed_envelope() {
        let err = from_payload::<ActionRequest>(b"not json").unwrap_err();
        assert!(matches!(err, MqttError::PayloadParse(_)));
    }
}
