//! HTTP error mapping, in both directions.
//!
//! The server renders a [`WotError`] as a status code and a JSON body
//! `{"error": message, "kind": kind}`; the client parses that body back
//! into the same variant.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use wothub_domain::error::{BindingError, ErrorKind, NotFoundError, ValidationError, WotError};

/// JSON error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

/// Maps [`WotError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(WotError);

impl From<WotError> for ApiError {
    fn from(err: WotError) -> Self {
        Self(err)
    }
}

impl From<NotFoundError> for ApiError {
    fn from(err: NotFoundError) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            WotError::Validation(
                ValidationError::DuplicateThing(_) | ValidationError::DuplicateSubscription(_),
            )
            | WotError::Binding(BindingError::AlreadyRunning { .. }) => StatusCode::CONFLICT,
            WotError::Validation(_) | WotError::Decode { .. } => StatusCode::BAD_REQUEST,
            WotError::NotFound(_) => StatusCode::NOT_FOUND,
            WotError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            WotError::NoUsableBinding { .. }
            | WotError::Connection { .. }
            | WotError::Timeout
            | WotError::Protocol { .. } => StatusCode::BAD_GATEWAY,
            WotError::Encode { .. } | WotError::Action { .. } | WotError::Binding(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, %status, "request failed");
        }
        let body = ErrorBody {
            error: self.0.wire_message(),
            kind: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}

/// Failures of the HTTP transport itself.
#[derive(Debug, thiserror::Error)]
pub enum HttpBindingError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http binding is not running")]
    NotRunning,

    #[error("failed to build http client")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("href {0:?} is not an http url")]
    InvalidHref(String),
}

impl HttpBindingError {
    pub(crate) fn request(url: &str, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.to_string(),
            source,
        }
    }
}

impl From<HttpBindingError> for WotError {
    fn from(err: HttpBindingError) -> Self {
        match &err {
            HttpBindingError::Request { source, .. } if source.is_timeout() => WotError::Timeout,
            HttpBindingError::Request { source, .. } if source.is_connect() => {
                WotError::connection(format!("{err}: {source}"))
            }
            HttpBindingError::Bind { source, .. } => WotError::connection(format!("{err}: {source}")),
            HttpBindingError::Client(_) => WotError::connection(&err),
            HttpBindingError::Request { source, .. } => {
                WotError::protocol(format!("{err}: {source}"))
            }
            HttpBindingError::NotRunning
            | HttpBindingError::Status { .. }
            | HttpBindingError::InvalidHref(_) => WotError::protocol(&err),
        }
    }
}

/// Rebuild the error a server reported in a non-success response.
pub(crate) fn from_response(status: u16, url: &str, body: &[u8]) -> WotError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(body) => WotError::from_remote(body.kind, body.error),
        Err(_) if status == StatusCode::NOT_FOUND.as_u16() => NotFoundError {
            entity: "Remote resource",
            id: url.to_string(),
        }
        .into(),
        Err(_) => HttpBindingError::Status {
            status,
            url: url.to_string(),
        }
        .into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: WotError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn should_map_taxonomy_to_status_codes() {
        assert_eq!(
            status_of(ValidationError::NotWritable("on".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                NotFoundError {
                    entity: "Thing",
                    id: "lamp".to_string()
                }
                .into()
            ),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ValidationError::DuplicateThing("lamp".to_string()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(WotError::UnsupportedMediaType {
                media_type: "image/png".to_string()
            }),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(status_of(WotError::action("boom")), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_of(WotError::Timeout), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn should_rebuild_action_error_from_body() {
        let body = serde_json::to_vec(&ErrorBody {
            error: "relay stuck".to_string(),
            kind: ErrorKind::Action,
        })
        .unwrap();
        let err = from_response(500, "http://hub/things/lamp/actions/toggle", &body);
        match err {
            WotError::Action { message } => assert_eq!(message, "relay stuck"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn should_fall_back_to_status_when_body_is_not_an_error() {
        let err = from_response(404, "http://hub/nowhere", b"<html>");
        assert!(matches!(err, WotError::NotFound(_)));
        let err = from_response(503, "http://hub/busy", b"");
        assert!(matches!(err, WotError::Protocol { .. }));
    }
}
