//! Thing-facing HTTP handlers.

#[allow(clippy::missing_errors_doc)]
pub mod actions;
#[allow(clippy::missing_errors_doc)]
pub mod properties;
#[allow(clippy::missing_errors_doc)]
pub mod sse;
#[allow(clippy::missing_errors_doc)]
pub mod things;

use axum::Router;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use wothub_app::codec::normalize_media_type;
use wothub_domain::notification::Content;

use crate::state::HttpState;

/// Build the `/things` sub-router.
pub fn routes() -> Router<HttpState> {
    Router::new()
        .route("/", get(things::list))
        .route("/{slug}", get(things::get))
        .route(
            "/{slug}/properties/{name}",
            get(properties::read).put(properties::write),
        )
        .route("/{slug}/properties/{name}/observable", get(sse::observe_property))
        .route("/{slug}/actions/{name}", post(actions::invoke))
        .route("/{slug}/events/{name}", get(sse::subscribe_event))
}

/// Media type of the request body; JSON when absent.
pub(crate) fn request_media_type(headers: &HeaderMap) -> String {
    normalize_media_type(
        headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default(),
    )
}

/// First media type named in `Accept`, or `fallback` for wildcards.
pub(crate) fn accepted_media_type(headers: &HeaderMap, fallback: &str) -> String {
    let accepted = headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(normalize_media_type);
    match accepted {
        Some(media_type) if !media_type.ends_with("/*") => media_type,
        _ => normalize_media_type(fallback),
    }
}

/// An encoded payload as a response body.
pub(crate) fn content_response(content: &Content) -> Response {
    (
        [(header::CONTENT_TYPE, content.media_type.clone())],
        content.as_bytes().to_vec(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn should_default_to_json_when_no_content_type() {
        assert_eq!(request_media_type(&HeaderMap::new()), "application/json");
    }

    #[test]
    fn should_strip_parameters_from_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("Text/Plain; charset=utf-8"));
        assert_eq!(request_media_type(&headers), "text/plain");
    }

    #[test]
    fn should_use_fallback_when_accept_is_wildcard() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        assert_eq!(accepted_media_type(&headers, "text/plain"), "text/plain");
        headers.insert(ACCEPT, HeaderValue::from_static("text/plain, application/json"));
        assert_eq!(accepted_media_type(&headers, "application/json"), "text/plain");
    }
}
