//! Property read and write endpoints.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use wothub_domain::affordance::AffordanceKind;
use wothub_domain::form::DEFAULT_CONTENT_TYPE;

use super::{accepted_media_type, content_response, request_media_type};
use crate::error::ApiError;
use crate::state::HttpState;

/// `GET /things/{slug}/properties/{name}`
///
/// Encoded with the first media type named in `Accept`.
pub async fn read(
    State(state): State<HttpState>,
    Path((slug, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let thing = state.routes.resolve(&slug, AffordanceKind::Property, &name)?;
    let media_type = accepted_media_type(&headers, DEFAULT_CONTENT_TYPE);
    let value = state.handler.read_property(&thing, &name).await?;
    let content = state.codecs.encode(&media_type, &value)?;
    Ok(content_response(&content))
}

/// `PUT /things/{slug}/properties/{name}`
///
/// Decoded according to `Content-Type`. Answers `204 No Content`.
pub async fn write(
    State(state): State<HttpState>,
    Path((slug, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let thing = state.routes.resolve(&slug, AffordanceKind::Property, &name)?;
    let value = state.codecs.decode(&request_media_type(&headers), &body)?;
    state.handler.write_property(&thing, &name, value).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
