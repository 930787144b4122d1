//! Action invocation endpoint.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde_json::Value;
use wothub_domain::affordance::AffordanceKind;

use super::{accepted_media_type, content_response, request_media_type};
use crate::error::ApiError;
use crate::state::HttpState;

/// `POST /things/{slug}/actions/{name}`
///
/// An empty body invokes the action with `null`. The output is encoded like
/// the input unless `Accept` names another media type.
pub async fn invoke(
    State(state): State<HttpState>,
    Path((slug, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let thing = state.routes.resolve(&slug, AffordanceKind::Action, &name)?;
    let request_type = request_media_type(&headers);
    let input = if body.is_empty() {
        Value::Null
    } else {
        state.codecs.decode(&request_type, &body)?
    };
    let output = state.handler.invoke_action(&thing, &name, input).await?;
    let content = state
        .codecs
        .encode(&accepted_media_type(&headers, &request_type), &output)?;
    Ok(content_response(&content))
}
