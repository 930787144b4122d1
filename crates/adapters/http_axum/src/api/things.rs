//! Thing Description endpoints.

use axum::Json;
use axum::extract::{Path, State};
use wothub_domain::description::ThingDescription;

use crate::error::ApiError;
use crate::state::HttpState;

/// `GET /things`
pub async fn list(State(state): State<HttpState>) -> Json<Vec<ThingDescription>> {
    let descriptions = state
        .handler
        .thing_descriptions()
        .iter()
        .map(|description| description.as_ref().clone())
        .collect();
    Json(descriptions)
}

/// `GET /things/{slug}`
pub async fn get(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
) -> Result<Json<ThingDescription>, ApiError> {
    let thing = state.routes.thing(&slug)?;
    let description = state.handler.thing_description(&thing)?;
    Ok(Json(description.as_ref().clone()))
}
