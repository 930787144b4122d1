//! Axum router assembly.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::HttpState;

/// Build the top-level axum [`Router`].
///
/// Thing routes live under `/things`. Includes a [`TraceLayer`] that logs
/// each HTTP request/response at the `DEBUG` level.
pub fn build(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/things", crate::api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
