//! Server-Sent Events streams for observed properties and events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use wothub_app::codec::normalize_media_type;
use wothub_app::ports::InteractionHandler;
use wothub_domain::affordance::AffordanceKind;
use wothub_domain::id::{SubscriptionId, ThingId};
use wothub_domain::notification::Notification;

use crate::error::ApiError;
use crate::state::HttpState;

/// Query parameters of the streaming endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    /// Media type notifications are encoded with; JSON when absent.
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
}

/// Unsubscribes when the response stream is dropped, i.e. when the client
/// disconnects or the server shuts down.
struct SubscriptionGuard {
    handler: Arc<dyn InteractionHandler>,
    id: SubscriptionId,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Err(error) = self.handler.unsubscribe(self.id) {
            tracing::debug!(subscription = %self.id, %error, "subscription already gone");
        }
    }
}

/// `GET /things/{slug}/properties/{name}/observable`
pub async fn observe_property(
    State(state): State<HttpState>,
    Path((slug, name)): Path<(String, String)>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let thing = state.routes.resolve(&slug, AffordanceKind::Property, &name)?;
    open(&state, &thing, &name, &params)
}

/// `GET /things/{slug}/events/{name}`
pub async fn subscribe_event(
    State(state): State<HttpState>,
    Path((slug, name)): Path<(String, String)>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let thing = state.routes.resolve(&slug, AffordanceKind::Event, &name)?;
    open(&state, &thing, &name, &params)
}

fn open(
    state: &HttpState,
    thing: &ThingId,
    name: &str,
    params: &StreamParams,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, ApiError> {
    let media_type = normalize_media_type(params.content_type.as_deref().unwrap_or_default());
    let (tx, rx) = mpsc::unbounded_channel();
    let id = state.handler.subscribe(thing, name, &media_type, tx)?;
    tracing::debug!(%thing, affordance = name, subscription = %id, "event stream opened");

    let guard = SubscriptionGuard {
        handler: Arc::clone(&state.handler),
        id,
    };
    let mut closing = state.closing.clone();
    let closed = async move {
        // A dropped sender means the server is gone as well.
        let _ = closing.wait_for(|closed| *closed).await;
    };

    let events = UnboundedReceiverStream::new(rx)
        .filter_map(move |notification| {
            let event = to_event(&guard, &notification);
            futures::future::ready(event.map(Ok))
        })
        .take_until(closed);

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_event(guard: &SubscriptionGuard, notification: &Notification) -> Option<Event> {
    let data = String::from_utf8_lossy(notification.content.as_bytes());
    if data.contains('\r') {
        tracing::warn!(
            subscription = %guard.id,
            affordance = %notification.affordance,
            "dropping notification that cannot be framed as an event stream"
        );
        return None;
    }
    Some(
        Event::default()
            .event(notification.kind.to_string())
            .data(data),
    )
}
