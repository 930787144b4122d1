//! Shared state for axum handlers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use wothub_app::codec::CodecRegistry;
use wothub_app::ports::InteractionHandler;
use wothub_domain::affordance::AffordanceKind;
use wothub_domain::error::NotFoundError;
use wothub_domain::id::ThingId;

/// What is reachable under one `/things/{slug}` prefix.
#[derive(Debug, Clone, Default)]
pub(crate) struct ThingRoute {
    pub thing: Option<ThingId>,
    pub affordances: HashMap<String, AffordanceKind>,
}

/// Slug-addressed table of published affordances.
///
/// Shared between the server (which publishes) and the handlers (which
/// resolve incoming paths).
#[derive(Debug, Clone, Default)]
pub(crate) struct RouteTable(Arc<RwLock<HashMap<String, ThingRoute>>>);

impl RouteTable {
    pub fn insert(&self, slug: &str, thing: &ThingId, kind: AffordanceKind, name: &str) {
        let mut routes = self.0.write().unwrap_or_else(PoisonError::into_inner);
        let route = routes.entry(slug.to_string()).or_default();
        route.thing = Some(thing.clone());
        route.affordances.insert(name.to_string(), kind);
    }

    pub fn remove(&self, thing: &ThingId, name: &str) {
        let mut routes = self.0.write().unwrap_or_else(PoisonError::into_inner);
        routes.retain(|_, route| {
            if route.thing.as_ref() == Some(thing) {
                route.affordances.remove(name);
            }
            !route.affordances.is_empty()
        });
    }

    pub fn clear(&self) {
        self.0.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// The Thing published under `slug`.
    pub fn thing(&self, slug: &str) -> Result<ThingId, NotFoundError> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slug)
            .and_then(|route| route.thing.clone())
            .ok_or_else(|| NotFoundError {
                entity: "Thing",
                id: slug.to_string(),
            })
    }

    /// The Thing behind `slug`, provided `name` is published there as `kind`.
    pub fn resolve(&self, slug: &str, kind: AffordanceKind, name: &str) -> Result<ThingId, NotFoundError> {
        let routes = self.0.read().unwrap_or_else(PoisonError::into_inner);
        let route = routes.get(slug).ok_or_else(|| NotFoundError {
            entity: "Thing",
            id: slug.to_string(),
        })?;
        match (route.affordances.get(name), &route.thing) {
            (Some(published), Some(thing)) if *published == kind => Ok(thing.clone()),
            _ => Err(NotFoundError {
                entity: kind.entity_name(),
                id: name.to_string(),
            }),
        }
    }
}

/// Application state shared across all axum handlers.
#[derive(Clone)]
pub struct HttpState {
    pub(crate) handler: Arc<dyn InteractionHandler>,
    pub(crate) codecs: Arc<CodecRegistry>,
    pub(crate) routes: RouteTable,
    /// Flips to `true` when the server stops, ending open event streams.
    pub(crate) closing: watch::Receiver<bool>,
}

impl HttpState {
    pub(crate) fn new(
        handler: Arc<dyn InteractionHandler>,
        codecs: Arc<CodecRegistry>,
        routes: RouteTable,
        closing: watch::Receiver<bool>,
    ) -> Self {
        Self {
            handler,
            codecs,
            routes,
            closing,
        }
    }
}
