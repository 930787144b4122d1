//! The in-process "wire": nodes attached by running servers, looked up by
//! clients from the host part of a loopback href.
//!
//! Payloads still cross the network as encoded bytes, so the codec path is
//! the same as on a real transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;
use wothub_app::codec::CodecRegistry;
use wothub_app::ports::InteractionHandler;
use wothub_domain::affordance::AffordanceKind;
use wothub_domain::error::WotError;
use wothub_domain::form::BindingKind;
use wothub_domain::id::{SubscriptionId, ThingId};
use wothub_domain::notification::{Content, Notification};

use super::error::LoopbackError;

/// Parsed `{scheme}://{node}/{slug}[/{kind}/{name}]` href.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Address {
    pub node: String,
    pub slug: String,
    pub target: Option<(AffordanceKind, String)>,
}

impl Address {
    pub(crate) fn parse(href: &str) -> Result<Self, LoopbackError> {
        let invalid = || LoopbackError::InvalidHref {
            href: href.to_string(),
        };
        let (_, rest) = href.split_once("://").ok_or_else(invalid)?;
        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            [node, slug] if !node.is_empty() && !slug.is_empty() => Ok(Self {
                node: (*node).to_string(),
                slug: (*slug).to_string(),
                target: None,
            }),
            [node, slug, kind, name] if !node.is_empty() && !slug.is_empty() => {
                let kind = match *kind {
                    "property" => AffordanceKind::Property,
                    "action" => AffordanceKind::Action,
                    "event" => AffordanceKind::Event,
                    _ => return Err(invalid()),
                };
                Ok(Self {
                    node: (*node).to_string(),
                    slug: (*slug).to_string(),
                    target: Some((kind, (*name).to_string())),
                })
            }
            _ => Err(invalid()),
        }
    }

    pub(crate) fn href(scheme: &BindingKind, node: &str, slug: &str, kind: AffordanceKind, name: &str) -> String {
        format!("{scheme}://{node}/{slug}/{kind}/{name}")
    }
}

#[derive(Default)]
struct Route {
    thing: Option<ThingId>,
    affordances: HashMap<String, AffordanceKind>,
}

/// Server-side endpoint of one running loopback server.
pub(crate) struct Node {
    handler: Arc<dyn InteractionHandler>,
    codecs: Arc<CodecRegistry>,
    routes: RwLock<HashMap<String, Route>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl Node {
    pub(crate) fn new(handler: Arc<dyn InteractionHandler>, codecs: Arc<CodecRegistry>) -> Self {
        Self {
            handler,
            codecs,
            routes: RwLock::new(HashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add_route(&self, slug: &str, thing: &ThingId, kind: AffordanceKind, name: &str) {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let route = routes.entry(slug.to_string()).or_default();
        route.thing = Some(thing.clone());
        route.affordances.insert(name.to_string(), kind);
    }

    pub(crate) fn remove_route(&self, thing: &ThingId, name: &str) {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        routes.retain(|_, route| {
            if route.thing.as_ref() == Some(thing) {
                route.affordances.remove(name);
            }
            !route.affordances.is_empty()
        });
    }

    fn thing_of(&self, slug: &str, href: &str) -> Result<ThingId, LoopbackError> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slug)
            .and_then(|route| route.thing.clone())
            .ok_or_else(|| LoopbackError::UnknownRoute {
                href: href.to_string(),
            })
    }

    fn resolve(&self, address: &Address, expected: AffordanceKind, href: &str) -> Result<(ThingId, String), LoopbackError> {
        let unknown = || LoopbackError::UnknownRoute {
            href: href.to_string(),
        };
        let (kind, name) = address.target.as_ref().ok_or_else(unknown)?;
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let route = routes.get(&address.slug).ok_or_else(unknown)?;
        match (route.affordances.get(name), &route.thing) {
            (Some(published), Some(thing)) if *published == *kind && *kind == expected => {
                Ok((thing.clone(), name.clone()))
            }
            _ => Err(unknown()),
        }
    }

    fn decode(&self, content: &Content) -> Result<Value, WotError> {
        self.codecs.decode(&content.media_type, content.as_bytes())
    }

    pub(crate) async fn read(&self, address: &Address, href: &str, media_type: &str) -> Result<Content, WotError> {
        let (thing, name) = self.resolve(address, AffordanceKind::Property, href)?;
        let value = self.handler.read_property(&thing, &name).await?;
        self.codecs.encode(media_type, &value)
    }

    pub(crate) async fn write(&self, address: &Address, href: &str, content: &Content) -> Result<(), WotError> {
        let (thing, name) = self.resolve(address, AffordanceKind::Property, href)?;
        let value = self.decode(content)?;
        self.handler.write_property(&thing, &name, value).await
    }

    pub(crate) async fn invoke(&self, address: &Address, href: &str, content: &Content) -> Result<Content, WotError> {
        let (thing, name) = self.resolve(address, AffordanceKind::Action, href)?;
        let input = self.decode(content)?;
        let output = self.handler.invoke_action(&thing, &name, input).await?;
        self.codecs.encode(&content.media_type, &output)
    }

    pub(crate) fn subscribe(
        &self,
        address: &Address,
        href: &str,
        media_type: &str,
        sink: mpsc::UnboundedSender<Notification>,
    ) -> Result<SubscriptionId, WotError> {
        let expected = match address.target {
            Some((AffordanceKind::Event, _)) => AffordanceKind::Event,
            _ => AffordanceKind::Property,
        };
        let (thing, name) = self.resolve(address, expected, href)?;
        let id = self.handler.subscribe(&thing, &name, media_type, sink)?;
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
        Ok(id)
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        let mut tracked = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(position) = tracked.iter().position(|known| *known == id) {
            tracked.remove(position);
            if let Err(error) = self.handler.unsubscribe(id) {
                tracing::debug!(subscription = %id, %error, "subscription already gone");
            }
        }
    }

    /// Cancel every subscription taken through this node.
    pub(crate) fn close(&self) {
        let tracked = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for id in tracked {
            if let Err(error) = self.handler.unsubscribe(id) {
                tracing::debug!(subscription = %id, %error, "subscription already gone");
            }
        }
    }

    pub(crate) fn description(&self, address: &Address, href: &str) -> Result<Vec<u8>, WotError> {
        let thing = self.thing_of(&address.slug, href)?;
        let description = self.handler.thing_description(&thing)?;
        serde_json::to_vec(description.as_ref()).map_err(|source| WotError::Encode {
            media_type: "application/json".to_string(),
            source: Box::new(source),
        })
    }
}

/// Shared in-process network.
///
/// Servers attach a node under `(binding kind, node name)`; clients of the
/// same binding kind reach it through the host part of a form href.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    nodes: Arc<RwLock<HashMap<(BindingKind, String), Arc<Node>>>>,
}

impl std::fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = nodes
            .keys()
            .map(|(kind, node)| format!("{kind}://{node}"))
            .collect();
        names.sort();
        f.debug_struct("LoopbackNetwork").field("nodes", &names).finish()
    }
}

impl LoopbackNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&self, kind: &BindingKind, name: &str, node: Arc<Node>) -> Result<(), LoopbackError> {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let key = (kind.clone(), name.to_string());
        if nodes.contains_key(&key) {
            return Err(LoopbackError::AddressInUse {
                kind: kind.to_string(),
                node: name.to_string(),
            });
        }
        nodes.insert(key, node);
        Ok(())
    }

    pub(crate) fn detach(&self, kind: &BindingKind, name: &str) -> Option<Arc<Node>> {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(kind.clone(), name.to_string()))
    }

    pub(crate) fn node(&self, kind: &BindingKind, name: &str) -> Result<Arc<Node>, LoopbackError> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind.clone(), name.to_string()))
            .cloned()
            .ok_or_else(|| LoopbackError::UnknownNode {
                kind: kind.to_string(),
                node: name.to_string(),
            })
    }

    /// Whether a server of `kind` is attached as `name`.
    #[must_use]
    pub fn is_attached(&self, kind: &BindingKind, name: &str) -> bool {
        self.node(kind, name).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_affordance_address() {
        let address = Address::parse("loopback://gateway/lamp-1a2b3c4d/property/on").unwrap();
        assert_eq!(address.node, "gateway");
        assert_eq!(address.slug, "lamp-1a2b3c4d");
        assert_eq!(
            address.target,
            Some((AffordanceKind::Property, "on".to_string()))
        );
    }

    #[test]
    fn should_parse_description_address() {
        let address = Address::parse("loop-b://gateway/lamp").unwrap();
        assert_eq!(address.target, None);
    }

    #[test]
    fn should_reject_malformed_addresses() {
        assert!(Address::parse("gateway/lamp").is_err());
        assert!(Address::parse("loopback://gateway/lamp/widget/on").is_err());
        assert!(Address::parse("loopback://gateway").is_err());
    }

    #[test]
    fn should_build_href_that_parses_back() {
        let href = Address::href(
            &BindingKind::new("loopback"),
            "gateway",
            "thermo",
            AffordanceKind::Event,
            "overheat",
        );
        assert_eq!(href, "loopback://gateway/thermo/event/overheat");
        let address = Address::parse(&href).unwrap();
        assert_eq!(address.target, Some((AffordanceKind::Event, "overheat".to_string())));
    }
}
