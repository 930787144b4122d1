use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use wothub_app::codec::CodecRegistry;
use wothub_app::ports::{BindingServer, InteractionHandler};
use wothub_domain::error::{NotFoundError, WotError};
use wothub_domain::form::{BindingKind, DEFAULT_CONTENT_TYPE, Form};
use wothub_domain::id::ThingId;
use wothub_domain::thing::Thing;

use super::error::LoopbackError;
use super::network::{Address, LoopbackNetwork, Node};

/// Binding kind used when none is configured.
pub const DEFAULT_KIND: &str = "loopback";

/// Server side of the loopback binding.
///
/// Attaches a node to a [`LoopbackNetwork`] while running. Several servers
/// with distinct kinds may share one network, which is how two bindings are
/// exercised side by side without sockets.
pub struct LoopbackServer {
    kind: BindingKind,
    node: String,
    content_type: String,
    network: LoopbackNetwork,
    codecs: Arc<CodecRegistry>,
    running: Mutex<Option<Arc<Node>>>,
}

impl LoopbackServer {
    pub fn new(network: LoopbackNetwork, codecs: Arc<CodecRegistry>, node: impl Into<String>) -> Self {
        Self {
            kind: BindingKind::new(DEFAULT_KIND),
            node: node.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            network,
            codecs,
            running: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<BindingKind>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Media type advertised in published forms.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Where the description of `thing` can be fetched from.
    #[must_use]
    pub fn description_url(&self, thing: &Thing) -> String {
        format!("{}://{}/{}", self.kind, self.node, thing.slug())
    }

    fn current(&self) -> Result<Arc<Node>, LoopbackError> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| LoopbackError::NotRunning {
                kind: self.kind.to_string(),
            })
    }
}

#[async_trait]
impl BindingServer for LoopbackServer {
    fn kind(&self) -> BindingKind {
        self.kind.clone()
    }

    #[tracing::instrument(skip_all, fields(kind = %self.kind, node = %self.node))]
    async fn start(&self, handler: Arc<dyn InteractionHandler>) -> Result<(), WotError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(LoopbackError::AddressInUse {
                kind: self.kind.to_string(),
                node: self.node.clone(),
            }
            .into());
        }
        let node = Arc::new(Node::new(handler, Arc::clone(&self.codecs)));
        self.network.attach(&self.kind, &self.node, Arc::clone(&node))?;
        *running = Some(node);
        tracing::info!("loopback server attached");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(kind = %self.kind, node = %self.node))]
    async fn stop(&self) -> Result<(), WotError> {
        let node = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(node) = node {
            self.network.detach(&self.kind, &self.node);
            node.close();
            tracing::info!("loopback server detached");
        }
        Ok(())
    }

    async fn publish(&self, thing: &Thing, affordance: &str) -> Result<Vec<Form>, WotError> {
        let node = self.current()?;
        let found = thing.affordance(affordance).ok_or_else(|| NotFoundError {
            entity: "Affordance",
            id: affordance.to_string(),
        })?;
        let slug = thing.slug();
        node.add_route(&slug, &thing.id, found.kind(), affordance);
        let href = Address::href(&self.kind, &self.node, &slug, found.kind(), affordance);
        tracing::debug!(thing = %thing.id, affordance, %href, "published");
        Ok(vec![
            Form::new(self.kind.clone(), href, found.operations())
                .with_content_type(self.content_type.clone()),
        ])
    }

    async fn unpublish(&self, thing: &ThingId, affordance: &str) -> Result<(), WotError> {
        if let Ok(node) = self.current() {
            node.remove_route(thing, affordance);
        }
        Ok(())
    }
}

impl std::fmt::Debug for LoopbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackServer")
            .field("kind", &self.kind)
            .field("node", &self.node)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}
