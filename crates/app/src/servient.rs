//! Servient: the runtime hosting exposed Things and consuming remote ones.
//!
//! The servient owns the registry of [`ExposedThing`]s, the running binding
//! servers, the available binding clients and the current description of
//! every Thing. Registry changes (bindings and Things coming and going) are
//! serialized by one async writer lock and are all-or-nothing: a failure
//! rolls back whatever was already published.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, mpsc};
use wothub_domain::affordance::Affordance;
use wothub_domain::description::ThingDescription;
use wothub_domain::error::{BindingError, NotFoundError, ValidationError, WotError};
use wothub_domain::event::{ServientEvent, ServientEventKind};
use wothub_domain::form::{BindingKind, Form};
use wothub_domain::id::{SubscriptionId, ThingId};
use wothub_domain::notification::Notification;
use wothub_domain::thing::Thing;

use crate::codec::CodecRegistry;
use crate::consumed::{ClientMap, ConsumedThing, DEFAULT_TIMEOUT};
use crate::event_bus::InProcessEventBus;
use crate::exposed::ExposedThing;
use crate::hub::SubscriptionHub;
use crate::ports::{
    AdvertisedThing, BindingClient, BindingServer, DiscoveryAdvertiser, InteractionHandler,
};

type ThingTable = Arc<RwLock<HashMap<ThingId, Arc<ExposedThing>>>>;
type DescriptionTable = Arc<RwLock<HashMap<ThingId, Arc<ThingDescription>>>>;
/// affordance name → forms, for one Thing on one binding
type PublishedForms = HashMap<String, Vec<Form>>;

/// Mutable part of the servient, guarded by the writer lock.
#[derive(Default)]
struct Registry {
    /// Running servers, in the order they were added.
    servers: Vec<Arc<dyn BindingServer>>,
    forms: HashMap<ThingId, HashMap<BindingKind, PublishedForms>>,
}

impl Registry {
    fn describe(&self, thing: &Thing) -> ThingDescription {
        let published = self.forms.get(&thing.id);
        ThingDescription::generate(thing, |name| {
            let Some(published) = published else {
                return Vec::new();
            };
            self.servers
                .iter()
                .filter_map(|server| published.get(&server.kind()))
                .filter_map(|by_name| by_name.get(name))
                .flatten()
                .cloned()
                .collect()
        })
    }
}

struct Inner {
    codecs: Arc<CodecRegistry>,
    hub: Arc<SubscriptionHub>,
    things: ThingTable,
    descriptions: DescriptionTable,
    registry: Mutex<Registry>,
    clients: RwLock<ClientMap>,
    advertisers: RwLock<Vec<Arc<dyn DiscoveryAdvertiser>>>,
    events: InProcessEventBus,
    router: Arc<ThingRouter>,
    timeout: Duration,
}

/// Runtime hosting exposed Things on every running binding.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct Servient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Servient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Servient")
            .field("codecs", &self.inner.codecs)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

/// Step-by-step builder for [`Servient`].
#[derive(Debug)]
pub struct ServientBuilder {
    codecs: CodecRegistry,
    timeout: Duration,
    event_capacity: usize,
}

impl Default for ServientBuilder {
    fn default() -> Self {
        Self {
            codecs: CodecRegistry::default(),
            timeout: DEFAULT_TIMEOUT,
            event_capacity: 256,
        }
    }
}

impl ServientBuilder {
    /// Replace the codec registry (the default holds JSON and plain text).
    #[must_use]
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    /// Timeout applied to consumed Things and remote fetches.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Capacity of the lifecycle event channel.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn build(self) -> Servient {
        let codecs = Arc::new(self.codecs);
        let hub = Arc::new(SubscriptionHub::new(Arc::clone(&codecs)));
        let things = ThingTable::default();
        let descriptions = DescriptionTable::default();
        let router = Arc::new(ThingRouter {
            things: Arc::clone(&things),
            descriptions: Arc::clone(&descriptions),
            hub: Arc::clone(&hub),
        });
        Servient {
            inner: Arc::new(Inner {
                codecs,
                hub,
                things,
                descriptions,
                registry: Mutex::new(Registry::default()),
                clients: RwLock::new(ClientMap::new()),
                advertisers: RwLock::new(Vec::new()),
                events: InProcessEventBus::new(self.event_capacity),
                router,
                timeout: self.timeout,
            }),
        }
    }
}

impl Default for Servient {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Servient {
    #[must_use]
    pub fn builder() -> ServientBuilder {
        ServientBuilder::default()
    }

    /// Codecs shared by every binding of this servient.
    #[must_use]
    pub fn codecs(&self) -> Arc<CodecRegistry> {
        Arc::clone(&self.inner.codecs)
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<SubscriptionHub> {
        &self.inner.hub
    }

    /// Handler through which servers reach the registered Things.
    #[must_use]
    pub fn handler(&self) -> Arc<dyn InteractionHandler> {
        self.inner.router.clone()
    }

    /// Lifecycle events published after this call.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<ServientEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, kind: ServientEventKind) {
        self.inner.events.publish(ServientEvent::new(kind));
    }

    fn exposed_things(&self) -> Vec<Arc<ExposedThing>> {
        self.inner
            .things
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Regenerate the descriptions of `ids` from the registry.
    fn regenerate<'a>(&self, registry: &Registry, ids: impl IntoIterator<Item = &'a ThingId>) {
        let things = self.inner.things.read().unwrap_or_else(PoisonError::into_inner);
        let mut descriptions = self
            .inner
            .descriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut changed = Vec::new();
        for id in ids {
            if let Some(exposed) = things.get(id) {
                descriptions.insert(id.clone(), Arc::new(registry.describe(&exposed.thing())));
                changed.push(id.clone());
            }
        }
        drop(descriptions);
        drop(things);
        for thing_id in changed {
            self.emit(ServientEventKind::DescriptionChanged { thing_id });
        }
    }

    fn directory(&self) -> Vec<AdvertisedThing> {
        let mut entries: Vec<AdvertisedThing> = self
            .inner
            .descriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|description| AdvertisedThing {
                id: description.id.clone(),
                title: description.title.clone(),
                forms: description.all_forms().map(|(_, form)| form.clone()).collect(),
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// Feed the current directory to every advertiser.
    ///
    /// Takes the registry so it only runs under the writer lock: advertisers
    /// then see directories in the order the changes were made.
    async fn advertise(&self, _registry: &Registry) {
        let advertisers = self
            .inner
            .advertisers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if advertisers.is_empty() {
            return;
        }
        let directory = self.directory();
        for advertiser in advertisers {
            if let Err(error) = advertiser.advertise(&directory).await {
                tracing::warn!(%error, "discovery advertiser failed");
            }
        }
    }

    /// Publish every affordance of `thing` on `server`.
    ///
    /// On failure, whatever was published is unpublished again.
    async fn publish_thing(
        server: &Arc<dyn BindingServer>,
        thing: &Thing,
    ) -> Result<PublishedForms, WotError> {
        let mut published = PublishedForms::new();
        for (name, _) in thing.affordances() {
            match server.publish(thing, name).await {
                Ok(forms) => {
                    published.insert(name.to_string(), forms);
                }
                Err(error) => {
                    Self::unpublish_thing(server, &thing.id, published.keys()).await;
                    return Err(BindingError::Publish {
                        kind: server.kind().to_string(),
                        affordance: name.to_string(),
                        source: Box::new(error),
                    }
                    .into());
                }
            }
        }
        Ok(published)
    }

    async fn unpublish_thing<'a>(
        server: &Arc<dyn BindingServer>,
        thing: &ThingId,
        names: impl IntoIterator<Item = &'a String>,
    ) {
        for name in names {
            if let Err(error) = server.unpublish(thing, name).await {
                tracing::warn!(binding = %server.kind(), %thing, affordance = %name, %error, "failed to unpublish");
            }
        }
    }

    /// Start `server`, publish every registered Thing on it and regenerate
    /// the descriptions.
    ///
    /// # Errors
    ///
    /// Returns a [`BindingError`] when a server of the same kind is already
    /// running, when the server fails to start, or when publishing fails.
    /// The registry is left unchanged in every case.
    #[tracing::instrument(skip(self, server), fields(binding = %server.kind()))]
    pub async fn add_binding(&self, server: Arc<dyn BindingServer>) -> Result<(), WotError> {
        let kind = server.kind();
        let mut registry = self.inner.registry.lock().await;
        if registry.servers.iter().any(|running| running.kind() == kind) {
            return Err(BindingError::AlreadyRunning {
                kind: kind.to_string(),
            }
            .into());
        }

        server
            .start(self.handler())
            .await
            .map_err(|error| BindingError::Start {
                kind: kind.to_string(),
                source: Box::new(error),
            })?;

        let things = self.exposed_things();
        let mut staged: Vec<(ThingId, PublishedForms)> = Vec::with_capacity(things.len());
        for exposed in &things {
            match Self::publish_thing(&server, &exposed.thing()).await {
                Ok(published) => staged.push((exposed.id().clone(), published)),
                Err(error) => {
                    for (id, published) in &staged {
                        Self::unpublish_thing(&server, id, published.keys()).await;
                    }
                    if let Err(stop_error) = server.stop().await {
                        tracing::warn!(error = %stop_error, "failed to stop binding after rollback");
                    }
                    return Err(error);
                }
            }
        }

        for (id, published) in staged {
            registry
                .forms
                .entry(id)
                .or_default()
                .insert(kind.clone(), published);
        }
        registry.servers.push(server);
        let ids: Vec<ThingId> = things.iter().map(|exposed| exposed.id().clone()).collect();
        self.regenerate(&registry, &ids);

        tracing::info!(things = ids.len(), "binding added");
        self.emit(ServientEventKind::BindingAdded { binding: kind });
        self.advertise(&registry).await;
        Ok(())
    }

    /// Stop the server of `kind`, unpublish its forms and regenerate the
    /// descriptions.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] when no such binding runs, or a
    /// [`BindingError`] when the server fails to stop, in which case the
    /// binding stays registered.
    #[tracing::instrument(skip(self))]
    pub async fn remove_binding(&self, kind: &BindingKind) -> Result<(), WotError> {
        let mut registry = self.inner.registry.lock().await;
        let position = registry
            .servers
            .iter()
            .position(|server| &server.kind() == kind)
            .ok_or_else(|| NotFoundError {
                entity: "Binding",
                id: kind.to_string(),
            })?;
        let server = Arc::clone(&registry.servers[position]);

        server.stop().await.map_err(|error| BindingError::Stop {
            kind: kind.to_string(),
            source: Box::new(error),
        })?;

        let mut ids = Vec::new();
        for (id, by_binding) in &mut registry.forms {
            if let Some(published) = by_binding.remove(kind) {
                Self::unpublish_thing(&server, id, published.keys()).await;
                ids.push(id.clone());
            }
        }
        registry.servers.remove(position);
        self.regenerate(&registry, &ids);

        tracing::info!(things = ids.len(), "binding removed");
        self.emit(ServientEventKind::BindingRemoved {
            binding: kind.clone(),
        });
        self.advertise(&registry).await;
        Ok(())
    }

    /// Kinds of the running servers, in the order they were added.
    pub async fn bindings(&self) -> Vec<BindingKind> {
        self.inner
            .registry
            .lock()
            .await
            .servers
            .iter()
            .map(|server| server.kind())
            .collect()
    }

    /// Make `client` available to consumed Things, replacing any client of
    /// the same kind.
    pub fn add_client(&self, client: Arc<dyn BindingClient>) {
        let kind = client.kind();
        tracing::debug!(binding = %kind, "client added");
        self.inner
            .clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, client);
    }

    /// Register a discovery advertiser and feed it the current directory.
    pub async fn add_advertiser(&self, advertiser: Arc<dyn DiscoveryAdvertiser>) {
        let _registry = self.inner.registry.lock().await;
        let directory = self.directory();
        if let Err(error) = advertiser.advertise(&directory).await {
            tracing::warn!(%error, "discovery advertiser failed");
        }
        self.inner
            .advertisers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(advertiser);
    }

    /// Expose `thing` on every running server.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a Thing with the same id is already
    /// registered, or a [`BindingError`] when a server fails to publish it;
    /// in both cases nothing is registered.
    #[tracing::instrument(skip(self, thing), fields(thing = %thing.id))]
    pub async fn register_thing(&self, thing: Thing) -> Result<Arc<ExposedThing>, WotError> {
        let mut registry = self.inner.registry.lock().await;
        let id = thing.id.clone();
        let exposed = Arc::new(ExposedThing::new(thing, Arc::clone(&self.inner.hub)));
        {
            let mut things = self
                .inner
                .things
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if things.contains_key(&id) {
                return Err(ValidationError::DuplicateThing(id.to_string()).into());
            }
            things.insert(id.clone(), Arc::clone(&exposed));
        }

        let mut by_binding = HashMap::new();
        for server in &registry.servers {
            match Self::publish_thing(server, &exposed.thing()).await {
                Ok(published) => {
                    by_binding.insert(server.kind(), published);
                }
                Err(error) => {
                    for (kind, published) in &by_binding {
                        if let Some(server) = registry.servers.iter().find(|s| &s.kind() == kind) {
                            Self::unpublish_thing(server, &id, published.keys()).await;
                        }
                    }
                    self.inner
                        .things
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&id);
                    return Err(error);
                }
            }
        }
        registry.forms.insert(id.clone(), by_binding);
        self.regenerate(&registry, [&id]);

        tracing::info!("thing registered");
        self.emit(ServientEventKind::ThingRegistered { thing_id: id });
        self.advertise(&registry).await;
        Ok(exposed)
    }

    /// Withdraw a Thing from every server and cancel its subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for unknown Things.
    #[tracing::instrument(skip(self))]
    pub async fn unregister_thing(&self, id: &ThingId) -> Result<(), WotError> {
        let mut registry = self.inner.registry.lock().await;
        self.inner
            .things
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .ok_or_else(|| NotFoundError {
                entity: "Thing",
                id: id.to_string(),
            })?;

        if let Some(by_binding) = registry.forms.remove(id) {
            for server in &registry.servers {
                if let Some(published) = by_binding.get(&server.kind()) {
                    Self::unpublish_thing(server, id, published.keys()).await;
                }
            }
        }
        self.inner
            .descriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        let cancelled = self.inner.hub.cancel_thing(id);

        tracing::info!(cancelled, "thing unregistered");
        self.emit(ServientEventKind::ThingUnregistered {
            thing_id: id.clone(),
        });
        self.advertise(&registry).await;
        Ok(())
    }

    /// Add an affordance to a registered Thing and publish it on every
    /// running server.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for unknown Things, a validation error
    /// when the affordance cannot be added, or a [`BindingError`] when a
    /// server fails to publish it. The Thing is left unchanged on failure.
    #[tracing::instrument(skip(self, affordance, initial_value))]
    pub async fn add_affordance(
        &self,
        id: &ThingId,
        name: &str,
        affordance: Affordance,
        initial_value: Option<Value>,
    ) -> Result<(), WotError> {
        let mut registry = self.inner.registry.lock().await;
        let exposed = self.exposed_thing(id)?;
        exposed.add_affordance(name, affordance, initial_value)?;
        let thing = exposed.thing();

        let mut published: Vec<(BindingKind, Vec<Form>)> = Vec::new();
        for server in &registry.servers {
            match server.publish(&thing, name).await {
                Ok(forms) => published.push((server.kind(), forms)),
                Err(error) => {
                    for (kind, _) in &published {
                        if let Some(server) = registry.servers.iter().find(|s| &s.kind() == kind)
                            && let Err(error) = server.unpublish(id, name).await
                        {
                            tracing::warn!(binding = %kind, %error, "failed to unpublish");
                        }
                    }
                    exposed.remove_affordance(name)?;
                    return Err(BindingError::Publish {
                        kind: server.kind().to_string(),
                        affordance: name.to_string(),
                        source: Box::new(error),
                    }
                    .into());
                }
            }
        }

        let by_binding = registry.forms.entry(id.clone()).or_default();
        for (kind, forms) in published {
            by_binding
                .entry(kind)
                .or_default()
                .insert(name.to_string(), forms);
        }
        self.regenerate(&registry, [id]);
        tracing::info!("affordance added");
        self.advertise(&registry).await;
        Ok(())
    }

    /// Withdraw an affordance of a registered Thing from every server and
    /// cancel its subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for unknown Things or affordances.
    #[tracing::instrument(skip(self))]
    pub async fn remove_affordance(&self, id: &ThingId, name: &str) -> Result<(), WotError> {
        let mut registry = self.inner.registry.lock().await;
        let exposed = self.exposed_thing(id)?;
        if exposed.thing().affordance(name).is_none() {
            return Err(NotFoundError {
                entity: "Affordance",
                id: name.to_string(),
            }
            .into());
        }

        let servers = registry.servers.clone();
        if let Some(by_binding) = registry.forms.get_mut(id) {
            for server in &servers {
                let published = by_binding
                    .get_mut(&server.kind())
                    .and_then(|by_name| by_name.remove(name));
                if published.is_some()
                    && let Err(error) = server.unpublish(id, name).await
                {
                    tracing::warn!(binding = %server.kind(), %error, "failed to unpublish");
                }
            }
        }
        exposed.remove_affordance(name)?;
        self.regenerate(&registry, [id]);
        tracing::info!("affordance removed");
        self.advertise(&registry).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for unknown Things.
    pub fn exposed_thing(&self, id: &ThingId) -> Result<Arc<ExposedThing>, WotError> {
        self.inner.router.exposed(id)
    }

    /// Current description snapshot of a local Thing.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for unknown Things.
    pub fn thing_description(&self, id: &ThingId) -> Result<Arc<ThingDescription>, WotError> {
        self.inner.router.thing_description(id)
    }

    /// Description snapshots of every local Thing, ordered by id.
    #[must_use]
    pub fn thing_descriptions(&self) -> Vec<Arc<ThingDescription>> {
        self.inner.router.thing_descriptions()
    }

    /// Build a consumer for `description` over the clients available now.
    pub fn consume(&self, description: impl Into<Arc<ThingDescription>>) -> ConsumedThing {
        let clients = self
            .inner
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        ConsumedThing::new(description.into(), clients).with_timeout(self.inner.timeout)
    }

    /// Retrieve a remote description through the client matching the URL
    /// scheme.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::Protocol`] for URLs without a scheme,
    /// [`WotError::NoUsableBinding`] when no client handles the scheme,
    /// [`WotError::Timeout`], or the client's error.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<ThingDescription, WotError> {
        let kind = BindingKind::from_href(url)
            .ok_or_else(|| WotError::protocol(format!("missing scheme in {url}")))?;
        let client = self
            .inner
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .ok_or_else(|| WotError::NoUsableBinding {
                affordance: url.to_string(),
            })?;
        tokio::time::timeout(self.inner.timeout, client.fetch_description(url))
            .await
            .map_err(|_| WotError::Timeout)?
    }

    /// Stop every server (newest first) and cancel every subscription.
    ///
    /// Things stay registered, with descriptions that carry no forms.
    pub async fn shutdown(&self) {
        let mut registry = self.inner.registry.lock().await;
        let servers: Vec<Arc<dyn BindingServer>> = registry.servers.drain(..).rev().collect();
        for server in &servers {
            if let Err(error) = server.stop().await {
                tracing::warn!(binding = %server.kind(), %error, "failed to stop binding");
            }
        }
        registry.forms.clear();
        let ids: Vec<ThingId> = self.exposed_things().iter().map(|e| e.id().clone()).collect();
        for id in &ids {
            self.inner.hub.cancel_thing(id);
        }
        self.regenerate(&registry, &ids);
        self.advertise(&registry).await;
        drop(registry);

        for server in servers {
            self.emit(ServientEventKind::BindingRemoved {
                binding: server.kind(),
            });
        }
        tracing::info!("servient shut down");
    }
}

/// [`InteractionHandler`] routing inbound requests to the registered Things.
struct ThingRouter {
    things: ThingTable,
    descriptions: DescriptionTable,
    hub: Arc<SubscriptionHub>,
}

impl ThingRouter {
    fn exposed(&self, id: &ThingId) -> Result<Arc<ExposedThing>, WotError> {
        self.things
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| {
                NotFoundError {
                    entity: "Thing",
                    id: id.to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl InteractionHandler for ThingRouter {
    async fn read_property(&self, thing: &ThingId, name: &str) -> Result<Value, WotError> {
        self.exposed(thing)?.read_property(name)
    }

    async fn write_property(
        &self,
        thing: &ThingId,
        name: &str,
        value: Value,
    ) -> Result<(), WotError> {
        self.exposed(thing)?.write_property(name, value)
    }

    async fn invoke_action(
        &self,
        thing: &ThingId,
        name: &str,
        input: Value,
    ) -> Result<Value, WotError> {
        let exposed = self.exposed(thing)?;
        exposed.invoke_action(name, input).await
    }

    fn subscribe(
        &self,
        thing: &ThingId,
        name: &str,
        content_type: &str,
        sink: mpsc::UnboundedSender<Notification>,
    ) -> Result<SubscriptionId, WotError> {
        self.exposed(thing)?.subscribe(name, content_type, sink)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), WotError> {
        self.hub.unsubscribe(id)
    }

    fn thing_description(&self, thing: &ThingId) -> Result<Arc<ThingDescription>, WotError> {
        self.descriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(thing)
            .cloned()
            .ok_or_else(|| {
                NotFoundError {
                    entity: "Thing",
                    id: thing.to_string(),
                }
                .into()
            })
    }

    fn thing_descriptions(&self) -> Vec<Arc<ThingDescription>> {
        let mut descriptions: Vec<Arc<ThingDescription>> = self
            .descriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        descriptions.sort_by(|a, b| a.id.cmp(&b.id));
        descriptions
    }
}
