//! Consumed Things: the remote side of a Thing, driven through its
//! description.
//!
//! A [`ConsumedThing`] never talks to a transport directly: for every
//! interaction it picks a [`Form`] of the description with a
//! [`FormSelector`], then hands the form to the local client of that binding.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use wothub_domain::affordance::AffordanceKind;
use wothub_domain::description::ThingDescription;
use wothub_domain::error::{NotFoundError, ValidationError, WotError};
use wothub_domain::form::{BindingKind, Form, Operation};
use wothub_domain::id::{SubscriptionId, ThingId};

use crate::ports::{BindingClient, ClientSubscription};

/// Default bound on every client call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Clients available to a consumer, keyed by binding.
pub type ClientMap = HashMap<BindingKind, Arc<dyn BindingClient>>;

/// Policy choosing which form serves an interaction.
pub trait FormSelector: Send + Sync {
    /// Pick one of `forms` (in description order) for `operation`, among
    /// those whose binding satisfies `has_client`.
    fn select<'a>(
        &self,
        forms: &'a [Form],
        operation: Operation,
        has_client: &dyn Fn(&BindingKind) -> bool,
    ) -> Option<&'a Form>;
}

/// First form, in description order, that a local client can serve.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstAvailable;

impl FormSelector for FirstAvailable {
    fn select<'a>(
        &self,
        forms: &'a [Form],
        operation: Operation,
        has_client: &dyn Fn(&BindingKind) -> bool,
    ) -> Option<&'a Form> {
        forms
            .iter()
            .find(|form| form.allows(operation) && has_client(&form.binding))
    }
}

/// Try bindings in the given order, then fall back to [`FirstAvailable`].
#[derive(Debug, Clone)]
pub struct PreferBindings(pub Vec<BindingKind>);

impl FormSelector for PreferBindings {
    fn select<'a>(
        &self,
        forms: &'a [Form],
        operation: Operation,
        has_client: &dyn Fn(&BindingKind) -> bool,
    ) -> Option<&'a Form> {
        self.0
            .iter()
            .filter(|kind| has_client(kind))
            .find_map(|kind| {
                forms
                    .iter()
                    .find(|form| &form.binding == kind && form.allows(operation))
            })
            .or_else(|| FirstAvailable.select(forms, operation, has_client))
    }
}

struct ActiveSubscription {
    handle: ClientSubscription,
    client: Arc<dyn BindingClient>,
    forward: JoinHandle<()>,
}

/// A name is reserved while its remote subscription is being set up, so the
/// lock is never held across the client call.
enum Entry {
    Pending(SubscriptionId),
    Active(ActiveSubscription),
}

/// Remote Thing consumed through its description.
pub struct ConsumedThing {
    description: Arc<ThingDescription>,
    clients: ClientMap,
    selector: Arc<dyn FormSelector>,
    timeout: Duration,
    subscriptions: Mutex<HashMap<String, Entry>>,
}

impl std::fmt::Debug for ConsumedThing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut bindings: Vec<&str> = self.clients.keys().map(BindingKind::as_str).collect();
        bindings.sort_unstable();
        f.debug_struct("ConsumedThing")
            .field("id", &self.description.id)
            .field("clients", &bindings)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ConsumedThing {
    /// Consume `description` through `clients`, using the default policy
    /// and timeout.
    #[must_use]
    pub fn new(description: Arc<ThingDescription>, clients: ClientMap) -> Self {
        Self {
            description,
            clients,
            selector: Arc::new(FirstAvailable),
            timeout: DEFAULT_TIMEOUT,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_selector(mut self, selector: impl FormSelector + 'static) -> Self {
        self.selector = Arc::new(selector);
        self
    }

    #[must_use]
    pub fn id(&self) -> &ThingId {
        &self.description.id
    }

    #[must_use]
    pub fn description(&self) -> &Arc<ThingDescription> {
        &self.description
    }

    fn resolve(
        &self,
        name: &str,
        expected: AffordanceKind,
        operation: Operation,
    ) -> Result<(&Form, Arc<dyn BindingClient>), WotError> {
        if self.description.kind_of(name) != Some(expected) {
            return Err(NotFoundError {
                entity: expected.entity_name(),
                id: name.to_string(),
            }
            .into());
        }
        let forms = self.description.forms(name).unwrap_or_default();
        let has_client = |kind: &BindingKind| self.clients.contains_key(kind);
        let form = self
            .selector
            .select(forms, operation, &has_client)
            .ok_or_else(|| WotError::NoUsableBinding {
                affordance: name.to_string(),
            })?;
        let client = self
            .clients
            .get(&form.binding)
            .cloned()
            .ok_or_else(|| WotError::NoUsableBinding {
                affordance: name.to_string(),
            })?;
        tracing::trace!(thing = %self.description.id, affordance = name, href = %form.href, "selected form");
        Ok((form, client))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, WotError>>,
    ) -> Result<T, WotError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| WotError::Timeout)?
    }

    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for names that are not properties,
    /// [`WotError::NoUsableBinding`] when no form can be served locally,
    /// [`WotError::Timeout`] past the timeout, or the client's error.
    #[tracing::instrument(skip(self), fields(thing = %self.description.id))]
    pub async fn read_property(&self, name: &str) -> Result<Value, WotError> {
        let (form, client) = self.resolve(name, AffordanceKind::Property, Operation::ReadProperty)?;
        self.bounded(client.read_property(form)).await
    }

    /// # Errors
    ///
    /// Same as [`read_property`](Self::read_property), plus the remote
    /// validation error for rejected values.
    #[tracing::instrument(skip(self, value), fields(thing = %self.description.id))]
    pub async fn write_property(&self, name: &str, value: Value) -> Result<(), WotError> {
        let (form, client) =
            self.resolve(name, AffordanceKind::Property, Operation::WriteProperty)?;
        self.bounded(client.write_property(form, value)).await
    }

    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for names that are not actions,
    /// [`WotError::NoUsableBinding`], [`WotError::Timeout`], or the remote
    /// error such as [`WotError::Action`].
    #[tracing::instrument(skip(self, input), fields(thing = %self.description.id))]
    pub async fn invoke_action(&self, name: &str, input: Value) -> Result<Value, WotError> {
        let (form, client) = self.resolve(name, AffordanceKind::Action, Operation::InvokeAction)?;
        self.bounded(client.invoke_action(form, input)).await
    }

    /// Call `on_change` with every new value of an observable property.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the property is not observable or
    /// already subscribed, plus every error of
    /// [`read_property`](Self::read_property).
    pub async fn subscribe_property<F>(&self, name: &str, on_change: F) -> Result<(), WotError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        if let Some(property) = self.description.properties.get(name)
            && !property.affordance.observable
        {
            return Err(ValidationError::NotObservable(name.to_string()).into());
        }
        self.subscribe(
            name,
            AffordanceKind::Property,
            Operation::ObserveProperty,
            on_change,
        )
        .await
    }

    /// Call `on_notify` with every emission of an event.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the event is already subscribed, plus
    /// the resolution and client errors.
    pub async fn subscribe_event<F>(&self, name: &str, on_notify: F) -> Result<(), WotError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.subscribe(name, AffordanceKind::Event, Operation::SubscribeEvent, on_notify)
            .await
    }

    #[tracing::instrument(skip(self, callback), fields(thing = %self.description.id))]
    async fn subscribe<F>(
        &self,
        name: &str,
        kind: AffordanceKind,
        operation: Operation,
        callback: F,
    ) -> Result<(), WotError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let (form, client) = self.resolve(name, kind, operation)?;
        let reservation = SubscriptionId::new();
        {
            let mut subscriptions = self.subscriptions.lock().await;
            if subscriptions.contains_key(name) {
                return Err(ValidationError::DuplicateSubscription(name.to_string()).into());
            }
            subscriptions.insert(name.to_string(), Entry::Pending(reservation));
        }

        let (sink, mut values) = mpsc::unbounded_channel();
        let outcome = self.bounded(client.subscribe(form, sink)).await;

        let mut subscriptions = self.subscriptions.lock().await;
        let reserved = matches!(subscriptions.get(name), Some(Entry::Pending(id)) if *id == reservation);
        let handle = match outcome {
            Ok(handle) => handle,
            Err(error) => {
                if reserved {
                    subscriptions.remove(name);
                }
                return Err(error);
            }
        };
        if !reserved {
            drop(subscriptions);
            let _ = tokio::time::timeout(self.timeout, client.unsubscribe(handle)).await;
            return Err(WotError::connection(format!(
                "subscription to {name} was released while being established"
            )));
        }

        let forward = tokio::spawn(async move {
            while let Some(value) = values.recv().await {
                callback(value);
            }
        });
        subscriptions.insert(
            name.to_string(),
            Entry::Active(ActiveSubscription {
                handle,
                client,
                forward,
            }),
        );
        tracing::debug!(affordance = name, binding = %form.binding, "subscribed");
        Ok(())
    }

    /// Whether a subscription to `name` is live.
    pub async fn is_subscribed(&self, name: &str) -> bool {
        matches!(
            self.subscriptions.lock().await.get(name),
            Some(Entry::Active(_))
        )
    }

    /// Cancel the subscription to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] when `name` is not subscribed, or
    /// its subscription is still being set up.
    pub async fn unsubscribe(&self, name: &str) -> Result<(), WotError> {
        let not_found = || NotFoundError {
            entity: "Subscription",
            id: name.to_string(),
        };
        let active = {
            let mut subscriptions = self.subscriptions.lock().await;
            match subscriptions.remove(name) {
                Some(Entry::Active(active)) => active,
                Some(pending) => {
                    subscriptions.insert(name.to_string(), pending);
                    return Err(not_found().into());
                }
                None => return Err(not_found().into()),
            }
        };
        Self::teardown(active, self.timeout).await
    }

    async fn teardown(active: ActiveSubscription, timeout: Duration) -> Result<(), WotError> {
        active.forward.abort();
        tokio::time::timeout(timeout, active.client.unsubscribe(active.handle))
            .await
            .map_err(|_| WotError::Timeout)?
    }

    /// Cancel every subscription of this consumer. Subscriptions still being
    /// set up are dropped as soon as they complete.
    pub async fn release(&self) {
        let drained: Vec<(String, Entry)> = self.subscriptions.lock().await.drain().collect();
        for (name, entry) in drained {
            let Entry::Active(active) = entry else {
                continue;
            };
            if let Err(error) = Self::teardown(active, self.timeout).await {
                tracing::warn!(thing = %self.description.id, affordance = %name, %error, "failed to unsubscribe on release");
            }
        }
    }
}

impl Drop for ConsumedThing {
    fn drop(&mut self) {
        for (_, entry) in self.subscriptions.get_mut().drain() {
            if let Entry::Active(active) = entry {
                active.forward.abort();
                drop(active.handle);
            }
        }
    }
}
