//! Protocol binding ports.
//!
//! A binding adapter plays one or both roles:
//!
//! - **server** ([`BindingServer`]): exposes local Things on a transport and
//!   forwards inbound requests to an [`InteractionHandler`];
//! - **client** ([`BindingClient`]): performs interactions against a remote
//!   Thing through the [`Form`]s of its description.
//!
//! Adapters own their transport errors and convert them into [`WotError`]
//! before they cross these traits.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use wothub_domain::description::ThingDescription;
use wothub_domain::error::WotError;
use wothub_domain::form::{BindingKind, Form};
use wothub_domain::id::{SubscriptionId, ThingId};
use wothub_domain::notification::Notification;
use wothub_domain::thing::Thing;

/// Entry point of inbound interactions, implemented by the servient.
///
/// Server adapters translate their native requests into these calls and the
/// results (or errors) back into their native replies.
#[async_trait]
pub trait InteractionHandler: Send + Sync {
    async fn read_property(&self, thing: &ThingId, name: &str) -> Result<Value, WotError>;

    async fn write_property(
        &self,
        thing: &ThingId,
        name: &str,
        value: Value,
    ) -> Result<(), WotError>;

    async fn invoke_action(
        &self,
        thing: &ThingId,
        name: &str,
        input: Value,
    ) -> Result<Value, WotError>;

    /// Register `sink` for change notifications of a property or event.
    ///
    /// Notifications are encoded as `content_type`.
    ///
    /// # Errors
    ///
    /// Fails when the affordance does not exist, cannot be subscribed to, or
    /// `content_type` has no codec.
    fn subscribe(
        &self,
        thing: &ThingId,
        name: &str,
        content_type: &str,
        sink: mpsc::UnboundedSender<Notification>,
    ) -> Result<SubscriptionId, WotError>;

    /// # Errors
    ///
    /// Returns `NotFound` for unknown subscriptions.
    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), WotError>;

    /// Current description snapshot of a Thing.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown Things.
    fn thing_description(&self, thing: &ThingId) -> Result<Arc<ThingDescription>, WotError>;

    /// Description snapshots of every registered Thing.
    fn thing_descriptions(&self) -> Vec<Arc<ThingDescription>>;
}

/// Server role of a binding.
#[async_trait]
pub trait BindingServer: Send + Sync {
    /// The binding this server implements (`http`, `mqtt`, …).
    fn kind(&self) -> BindingKind;

    /// Begin accepting requests and route them to `handler`.
    async fn start(&self, handler: Arc<dyn InteractionHandler>) -> Result<(), WotError>;

    /// Stop accepting requests and release the transport.
    async fn stop(&self) -> Result<(), WotError>;

    /// Make `affordance` of `thing` reachable and return its concrete forms.
    async fn publish(&self, thing: &Thing, affordance: &str) -> Result<Vec<Form>, WotError>;

    /// Make `affordance` of `thing` unreachable.
    async fn unpublish(&self, thing: &ThingId, affordance: &str) -> Result<(), WotError>;
}

type CancelFn = Box<dyn FnOnce() + Send + Sync>;

/// Handle to a live client-side subscription.
///
/// Dropping the handle cancels the subscription.
pub struct ClientSubscription {
    id: SubscriptionId,
    cancel: Option<CancelFn>,
}

impl ClientSubscription {
    /// Wrap a subscription torn down by `cancel`.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id: SubscriptionId::new(),
            cancel: Some(Box::new(cancel)),
        }
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Tear the subscription down now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ClientSubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for ClientSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSubscription")
            .field("id", &self.id)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Client role of a binding.
///
/// Every failure surfaces as a [`WotError`]: `Connection`, `Timeout` or
/// `Protocol` for transport problems, or the error the remote side reported.
#[async_trait]
pub trait BindingClient: Send + Sync {
    fn kind(&self) -> BindingKind;

    async fn read_property(&self, form: &Form) -> Result<Value, WotError>;

    async fn write_property(&self, form: &Form, value: Value) -> Result<(), WotError>;

    async fn invoke_action(&self, form: &Form, input: Value) -> Result<Value, WotError>;

    /// Forward every value published at `form` into `sink` until the returned
    /// handle is cancelled or `sink` is closed.
    async fn subscribe(
        &self,
        form: &Form,
        sink: mpsc::UnboundedSender<Value>,
    ) -> Result<ClientSubscription, WotError>;

    async fn unsubscribe(&self, subscription: ClientSubscription) -> Result<(), WotError> {
        subscription.cancel();
        Ok(())
    }

    /// Retrieve a Thing Description published at `url`.
    ///
    /// Bindings without a description endpoint keep the default.
    async fn fetch_description(&self, url: &str) -> Result<ThingDescription, WotError> {
        Err(WotError::protocol(format!(
            "{} binding cannot fetch descriptions ({url})",
            self.kind()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn should_cancel_once_when_dropped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = ClientSubscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(subscription);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn should_not_cancel_twice_when_cancelled_explicitly() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = ClientSubscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        subscription.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
