//! Exposed Things: the authoritative, local side of a Thing.
//!
//! An [`ExposedThing`] owns the current value of every property, the action
//! handlers and the event emission point. Every binding reaches it through
//! the servient, so there is exactly one copy of the state whatever the
//! number of transports.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use wothub_domain::affordance::{Affordance, AffordanceKind, PropertyAffordance};
use wothub_domain::error::{NotFoundError, ValidationError, WotError};
use wothub_domain::id::{SubscriptionId, ThingId};
use wothub_domain::notification::{Notification, NotificationKind};
use wothub_domain::thing::Thing;

use crate::hub::SubscriptionHub;

/// Boxed action handler.
pub type ActionHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, WotError>> + Send + Sync>;

type Slot = Arc<Mutex<Value>>;

/// Local Thing holding property values, action handlers and events.
///
/// The interaction model can grow or shrink while the Thing is exposed;
/// every operation works on the snapshot current when it starts.
pub struct ExposedThing {
    id: ThingId,
    thing: RwLock<Arc<Thing>>,
    values: RwLock<HashMap<String, Slot>>,
    handlers: RwLock<HashMap<String, ActionHandler>>,
    hub: Arc<SubscriptionHub>,
}

impl std::fmt::Debug for ExposedThing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExposedThing")
            .field("id", &self.id)
            .field("title", &self.thing().title)
            .finish_non_exhaustive()
    }
}

fn not_found(kind: AffordanceKind, name: &str) -> WotError {
    NotFoundError {
        entity: kind.entity_name(),
        id: name.to_string(),
    }
    .into()
}

impl ExposedThing {
    /// Create the runtime side of `thing`, seeding every property with its
    /// initial value.
    #[must_use]
    pub fn new(thing: Thing, hub: Arc<SubscriptionHub>) -> Self {
        let values = thing
            .affordances()
            .filter(|(_, affordance)| matches!(affordance, Affordance::Property(_)))
            .map(|(name, _)| (name.to_string(), Arc::new(Mutex::new(thing.initial_value(name)))))
            .collect();
        Self {
            id: thing.id.clone(),
            thing: RwLock::new(Arc::new(thing)),
            values: RwLock::new(values),
            handlers: RwLock::new(HashMap::new()),
            hub,
        }
    }

    #[must_use]
    pub fn id(&self) -> &ThingId {
        &self.id
    }

    /// Current interaction model.
    #[must_use]
    pub fn thing(&self) -> Arc<Thing> {
        Arc::clone(&self.thing.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn property(&self, name: &str) -> Result<(PropertyAffordance, Slot), WotError> {
        let thing = self.thing();
        let slot = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        match (thing.property(name), slot) {
            (Some(property), Some(slot)) => Ok((property.clone(), slot)),
            _ => Err(not_found(AffordanceKind::Property, name)),
        }
    }

    /// Add an affordance to the live Thing. Properties start with
    /// `initial_value`, or `null`.
    ///
    /// Bindings are not told: [`Servient::add_affordance`](crate::Servient::add_affordance)
    /// publishes the affordance and regenerates the description.
    pub(crate) fn add_affordance(
        &self,
        name: &str,
        affordance: Affordance,
        initial_value: Option<Value>,
    ) -> Result<(), WotError> {
        let mut current = self.thing.write().unwrap_or_else(PoisonError::into_inner);
        let mut thing = Thing::clone(&current);
        thing.add_affordance(name, affordance, initial_value)?;
        if thing.property(name).is_some() {
            self.values
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name.to_string(), Arc::new(Mutex::new(thing.initial_value(name))));
        }
        *current = Arc::new(thing);
        Ok(())
    }

    /// Remove an affordance from the live Thing, dropping its value or
    /// handler and closing the queues of its subscribers.
    pub(crate) fn remove_affordance(&self, name: &str) -> Result<Affordance, WotError> {
        let mut current = self.thing.write().unwrap_or_else(PoisonError::into_inner);
        let mut thing = Thing::clone(&current);
        let removed = thing.remove_affordance(name).ok_or_else(|| NotFoundError {
            entity: "Affordance",
            id: name.to_string(),
        })?;
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        *current = Arc::new(thing);
        drop(current);
        self.hub.cancel_affordance(&self.id, name);
        Ok(removed)
    }

    /// Current value of a property.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] when no such property exists.
    pub fn read_property(&self, name: &str) -> Result<Value, WotError> {
        let (_, value) = self.property(name)?;
        Ok(value.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// Write coming from a consumer. Read-only properties are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for unknown properties and
    /// [`WotError::Validation`] for read-only properties or values that do
    /// not match the schema.
    #[tracing::instrument(skip(self, value), fields(thing = %self.id))]
    pub fn write_property(&self, name: &str, value: Value) -> Result<(), WotError> {
        let (property, _) = self.property(name)?;
        if !property.writable {
            return Err(ValidationError::NotWritable(name.to_string()).into());
        }
        self.set_property(name, value)
    }

    /// Update a property from the application side, e.g. a new sensor
    /// reading. The writable flag does not apply here.
    ///
    /// The store is updated and observers are notified under the property
    /// lock, so every observer sees writes in commit order.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for unknown properties and
    /// [`WotError::Validation`] when the value does not match the schema.
    pub fn set_property(&self, name: &str, value: Value) -> Result<(), WotError> {
        let (property, slot) = self.property(name)?;
        property.schema.validate(&value).map_err(ValidationError::from)?;

        let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
        *current = value;
        if property.observable {
            self.hub
                .notify(&self.id, name, NotificationKind::PropertyChange, &current);
        }
        tracing::trace!(thing = %self.id, property = name, "property updated");
        Ok(())
    }

    /// Install the handler run when `name` is invoked, replacing any previous
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] when no such action exists.
    pub fn set_action_handler<F, Fut>(&self, name: &str, handler: F) -> Result<(), WotError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, WotError>> + Send + 'static,
    {
        if self.thing().action(name).is_none() {
            return Err(not_found(AffordanceKind::Action, name));
        }
        let handler: ActionHandler = Arc::new(move |input| handler(input).boxed());
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), handler);
        Ok(())
    }

    /// Run the action handler of `name` with `input`.
    ///
    /// The handler runs in its own task: a failure or a panic only fails
    /// this invocation.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for unknown actions,
    /// [`WotError::Validation`] when `input` does not match the input schema
    /// and [`WotError::Action`] when the handler is missing or fails.
    #[tracing::instrument(skip(self, input), fields(thing = %self.id))]
    pub async fn invoke_action(&self, name: &str, input: Value) -> Result<Value, WotError> {
        let thing = self.thing();
        let action = thing
            .action(name)
            .ok_or_else(|| not_found(AffordanceKind::Action, name))?;
        if let Some(schema) = &action.input {
            schema.validate(&input).map_err(ValidationError::from)?;
        }
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| WotError::action("no handler"))?;

        match tokio::spawn(handler(input)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(WotError::Action { message })) => {
                tracing::warn!(action = name, %message, "action handler failed");
                Err(WotError::Action { message })
            }
            Ok(Err(other)) => {
                tracing::warn!(action = name, error = %other, "action handler failed");
                Err(WotError::action(other.to_string()))
            }
            Err(join_error) => {
                let message = panic_message(join_error);
                tracing::error!(action = name, %message, "action handler panicked");
                Err(WotError::action(message))
            }
        }
    }

    /// Validate `payload` and push it to every subscriber of the event.
    ///
    /// Returns the number of subscribers reached.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for unknown events and
    /// [`WotError::Validation`] when `payload` does not match the event data
    /// schema.
    pub fn emit_event(&self, name: &str, payload: &Value) -> Result<usize, WotError> {
        let thing = self.thing();
        let event = thing
            .event(name)
            .ok_or_else(|| not_found(AffordanceKind::Event, name))?;
        if let Some(schema) = &event.data {
            schema.validate(payload).map_err(ValidationError::from)?;
        }
        let delivered = self
            .hub
            .notify(&self.id, name, NotificationKind::Event, payload);
        tracing::debug!(thing = %self.id, event = name, delivered, "event emitted");
        Ok(delivered)
    }

    /// Subscribe `sink` to an observable property or an event.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for unknown names, a validation error
    /// for non-observable properties and actions, and
    /// [`WotError::UnsupportedMediaType`] when `content_type` has no codec.
    pub fn subscribe(
        &self,
        name: &str,
        content_type: &str,
        sink: mpsc::UnboundedSender<Notification>,
    ) -> Result<SubscriptionId, WotError> {
        match self.thing().affordance(name) {
            None => Err(not_found(AffordanceKind::Property, name)),
            Some(Affordance::Action(_)) => {
                Err(ValidationError::NotSubscribable(name.to_string()).into())
            }
            Some(Affordance::Property(property)) if !property.observable => {
                Err(ValidationError::NotObservable(name.to_string()).into())
            }
            Some(_) => self.hub.subscribe(&self.id, name, content_type, sink),
        }
    }

    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for unknown subscriptions.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), WotError> {
        self.hub.unsubscribe(id)
    }
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return "action handler was cancelled".to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "action handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecRegistry;
    use serde_json::json;
    use wothub_domain::data_schema::DataSchema;

    fn hub() -> Arc<SubscriptionHub> {
        Arc::new(SubscriptionHub::new(Arc::new(CodecRegistry::default())))
    }

    fn lamp(hub: Arc<SubscriptionHub>) -> ExposedThing {
        let thing = Thing::builder("urn:dev:wot:lamp")
            .title("Lamp")
            .property_with_value(
                "on",
                Affordance::observable_property(DataSchema::boolean()),
                json!(false),
            )
            .property_with_value(
                "brightness",
                Affordance::property(DataSchema::integer().minimum(0.0).maximum(100.0)),
                json!(50),
            )
            .property_with_value(
                "temperature",
                Affordance::observable_property(DataSchema::number()).read_only(),
                json!(20),
            )
            .affordance(
                "fade",
                Affordance::action(Some(DataSchema::integer()), Some(DataSchema::integer())),
            )
            .affordance("overheating", Affordance::event(Some(DataSchema::number())))
            .build()
            .unwrap();
        ExposedThing::new(thing, hub)
    }

    #[test]
    fn should_read_initial_value() {
        let lamp = lamp(hub());
        assert_eq!(lamp.read_property("brightness").unwrap(), json!(50));
    }

    #[test]
    fn should_return_not_found_for_unknown_property() {
        let lamp = lamp(hub());
        let err = lamp.read_property("color").unwrap_err();
        assert!(matches!(err, WotError::NotFound(NotFoundError { entity: "Property", .. })));
    }

    #[test]
    fn should_store_valid_write() {
        let lamp = lamp(hub());
        lamp.write_property("brightness", json!(80)).unwrap();
        assert_eq!(lamp.read_property("brightness").unwrap(), json!(80));
    }

    #[test]
    fn should_reject_write_that_breaks_schema() {
        let lamp = lamp(hub());
        let err = lamp.write_property("brightness", json!(101)).unwrap_err();
        assert!(matches!(err, WotError::Validation(ValidationError::Schema(_))));
        assert_eq!(lamp.read_property("brightness").unwrap(), json!(50));
    }

    #[test]
    fn should_reject_remote_write_to_read_only_property() {
        let lamp = lamp(hub());
        let err = lamp.write_property("temperature", json!(30)).unwrap_err();
        assert!(matches!(err, WotError::Validation(ValidationError::NotWritable(_))));
        lamp.set_property("temperature", json!(30)).unwrap();
        assert_eq!(lamp.read_property("temperature").unwrap(), json!(30));
    }

    #[test]
    fn should_notify_observers_in_write_order() {
        let lamp = lamp(hub());
        let (tx, mut rx) = mpsc::unbounded_channel();
        lamp.subscribe("temperature", "application/json", tx).unwrap();

        for value in [21, 22, 23] {
            lamp.set_property("temperature", json!(value)).unwrap();
        }

        let received: Vec<Vec<u8>> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|n| n.content.as_bytes().to_vec())
            .collect();
        assert_eq!(received, vec![b"21".to_vec(), b"22".to_vec(), b"23".to_vec()]);
        assert_eq!(lamp.read_property("temperature").unwrap(), json!(23));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_deliver_concurrent_writes_in_commit_order() {
        const WRITERS: i64 = 8;
        const WRITES: i64 = 50;
        let lamp = Arc::new(lamp(hub()));
        let (first, mut first_rx) = mpsc::unbounded_channel();
        let (second, mut second_rx) = mpsc::unbounded_channel();
        lamp.subscribe("temperature", "application/json", first).unwrap();
        lamp.subscribe("temperature", "application/json", second).unwrap();

        let writers: Vec<_> = (0..WRITERS)
            .map(|writer| {
                let lamp = Arc::clone(&lamp);
                tokio::spawn(async move {
                    for step in 0..WRITES {
                        lamp.set_property("temperature", json!(writer * 1000 + step))
                            .unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let drain = |rx: &mut mpsc::UnboundedReceiver<Notification>| -> Vec<i64> {
            std::iter::from_fn(|| rx.try_recv().ok())
                .map(|n| serde_json::from_slice(n.content.as_bytes()).unwrap())
                .collect()
        };
        let seen = drain(&mut first_rx);
        assert_eq!(seen, drain(&mut second_rx));

        let mut sorted = seen.clone();
        sorted.sort_unstable();
        let mut expected: Vec<i64> = (0..WRITERS)
            .flat_map(|writer| (0..WRITES).map(move |step| writer * 1000 + step))
            .collect();
        expected.sort_unstable();
        assert_eq!(sorted, expected);

        for writer in 0..WRITERS {
            let own: Vec<i64> = seen.iter().copied().filter(|v| v / 1000 == writer).collect();
            assert!(own.windows(2).all(|pair| pair[0] < pair[1]));
        }
        assert_eq!(
            lamp.read_property("temperature").unwrap(),
            json!(*seen.last().unwrap())
        );
    }

    #[test]
    fn should_serve_affordance_added_while_exposed() {
        let lamp = lamp(hub());
        lamp.add_affordance(
            "color",
            Affordance::observable_property(DataSchema::string()),
            Some(json!("white")),
        )
        .unwrap();

        assert_eq!(lamp.read_property("color").unwrap(), json!("white"));
        lamp.write_property("color", json!("red")).unwrap();
        assert_eq!(lamp.read_property("color").unwrap(), json!("red"));
        assert!(lamp.thing().property("color").is_some());

        let err = lamp
            .add_affordance("on", Affordance::action(None, None), None)
            .unwrap_err();
        assert!(matches!(
            err,
            WotError::Validation(ValidationError::DuplicateAffordance(_))
        ));
    }

    #[test]
    fn should_close_subscriptions_of_removed_affordance() {
        let lamp = lamp(hub());
        let (tx, mut rx) = mpsc::unbounded_channel();
        lamp.subscribe("overheating", "application/json", tx).unwrap();
        lamp.set_action_handler("fade", |input| async move { Ok(input) })
            .unwrap();

        assert!(matches!(
            lamp.remove_affordance("overheating").unwrap(),
            Affordance::Event(_)
        ));
        lamp.remove_affordance("fade").unwrap();

        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(matches!(
            lamp.emit_event("overheating", &json!(90)),
            Err(WotError::NotFound(_))
        ));
        assert!(lamp.set_action_handler("fade", |input| async move { Ok(input) }).is_err());
        assert!(matches!(
            lamp.remove_affordance("fade"),
            Err(WotError::NotFound(_))
        ));
        assert_eq!(lamp.read_property("on").unwrap(), json!(false));
    }

    #[test]
    fn should_reject_subscription_to_non_observable_property() {
        let lamp = lamp(hub());
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = lamp.subscribe("brightness", "application/json", tx).unwrap_err();
        assert!(matches!(err, WotError::Validation(ValidationError::NotObservable(_))));
    }

    #[test]
    fn should_reject_subscription_to_action() {
        let lamp = lamp(hub());
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = lamp.subscribe("fade", "application/json", tx).unwrap_err();
        assert!(matches!(err, WotError::Validation(ValidationError::NotSubscribable(_))));
    }

    #[tokio::test]
    async fn should_run_action_handler_with_input() {
        let lamp = lamp(hub());
        lamp.set_action_handler("fade", |input| async move {
            let step = input.as_i64().unwrap_or_default();
            Ok(json!(step * 2))
        })
        .unwrap();

        let output = lamp.invoke_action("fade", json!(21)).await.unwrap();
        assert_eq!(output, json!(42));
    }

    #[tokio::test]
    async fn should_reject_action_input_that_breaks_schema() {
        let lamp = lamp(hub());
        lamp.set_action_handler("fade", |_| async { Ok(Value::Null) })
            .unwrap();
        let err = lamp.invoke_action("fade", json!("slow")).await.unwrap_err();
        assert!(matches!(err, WotError::Validation(_)));
    }

    #[tokio::test]
    async fn should_fail_with_action_error_when_no_handler() {
        let lamp = lamp(hub());
        let err = lamp.invoke_action("fade", json!(1)).await.unwrap_err();
        assert!(matches!(err, WotError::Action { message } if message == "no handler"));
    }

    #[tokio::test]
    async fn should_surface_handler_failure_and_stay_usable() {
        let lamp = lamp(hub());
        lamp.set_action_handler("fade", |input| async move {
            if input == json!(0) {
                Err(WotError::action("cannot fade to zero"))
            } else {
                Ok(input)
            }
        })
        .unwrap();

        let err = lamp.invoke_action("fade", json!(0)).await.unwrap_err();
        assert!(matches!(err, WotError::Action { message } if message == "cannot fade to zero"));
        assert_eq!(lamp.invoke_action("fade", json!(3)).await.unwrap(), json!(3));
        assert_eq!(lamp.read_property("on").unwrap(), json!(false));
    }

    #[tokio::test]
    async fn should_turn_handler_panic_into_action_error() {
        let lamp = lamp(hub());
        lamp.set_action_handler("fade", |input| async move {
            assert!(input.is_null(), "bulb exploded");
            Ok(input)
        })
        .unwrap();

        let err = lamp.invoke_action("fade", json!(1)).await.unwrap_err();
        assert!(matches!(err, WotError::Action { message } if message == "bulb exploded"));
    }

    #[test]
    fn should_emit_event_to_subscribers() {
        let lamp = lamp(hub());
        let (tx, mut rx) = mpsc::unbounded_channel();
        lamp.subscribe("overheating", "application/json", tx).unwrap();

        assert_eq!(lamp.emit_event("overheating", &json!(95.5)).unwrap(), 1);
        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.kind, NotificationKind::Event);
        assert_eq!(notification.content.as_bytes(), b"95.5");
    }

    #[test]
    fn should_reject_event_payload_that_breaks_schema() {
        let lamp = lamp(hub());
        let err = lamp.emit_event("overheating", &json!("hot")).unwrap_err();
        assert!(matches!(err, WotError::Validation(_)));
    }
}
