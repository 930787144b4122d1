//! Subscription hub: fans property changes and events out to every
//! subscriber, whatever binding it came through.
//!
//! Subscribers are grouped per `(thing, affordance)` topic, in subscription
//! order. Each subscriber owns an unbounded queue drained by its adapter, so
//! [`SubscriptionHub::notify`] never waits on delivery. A notification is
//! encoded once per distinct content type among the topic's subscribers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use wothub_domain::error::{NotFoundError, WotError};
use wothub_domain::id::{SubscriptionId, ThingId};
use wothub_domain::notification::{Content, Notification, NotificationKind};

use crate::codec::{CodecRegistry, normalize_media_type};

type TopicKey = (ThingId, String);

struct Subscriber {
    id: SubscriptionId,
    content_type: String,
    sink: mpsc::UnboundedSender<Notification>,
}

#[derive(Default)]
struct Topic {
    subscribers: Vec<Subscriber>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cross-binding registry of live subscriptions.
pub struct SubscriptionHub {
    codecs: Arc<CodecRegistry>,
    topics: Mutex<HashMap<TopicKey, Arc<Mutex<Topic>>>>,
    index: Mutex<HashMap<SubscriptionId, TopicKey>>,
}

impl SubscriptionHub {
    #[must_use]
    pub fn new(codecs: Arc<CodecRegistry>) -> Self {
        Self {
            codecs,
            topics: Mutex::new(HashMap::new()),
            index: Mutex::new(HashMap::new()),
        }
    }

    fn topic(&self, key: &TopicKey) -> Option<Arc<Mutex<Topic>>> {
        lock(&self.topics).get(key).cloned()
    }

    /// Add a subscriber to the `(thing, affordance)` topic.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::UnsupportedMediaType`] when `content_type` has no
    /// registered codec.
    pub fn subscribe(
        &self,
        thing: &ThingId,
        affordance: &str,
        content_type: &str,
        sink: mpsc::UnboundedSender<Notification>,
    ) -> Result<SubscriptionId, WotError> {
        let content_type = normalize_media_type(content_type);
        if !self.codecs.supports(&content_type) {
            return Err(WotError::UnsupportedMediaType {
                media_type: content_type,
            });
        }
        let key = (thing.clone(), affordance.to_string());
        let id = SubscriptionId::new();
        {
            // registered under the topics lock so a concurrent cancel either
            // sees the subscriber or runs before the topic exists
            let mut topics = lock(&self.topics);
            let topic = topics.entry(key.clone()).or_default();
            lock(topic).subscribers.push(Subscriber {
                id,
                content_type,
                sink,
            });
            lock(&self.index).insert(id, key);
        }
        tracing::debug!(%thing, affordance, subscription = %id, "subscribed");
        Ok(id)
    }

    /// Remove a subscriber. Once this returns, no further notification is
    /// enqueued for it.
    ///
    /// # Errors
    ///
    /// Returns [`WotError::NotFound`] for unknown or already removed ids.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), WotError> {
        let not_found = || NotFoundError {
            entity: "Subscription",
            id: id.to_string(),
        };
        let key = lock(&self.index).remove(&id).ok_or_else(not_found)?;
        let topic = self.topic(&key).ok_or_else(not_found)?;
        lock(&topic).subscribers.retain(|subscriber| subscriber.id != id);
        tracing::debug!(thing = %key.0, affordance = %key.1, subscription = %id, "unsubscribed");
        Ok(())
    }

    /// Push `value` to every subscriber of the topic.
    ///
    /// Returns the number of subscribers the notification was enqueued for.
    /// Subscribers whose queue is closed are dropped; a content type that
    /// fails to encode only skips its own subscribers.
    pub fn notify(
        &self,
        thing: &ThingId,
        affordance: &str,
        kind: NotificationKind,
        value: &Value,
    ) -> usize {
        let key = (thing.clone(), affordance.to_string());
        let Some(topic) = self.topic(&key) else {
            return 0;
        };
        let timestamp = Utc::now();
        let mut encoded: HashMap<String, Option<Content>> = HashMap::new();
        let mut closed = Vec::new();
        let mut delivered = 0;

        let mut topic = lock(&topic);
        for subscriber in &topic.subscribers {
            let content = encoded
                .entry(subscriber.content_type.clone())
                .or_insert_with(|| match self.codecs.encode(&subscriber.content_type, value) {
                    Ok(content) => Some(content),
                    Err(error) => {
                        tracing::warn!(%thing, affordance, content_type = %subscriber.content_type, %error, "failed to encode notification");
                        None
                    }
                });
            let Some(content) = content else {
                continue;
            };
            let notification = Notification {
                thing_id: thing.clone(),
                affordance: affordance.to_string(),
                kind,
                content: content.clone(),
                timestamp,
            };
            if subscriber.sink.send(notification).is_ok() {
                delivered += 1;
            } else {
                tracing::info!(%thing, affordance, subscription = %subscriber.id, "subscriber queue closed, removing");
                closed.push(subscriber.id);
            }
        }
        if !closed.is_empty() {
            topic
                .subscribers
                .retain(|subscriber| !closed.contains(&subscriber.id));
            let mut index = lock(&self.index);
            for id in &closed {
                index.remove(id);
            }
        }
        delivered
    }

    /// Drop every subscription of `thing`, closing their queues.
    ///
    /// Returns how many subscriptions were cancelled.
    pub fn cancel_thing(&self, thing: &ThingId) -> usize {
        let cancelled = self.cancel_where(|(owner, _)| owner == thing);
        if cancelled > 0 {
            tracing::debug!(%thing, cancelled, "cancelled subscriptions");
        }
        cancelled
    }

    /// Drop every subscription of one affordance, closing their queues.
    ///
    /// Returns how many subscriptions were cancelled.
    pub fn cancel_affordance(&self, thing: &ThingId, affordance: &str) -> usize {
        let cancelled = self.cancel_where(|(owner, name)| owner == thing && name == affordance);
        if cancelled > 0 {
            tracing::debug!(%thing, affordance, cancelled, "cancelled subscriptions");
        }
        cancelled
    }

    fn cancel_where(&self, matches: impl Fn(&TopicKey) -> bool) -> usize {
        let removed: Vec<Arc<Mutex<Topic>>> = {
            let mut topics = lock(&self.topics);
            let keys: Vec<TopicKey> = topics.keys().filter(|key| matches(key)).cloned().collect();
            keys.iter().filter_map(|key| topics.remove(key)).collect()
        };
        let mut cancelled = 0;
        for topic in removed {
            let subscribers = std::mem::take(&mut lock(&topic).subscribers);
            let mut index = lock(&self.index);
            for subscriber in subscribers {
                index.remove(&subscriber.id);
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Number of live subscribers of a topic.
    #[must_use]
    pub fn subscriber_count(&self, thing: &ThingId, affordance: &str) -> usize {
        let key = (thing.clone(), affordance.to_string());
        self.topic(&key)
            .map_or(0, |topic| lock(&topic).subscribers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hub() -> SubscriptionHub {
        SubscriptionHub::new(Arc::new(CodecRegistry::default()))
    }

    fn thermo() -> ThingId {
        ThingId::new("urn:dev:wot:thermo").unwrap()
    }

    #[test]
    fn should_deliver_to_subscriber_in_notify_order() {
        let hub = hub();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.subscribe(&thermo(), "temperature", "application/json", tx)
            .unwrap();

        for value in [20, 21, 22] {
            hub.notify(
                &thermo(),
                "temperature",
                NotificationKind::PropertyChange,
                &json!(value),
            );
        }

        for expected in ["20", "21", "22"] {
            let notification = rx.try_recv().unwrap();
            assert_eq!(notification.content.as_bytes(), expected.as_bytes());
            assert_eq!(notification.kind, NotificationKind::PropertyChange);
        }
    }

    #[test]
    fn should_encode_once_per_content_type() {
        let hub = hub();
        let (json_a, mut rx_a) = mpsc::unbounded_channel();
        let (json_b, mut rx_b) = mpsc::unbounded_channel();
        let (text, mut rx_text) = mpsc::unbounded_channel();
        hub.subscribe(&thermo(), "label", "application/json", json_a)
            .unwrap();
        hub.subscribe(&thermo(), "label", "application/json", json_b)
            .unwrap();
        hub.subscribe(&thermo(), "label", "text/plain", text).unwrap();

        let delivered = hub.notify(
            &thermo(),
            "label",
            NotificationKind::PropertyChange,
            &json!("kitchen"),
        );
        assert_eq!(delivered, 3);

        let a = rx_a.try_recv().unwrap();
        let b = rx_b.try_recv().unwrap();
        let t = rx_text.try_recv().unwrap();
        assert!(Arc::ptr_eq(&a.content.body, &b.content.body));
        assert_eq!(a.content.as_bytes(), b"\"kitchen\"");
        assert_eq!(t.content.media_type, "text/plain");
        assert_eq!(t.content.as_bytes(), b"kitchen");
    }

    #[test]
    fn should_reject_subscription_without_codec() {
        let hub = hub();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = hub
            .subscribe(&thermo(), "temperature", "application/cbor", tx)
            .unwrap_err();
        assert!(matches!(err, WotError::UnsupportedMediaType { .. }));
        assert_eq!(hub.subscriber_count(&thermo(), "temperature"), 0);
    }

    #[test]
    fn should_stop_delivering_after_unsubscribe() {
        let hub = hub();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub
            .subscribe(&thermo(), "temperature", "application/json", tx)
            .unwrap();

        hub.notify(&thermo(), "temperature", NotificationKind::PropertyChange, &json!(1));
        hub.unsubscribe(id).unwrap();
        hub.notify(&thermo(), "temperature", NotificationKind::PropertyChange, &json!(2));

        assert_eq!(rx.try_recv().unwrap().content.as_bytes(), b"1");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn should_return_not_found_when_unsubscribing_twice() {
        let hub = hub();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = hub
            .subscribe(&thermo(), "temperature", "application/json", tx)
            .unwrap();
        hub.unsubscribe(id).unwrap();
        assert!(matches!(hub.unsubscribe(id), Err(WotError::NotFound(_))));
    }

    #[test]
    fn should_drop_only_closed_subscriber() {
        let hub = hub();
        let (gone, gone_rx) = mpsc::unbounded_channel();
        let (alive, mut alive_rx) = mpsc::unbounded_channel();
        hub.subscribe(&thermo(), "overheat", "application/json", gone)
            .unwrap();
        hub.subscribe(&thermo(), "overheat", "application/json", alive)
            .unwrap();
        drop(gone_rx);

        let delivered = hub.notify(&thermo(), "overheat", NotificationKind::Event, &json!(90));

        assert_eq!(delivered, 1);
        assert_eq!(hub.subscriber_count(&thermo(), "overheat"), 1);
        assert_eq!(alive_rx.try_recv().unwrap().kind, NotificationKind::Event);
    }

    #[test]
    fn should_skip_only_subscribers_of_failing_content_type() {
        struct Picky;
        impl crate::codec::ContentCodec for Picky {
            fn media_type(&self) -> &str {
                "application/x-picky"
            }
            fn encode(&self, _: &Value) -> Result<Vec<u8>, wothub_domain::error::BoxError> {
                Err("cannot encode".into())
            }
            fn decode(&self, _: &[u8]) -> Result<Value, wothub_domain::error::BoxError> {
                Err("cannot decode".into())
            }
        }
        let mut codecs = CodecRegistry::default();
        codecs.register(Picky);
        let hub = SubscriptionHub::new(Arc::new(codecs));
        let (picky, mut picky_rx) = mpsc::unbounded_channel();
        let (json, mut json_rx) = mpsc::unbounded_channel();
        hub.subscribe(&thermo(), "temperature", "application/x-picky", picky)
            .unwrap();
        hub.subscribe(&thermo(), "temperature", "application/json", json)
            .unwrap();

        let delivered = hub.notify(
            &thermo(),
            "temperature",
            NotificationKind::PropertyChange,
            &json!(5),
        );

        assert_eq!(delivered, 1);
        assert!(picky_rx.try_recv().is_err());
        assert!(json_rx.try_recv().is_ok());
        assert_eq!(hub.subscriber_count(&thermo(), "temperature"), 2);
    }

    #[test]
    fn should_close_queues_when_thing_is_cancelled() {
        let hub = hub();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub
            .subscribe(&thermo(), "temperature", "application/json", tx)
            .unwrap();

        assert_eq!(hub.cancel_thing(&thermo()), 1);

        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(hub.unsubscribe(id).is_err());
        assert_eq!(hub.subscriber_count(&thermo(), "temperature"), 0);
    }

    #[test]
    fn should_cancel_only_the_given_affordance() {
        let hub = hub();
        let (temperature, mut temperature_rx) = mpsc::unbounded_channel();
        let (overheat, mut overheat_rx) = mpsc::unbounded_channel();
        hub.subscribe(&thermo(), "temperature", "application/json", temperature)
            .unwrap();
        hub.subscribe(&thermo(), "overheat", "application/json", overheat)
            .unwrap();

        assert_eq!(hub.cancel_affordance(&thermo(), "overheat"), 1);

        assert!(matches!(
            overheat_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(
            hub.notify(&thermo(), "temperature", NotificationKind::PropertyChange, &json!(3)),
            1
        );
        assert!(temperature_rx.try_recv().is_ok());
    }

    #[test]
    fn should_not_leave_subscriber_behind_a_concurrent_cancel() {
        for _ in 0..200 {
            let hub = hub();
            let barrier = std::sync::Barrier::new(2);
            let (tx, mut rx) = mpsc::unbounded_channel();
            std::thread::scope(|scope| {
                let (hub, barrier) = (&hub, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    hub.subscribe(&thermo(), "temperature", "application/json", tx)
                        .unwrap();
                });
                scope.spawn(move || {
                    barrier.wait();
                    hub.cancel_thing(&thermo());
                });
            });

            if hub.subscriber_count(&thermo(), "temperature") == 0 {
                assert!(matches!(
                    rx.try_recv(),
                    Err(mpsc::error::TryRecvError::Disconnected)
                ));
                assert!(lock(&hub.index).is_empty());
            } else {
                let value = json!(1);
                assert_eq!(
                    hub.notify(&thermo(), "temperature", NotificationKind::PropertyChange, &value),
                    1
                );
                assert_eq!(lock(&hub.index).len(), 1);
            }
        }
    }

    #[test]
    fn should_return_zero_when_nobody_listens() {
        let hub = hub();
        assert_eq!(
            hub.notify(&thermo(), "temperature", NotificationKind::PropertyChange, &json!(1)),
            0
        );
    }
}
