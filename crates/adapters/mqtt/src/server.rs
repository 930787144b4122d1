//! Server role of the MQTT binding.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use wothub_app::codec::CodecRegistry;
use wothub_app::ports::{BindingServer, InteractionHandler};
use wothub_domain::affordance::{Affordance, AffordanceKind};
use wothub_domain::error::{NotFoundError, WotError};
use wothub_domain::form::{BindingKind, Form};
use wothub_domain::id::{SubscriptionId, ThingId};
use wothub_domain::notification::Notification;
use wothub_domain::thing::Thing;

use crate::config::MqttBindingConfig;
use crate::error::MqttError;
use crate::message::{
    ActionRequest, ActionResult, WriteRequest, WriteResult, from_payload, to_payload,
};
use crate::topics::{self, Request};

const CHANNEL_CAPACITY: usize = 64;
const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Default)]
struct ThingRoute {
    thing: Option<ThingId>,
    affordances: HashMap<String, AffordanceKind>,
}

type Routes = Arc<RwLock<HashMap<String, ThingRoute>>>;

/// Pushes local notifications of one affordance to its topic.
struct Feed {
    subscription: SubscriptionId,
    task: JoinHandle<()>,
}

struct Running {
    client: AsyncClient,
    handler: Arc<dyn InteractionHandler>,
    event_loop: JoinHandle<()>,
    feeds: HashMap<(ThingId, String), Feed>,
}

/// Exposes registered Things through an MQTT broker.
///
/// The server keeps one broker connection while running. Observable
/// properties and events are pushed as they change; reads, writes and action
/// invocations arrive on request topics (see [`topics`](crate::topics)).
pub struct MqttServer {
    config: MqttBindingConfig,
    codecs: Arc<CodecRegistry>,
    routes: Routes,
    running: Mutex<Option<Running>>,
}

impl MqttServer {
    pub fn new(config: MqttBindingConfig, codecs: Arc<CodecRegistry>) -> Self {
        Self {
            config,
            codecs,
            routes: Routes::default(),
            running: Mutex::new(None),
        }
    }

    fn href(&self, topic: &str) -> String {
        format!("mqtt://{}/{topic}", self.config.authority())
    }
}

#[async_trait]
impl BindingServer for MqttServer {
    fn kind(&self) -> BindingKind {
        BindingKind::new("mqtt")
    }

    #[tracing::instrument(skip_all, fields(broker = %self.config.authority()))]
    async fn start(&self, handler: Arc<dyn InteractionHandler>) -> Result<(), WotError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(WotError::protocol("mqtt binding is already running"));
        }

        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.broker_host.clone(),
            self.config.broker_port,
        );
        options.set_keep_alive(self.config.keep_alive());
        let (client, event_loop) = AsyncClient::new(options, CHANNEL_CAPACITY);

        let dispatcher = Dispatcher {
            client: client.clone(),
            base: self.config.base_topic.clone(),
            content_type: self.config.content_type.clone(),
            routes: Arc::clone(&self.routes),
            handler: Arc::clone(&handler),
            codecs: Arc::clone(&self.codecs),
        };
        let event_loop = tokio::spawn(dispatcher.run(event_loop));

        tracing::info!(base_topic = %self.config.base_topic, "mqtt binding started");
        *running = Some(Running {
            client,
            handler,
            event_loop,
            feeds: HashMap::new(),
        });
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(broker = %self.config.authority()))]
    async fn stop(&self) -> Result<(), WotError> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        for feed in running.feeds.into_values() {
            let _ = running.handler.unsubscribe(feed.subscription);
            feed.task.abort();
        }
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if let Err(error) = running.client.try_disconnect() {
            tracing::debug!(%error, "disconnect request not delivered");
        }
        running.event_loop.abort();
        tracing::info!("mqtt binding stopped");
        Ok(())
    }

    async fn publish(&self, thing: &Thing, affordance: &str) -> Result<Vec<Form>, WotError> {
        let mut guard = self.running.lock().await;
        let running = guard.as_mut().ok_or(MqttError::NotConnected)?;
        let found = thing.affordance(affordance).ok_or_else(|| NotFoundError {
            entity: "Affordance",
            id: affordance.to_string(),
        })?;
        let slug = thing.slug();
        let kind = found.kind();
        {
            let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
            let route = routes.entry(slug.clone()).or_default();
            route.thing = Some(thing.id.clone());
            route.affordances.insert(affordance.to_string(), kind);
        }

        let topic = topics::affordance_topic(&self.config.base_topic, &slug, kind, affordance);
        let retain = matches!(found, Affordance::Property(_));
        if retain {
            let value = running.handler.read_property(&thing.id, affordance).await?;
            let content = self.codecs.encode(&self.config.content_type, &value)?;
            // queued without waiting: the broker may still be unreachable
            if let Err(error) = running.client.try_publish(
                topic.clone(),
                QoS::AtLeastOnce,
                true,
                content.as_bytes().to_vec(),
            ) {
                tracing::warn!(%topic, %error, "initial value not queued");
            }
        }
        let pushes = match found {
            Affordance::Property(property) => property.observable,
            Affordance::Event(_) => true,
            Affordance::Action(_) => false,
        };
        if pushes {
            let (sink, notifications) = mpsc::unbounded_channel();
            let subscription = running.handler.subscribe(
                &thing.id,
                affordance,
                &self.config.content_type,
                sink,
            )?;
            let task = tokio::spawn(forward(
                running.client.clone(),
                topic.clone(),
                retain,
                notifications,
            ));
            let key = (thing.id.clone(), affordance.to_string());
            if let Some(previous) = running.feeds.insert(key, Feed { subscription, task }) {
                let _ = running.handler.unsubscribe(previous.subscription);
                previous.task.abort();
            }
        }

        tracing::debug!(thing = %thing.id, affordance, %topic, "published");
        Ok(vec![
            Form::new(self.kind(), self.href(&topic), found.operations())
                .with_content_type(self.config.content_type.clone()),
        ])
    }

    async fn unpublish(&self, thing: &ThingId, affordance: &str) -> Result<(), WotError> {
        let removed = {
            let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
            let slug = routes
                .iter()
                .find(|(_, route)| route.thing.as_ref() == Some(thing))
                .map(|(slug, _)| slug.clone());
            slug.and_then(|slug| {
                let route = routes.get_mut(&slug)?;
                let kind = route.affordances.remove(affordance)?;
                if route.affordances.is_empty() {
                    routes.remove(&slug);
                }
                Some((slug, kind))
            })
        };

        let mut guard = self.running.lock().await;
        let Some(running) = guard.as_mut() else {
            return Ok(());
        };
        if let Some(feed) = running.feeds.remove(&(thing.clone(), affordance.to_string())) {
            let _ = running.handler.unsubscribe(feed.subscription);
            feed.task.abort();
        }
        if let Some((slug, AffordanceKind::Property)) = removed {
            // an empty retained payload clears the last value on the broker
            let topic = topics::affordance_topic(
                &self.config.base_topic,
                &slug,
                AffordanceKind::Property,
                affordance,
            );
            if let Err(error) = running.client.try_publish(topic, QoS::AtLeastOnce, true, Vec::new()) {
                tracing::debug!(%error, "retained value not cleared");
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MqttServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn forward(
    client: AsyncClient,
    topic: String,
    retain: bool,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
) {
    while let Some(notification) = notifications.recv().await {
        let payload = notification.content.as_bytes().to_vec();
        if let Err(error) = client
            .publish(topic.clone(), QoS::AtLeastOnce, retain, payload)
            .await
        {
            tracing::warn!(%topic, %error, "failed to forward notification");
            break;
        }
    }
}

/// Drives the broker connection and turns inbound requests into
/// interactions.
#[derive(Clone)]
struct Dispatcher {
    client: AsyncClient,
    base: String,
    content_type: String,
    routes: Routes,
    handler: Arc<dyn InteractionHandler>,
    codecs: Arc<CodecRegistry>,
}

impl Dispatcher {
    async fn run(self, mut event_loop: EventLoop) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("connected to broker");
                    // the request channel is only drained by this loop, so never await here
                    for filter in topics::request_filters(&self.base) {
                        if let Err(error) = self.client.try_subscribe(filter.clone(), QoS::AtLeastOnce) {
                            tracing::error!(%filter, %error, "failed to subscribe to requests");
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(message))) => {
                    self.dispatch(&message.topic, &message.payload);
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(%error, "broker connection lost, retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    fn resolve(&self, slug: &str, kind: AffordanceKind, name: &str) -> Result<ThingId, WotError> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let route = routes.get(slug).ok_or_else(|| NotFoundError {
            entity: "Thing",
            id: slug.to_string(),
        })?;
        match (route.affordances.get(name), &route.thing) {
            (Some(found), Some(thing)) if *found == kind => Ok(thing.clone()),
            _ => Err(NotFoundError {
                entity: kind.entity_name(),
                id: name.to_string(),
            }
            .into()),
        }
    }

    /// Requests are handled on their own task so a slow action never stalls
    /// the connection.
    fn dispatch(&self, topic: &str, payload: &[u8]) {
        let Some(request) = Request::parse(&self.base, topic) else {
            tracing::trace!(%topic, "ignoring message");
            return;
        };
        let kind = match request {
            Request::ReadProperty { .. } | Request::WriteProperty { .. } => AffordanceKind::Property,
            Request::InvokeAction { .. } => AffordanceKind::Action,
        };
        let thing = match self.resolve(request.slug(), kind, request.name()) {
            Ok(thing) => thing,
            Err(error) => {
                tracing::debug!(%topic, %error, "request for unknown affordance");
                return;
            }
        };
        let affordance = topics::affordance_topic(&self.base, request.slug(), kind, request.name());
        let name = request.name().to_string();
        let payload = payload.to_vec();
        let this = self.clone();
        match request {
            Request::ReadProperty { .. } => {
                tokio::spawn(async move { this.read(thing, name, affordance).await });
            }
            Request::WriteProperty { .. } => {
                tokio::spawn(async move { this.write(thing, name, affordance, payload).await });
            }
            Request::InvokeAction { .. } => {
                tokio::spawn(async move { this.invoke(thing, name, affordance, payload).await });
            }
        }
    }

    #[tracing::instrument(skip(self, thing, topic), fields(thing = %thing))]
    async fn read(&self, thing: ThingId, name: String, topic: String) {
        let published = async {
            let value = self.handler.read_property(&thing, &name).await?;
            let content = self.codecs.encode(&self.content_type, &value)?;
            self.client
                .publish(topic, QoS::AtLeastOnce, true, content.as_bytes().to_vec())
                .await
                .map_err(MqttError::Client)?;
            Ok::<_, WotError>(())
        };
        if let Err(error) = published.await {
            tracing::warn!(%error, "read request failed");
        }
    }

    /// The reply is published once the store holds the new value.
    #[tracing::instrument(skip(self, thing, topic, payload), fields(thing = %thing))]
    async fn write(&self, thing: ThingId, name: String, topic: String, payload: Vec<u8>) {
        let request: WriteRequest = match from_payload(&payload) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(%error, "dropping malformed write request");
                return;
            }
        };
        let outcome = self.handler.write_property(&thing, &name, request.value).await;
        if let Err(error) = &outcome {
            tracing::debug!(%error, "write request rejected");
        }
        let result = WriteResult::from_outcome(request.id, outcome);
        let reply = topics::result_topic(&topics::write_topic(&topic));
        if let Err(error) = self
            .client
            .publish(reply, QoS::AtLeastOnce, false, to_payload(&result))
            .await
        {
            tracing::warn!(%error, "failed to publish write result");
        }
    }

    #[tracing::instrument(skip(self, thing, topic, payload), fields(thing = %thing))]
    async fn invoke(&self, thing: ThingId, name: String, topic: String, payload: Vec<u8>) {
        let request: ActionRequest = match from_payload(&payload) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(%error, "dropping malformed action request");
                return;
            }
        };
        let outcome = self.handler.invoke_action(&thing, &name, request.input).await;
        if let Err(error) = &outcome {
            tracing::debug!(%error, "action failed");
        }
        let result = ActionResult::from_outcome(request.id, outcome);
        if let Err(error) = self
            .client
            .publish(topics::result_topic(&topic), QoS::AtLeastOnce, false, to_payload(&result))
            .await
        {
            tracing::warn!(%error, "failed to publish action result");
        }
    }
}
