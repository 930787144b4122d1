//! Client role of the MQTT binding.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use wothub_app::codec::CodecRegistry;
use wothub_app::ports::{BindingClient, ClientSubscription};
use wothub_domain::error::WotError;
use wothub_domain::form::{BindingKind, Form};

use crate::config::MqttBindingConfig;
use crate::error::MqttError;
use crate::message::{
    ActionRequest, ActionResult, WriteRequest, WriteResult, from_payload, to_payload,
};
use crate::topics::{self, Target};

const CHANNEL_CAPACITY: usize = 64;
const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

type Sender = mpsc::UnboundedSender<Vec<u8>>;

/// Topic listeners of one broker connection.
#[derive(Debug, Default)]
struct Listeners {
    next: u64,
    by_topic: HashMap<String, Vec<(u64, Sender)>>,
}

impl Listeners {
    /// Returns the listener id and whether it is the first on `topic`.
    fn add(&mut self, topic: &str, sender: Sender) -> (u64, bool) {
        self.next += 1;
        let listeners = self.by_topic.entry(topic.to_string()).or_default();
        listeners.push((self.next, sender));
        (self.next, listeners.len() == 1)
    }

    /// Returns whether `topic` has no listener left.
    fn remove(&mut self, topic: &str, id: u64) -> bool {
        let Some(listeners) = self.by_topic.get_mut(topic) else {
            return false;
        };
        listeners.retain(|(listener, _)| *listener != id);
        if listeners.is_empty() {
            self.by_topic.remove(topic);
            true
        } else {
            false
        }
    }

    fn deliver(&mut self, topic: &str, payload: &[u8]) -> usize {
        let Some(listeners) = self.by_topic.get_mut(topic) else {
            return 0;
        };
        listeners.retain(|(_, sender)| sender.send(payload.to_vec()).is_ok());
        listeners.len()
    }

    fn topics(&self) -> Vec<String> {
        self.by_topic.keys().cloned().collect()
    }
}

/// Messages of one topic, unsubscribed from the broker when the last
/// listener of that topic is dropped.
struct Listener {
    id: u64,
    topic: String,
    receiver: mpsc::UnboundedReceiver<Vec<u8>>,
    listeners: Arc<StdMutex<Listeners>>,
    client: AsyncClient,
}

impl Listener {
    async fn recv(&mut self) -> Result<Vec<u8>, MqttError> {
        self.receiver.recv().await.ok_or(MqttError::NotConnected)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let last = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.topic, self.id);
        if last && let Err(error) = self.client.try_unsubscribe(self.topic.clone()) {
            tracing::debug!(topic = %self.topic, %error, "unsubscribe not queued");
        }
    }
}

struct Connection {
    client: AsyncClient,
    listeners: Arc<StdMutex<Listeners>>,
    task: JoinHandle<()>,
}

impl Connection {
    fn open(config: &MqttBindingConfig, target: &Target) -> Self {
        let client_id = format!("{}-{}", config.client_id, uuid::Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, target.host.clone(), target.port);
        options.set_keep_alive(config.keep_alive());
        let (client, event_loop) = AsyncClient::new(options, CHANNEL_CAPACITY);
        let listeners = Arc::new(StdMutex::new(Listeners::default()));
        let task = tokio::spawn(pump(
            event_loop,
            client.clone(),
            Arc::clone(&listeners),
            target.authority(),
        ));
        Self {
            client,
            listeners,
            task,
        }
    }

    async fn listen(&self, topic: &str) -> Result<Listener, MqttError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (id, first) = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(topic, sender);
        let listener = Listener {
            id,
            topic: topic.to_string(),
            receiver,
            listeners: Arc::clone(&self.listeners),
            client: self.client.clone(),
        };
        if first {
            self.client
                .subscribe(topic, QoS::AtLeastOnce)
                .await
                .map_err(MqttError::Client)?;
        }
        Ok(listener)
    }

    async fn send(&self, topic: String, payload: Vec<u8>) -> Result<(), MqttError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(MqttError::Client)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Retained copies are skipped: every listener waits for a fresh message.
async fn pump(
    mut event_loop: EventLoop,
    client: AsyncClient,
    listeners: Arc<StdMutex<Listeners>>,
    broker: String,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::debug!(%broker, "connected to broker");
                let topics = listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .topics();
                for topic in topics {
                    if let Err(error) = client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
                        tracing::warn!(%broker, %topic, %error, "failed to resubscribe");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(message))) if !message.retain => {
                listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .deliver(&message.topic, &message.payload);
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%broker, %error, "broker connection lost, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Performs interactions against remote Things through their `mqtt` forms.
///
/// One broker connection is opened per `host:port` on first use and kept
/// for the lifetime of the client.
pub struct MqttClient {
    config: MqttBindingConfig,
    codecs: Arc<CodecRegistry>,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
}

impl MqttClient {
    pub fn new(config: MqttBindingConfig, codecs: Arc<CodecRegistry>) -> Self {
        Self {
            config,
            codecs,
            connections: Mutex::new(HashMap::new()),
        }
    }

    async fn connection(&self, target: &Target) -> Arc<Connection> {
        let mut connections = self.connections.lock().await;
        Arc::clone(
            connections
                .entry(target.authority())
                .or_insert_with(|| Arc::new(Connection::open(&self.config, target))),
        )
    }

    async fn within<T>(
        &self,
        work: impl Future<Output = Result<T, WotError>>,
    ) -> Result<T, WotError> {
        tokio::time::timeout(self.config.response_timeout(), work)
            .await
            .map_err(|_| WotError::Timeout)?
    }
}

impl std::fmt::Debug for MqttClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BindingClient for MqttClient {
    fn kind(&self) -> BindingKind {
        BindingKind::new("mqtt")
    }

    /// Publishes on the `read` topic and waits for the value the server
    /// answers with.
    #[tracing::instrument(skip(self, form), fields(href = %form.href))]
    async fn read_property(&self, form: &Form) -> Result<Value, WotError> {
        let target = Target::parse(&form.href)?;
        let connection = self.connection(&target).await;
        self.within(async {
            let mut listener = connection.listen(&target.topic).await?;
            connection
                .send(topics::read_topic(&target.topic), Vec::new())
                .await?;
            loop {
                let payload = listener.recv().await?;
                if !payload.is_empty() {
                    return self.codecs.decode(&form.content_type, &payload);
                }
            }
        })
        .await
    }

    /// Resolves once the server has stored the value, or with the reason it
    /// rejected it.
    #[tracing::instrument(skip(self, form, value), fields(href = %form.href))]
    async fn write_property(&self, form: &Form, value: Value) -> Result<(), WotError> {
        let target = Target::parse(&form.href)?;
        let connection = self.connection(&target).await;
        let write = topics::write_topic(&target.topic);
        let request = WriteRequest::new(value);
        self.within(async {
            let mut listener = connection.listen(&topics::result_topic(&write)).await?;
            connection.send(write.clone(), to_payload(&request)).await?;
            loop {
                let payload = listener.recv().await?;
                match from_payload::<WriteResult>(&payload) {
                    Ok(result) if result.id == request.id => return result.into_outcome(),
                    Ok(_) => {}
                    Err(error) => tracing::debug!(%error, "skipping malformed write result"),
                }
            }
        })
        .await
    }

    #[tracing::instrument(skip(self, form, input), fields(href = %form.href))]
    async fn invoke_action(&self, form: &Form, input: Value) -> Result<Value, WotError> {
        let target = Target::parse(&form.href)?;
        let connection = self.connection(&target).await;
        let request = ActionRequest::new(input);
        self.within(async {
            let mut listener = connection.listen(&topics::result_topic(&target.topic)).await?;
            connection
                .send(target.topic.clone(), to_payload(&request))
                .await?;
            loop {
                let payload = listener.recv().await?;
                match from_payload::<ActionResult>(&payload) {
                    Ok(result) if result.id == request.id => return result.into_outcome(),
                    Ok(_) => {}
                    Err(error) => tracing::debug!(%error, "skipping malformed action result"),
                }
            }
        })
        .await
    }

    #[tracing::instrument(skip(self, form, sink), fields(href = %form.href))]
    async fn subscribe(
        &self,
        form: &Form,
        sink: mpsc::UnboundedSender<Value>,
    ) -> Result<ClientSubscription, WotError> {
        let target = Target::parse(&form.href)?;
        let connection = self.connection(&target).await;
        let mut listener = self
            .within(async { connection.listen(&target.topic).await.map_err(WotError::from) })
            .await?;

        let codecs = Arc::clone(&self.codecs);
        let media_type = form.content_type.clone();
        let topic = target.topic;
        let task = tokio::spawn(async move {
            while let Ok(payload) = listener.recv().await {
                if payload.is_empty() {
                    continue;
                }
                match codecs.decode(&media_type, &payload) {
                    Ok(value) => {
                        if sink.send(value).is_err() {
                            break;
                        }
                    }
                    Err(error) => tracing::warn!(%topic, %error, "dropping undecodable message"),
                }
            }
        });
        Ok(ClientSubscription::new(move || task.abort()))
    }
}
