use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use wothub_app::codec::CodecRegistry;
use wothub_app::ports::{BindingClient, ClientSubscription};
use wothub_domain::description::ThingDescription;
use wothub_domain::error::WotError;
use wothub_domain::form::{BindingKind, Form};

use super::network::{Address, LoopbackNetwork, Node};
use super::server::DEFAULT_KIND;

/// Client side of the loopback binding.
///
/// Requests are encoded with the form's content type, handed to the node
/// named in the href, and the reply decoded again. Errors reported by the
/// serving side are rebuilt from their wire kind and message, the same way a
/// networked client would.
#[derive(Debug, Clone)]
pub struct LoopbackClient {
    kind: BindingKind,
    network: LoopbackNetwork,
    codecs: Arc<CodecRegistry>,
}

impl LoopbackClient {
    pub fn new(network: LoopbackNetwork, codecs: Arc<CodecRegistry>) -> Self {
        Self {
            kind: BindingKind::new(DEFAULT_KIND),
            network,
            codecs,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<BindingKind>) -> Self {
        self.kind = kind.into();
        self
    }

    fn connect(&self, href: &str) -> Result<(Address, Arc<Node>), WotError> {
        let address = Address::parse(href)?;
        let node = self.network.node(&self.kind, &address.node)?;
        Ok((address, node))
    }
}

fn remote(err: WotError) -> WotError {
    WotError::from_remote(err.kind(), err.wire_message())
}

#[async_trait]
impl BindingClient for LoopbackClient {
    fn kind(&self) -> BindingKind {
        self.kind.clone()
    }

    #[tracing::instrument(skip(self, form), fields(href = %form.href))]
    async fn read_property(&self, form: &Form) -> Result<Value, WotError> {
        let (address, node) = self.connect(&form.href)?;
        let reply = node
            .read(&address, &form.href, &form.content_type)
            .await
            .map_err(remote)?;
        self.codecs.decode(&reply.media_type, reply.as_bytes())
    }

    #[tracing::instrument(skip(self, form, value), fields(href = %form.href))]
    async fn write_property(&self, form: &Form, value: Value) -> Result<(), WotError> {
        let (address, node) = self.connect(&form.href)?;
        let request = self.codecs.encode(&form.content_type, &value)?;
        node.write(&address, &form.href, &request)
            .await
            .map_err(remote)
    }

    #[tracing::instrument(skip(self, form, input), fields(href = %form.href))]
    async fn invoke_action(&self, form: &Form, input: Value) -> Result<Value, WotError> {
        let (address, node) = self.connect(&form.href)?;
        let request = self.codecs.encode(&form.content_type, &input)?;
        let reply = node
            .invoke(&address, &form.href, &request)
            .await
            .map_err(remote)?;
        self.codecs.decode(&reply.media_type, reply.as_bytes())
    }

    #[tracing::instrument(skip(self, form, sink), fields(href = %form.href))]
    async fn subscribe(
        &self,
        form: &Form,
        sink: mpsc::UnboundedSender<Value>,
    ) -> Result<ClientSubscription, WotError> {
        let (address, node) = self.connect(&form.href)?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = node
            .subscribe(&address, &form.href, &form.content_type, tx)
            .map_err(remote)?;

        let codecs = Arc::clone(&self.codecs);
        let forward = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                let content = &notification.content;
                match codecs.decode(&content.media_type, content.as_bytes()) {
                    Ok(value) => {
                        if sink.send(value).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(affordance = %notification.affordance, %error, "dropping undecodable notification");
                    }
                }
            }
        });

        Ok(ClientSubscription::new(move || {
            node.unsubscribe(id);
            forward.abort();
        }))
    }

    async fn fetch_description(&self, url: &str) -> Result<ThingDescription, WotError> {
        let (address, node) = self.connect(url)?;
        let body = node.description(&address, url).map_err(remote)?;
        serde_json::from_slice(&body).map_err(|source| WotError::Decode {
            media_type: "application/td+json".to_string(),
            source: Box::new(source),
        })
    }
}
