//! Server role of the HTTP binding.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use wothub_app::codec::CodecRegistry;
use wothub_app::ports::{BindingServer, InteractionHandler};
use wothub_domain::affordance::Affordance;
use wothub_domain::error::{NotFoundError, WotError};
use wothub_domain::form::{BindingKind, Form, Operation};
use wothub_domain::id::ThingId;
use wothub_domain::thing::Thing;

use crate::config::HttpBindingConfig;
use crate::error::HttpBindingError;
use crate::state::{HttpState, RouteTable};

struct Running {
    base_url: String,
    local_addr: SocketAddr,
    closing: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Serves registered Things over HTTP.
///
/// Binding happens in [`start`](BindingServer::start); with port `0` the
/// hrefs published afterwards carry the port the OS assigned.
pub struct HttpServer {
    config: HttpBindingConfig,
    codecs: Arc<CodecRegistry>,
    routes: RouteTable,
    running: Mutex<Option<Running>>,
}

impl HttpServer {
    pub fn new(config: HttpBindingConfig, codecs: Arc<CodecRegistry>) -> Self {
        Self {
            config,
            codecs,
            routes: RouteTable::default(),
            running: Mutex::new(None),
        }
    }

    /// Address the listener is bound to, while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|running| running.local_addr)
    }

    /// Base of every published href, while running.
    pub async fn base_url(&self) -> Option<String> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|running| running.base_url.clone())
    }

    fn base_url_for(&self, addr: SocketAddr) -> String {
        if let Some(base_url) = &self.config.base_url {
            return base_url.trim_end_matches('/').to_string();
        }
        let mut addr = addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(std::net::Ipv4Addr::LOCALHOST.into());
        }
        format!("http://{addr}")
    }

    fn forms(&self, base_url: &str, slug: &str, name: &str, affordance: &Affordance) -> Vec<Form> {
        let root = format!("{base_url}/things/{slug}");
        let content_type = self.config.content_type.clone();
        match affordance {
            Affordance::Property(property) => {
                let mut ops = vec![Operation::ReadProperty];
                if property.writable {
                    ops.push(Operation::WriteProperty);
                }
                let mut forms = vec![
                    Form::new(self.kind(), format!("{root}/properties/{name}"), ops)
                        .with_content_type(content_type.clone()),
                ];
                if property.observable {
                    forms.push(
                        Form::new(
                            self.kind(),
                            format!("{root}/properties/{name}/observable"),
                            [Operation::ObserveProperty, Operation::UnobserveProperty],
                        )
                        .with_content_type(content_type),
                    );
                }
                forms
            }
            Affordance::Action(_) => vec![
                Form::new(
                    self.kind(),
                    format!("{root}/actions/{name}"),
                    [Operation::InvokeAction],
                )
                .with_content_type(content_type),
            ],
            Affordance::Event(_) => vec![
                Form::new(
                    self.kind(),
                    format!("{root}/events/{name}"),
                    [Operation::SubscribeEvent, Operation::UnsubscribeEvent],
                )
                .with_content_type(content_type),
            ],
        }
    }
}

#[async_trait]
impl BindingServer for HttpServer {
    fn kind(&self) -> BindingKind {
        BindingKind::new("http")
    }

    #[tracing::instrument(skip_all, fields(addr = %self.config.bind_addr()))]
    async fn start(&self, handler: Arc<dyn InteractionHandler>) -> Result<(), WotError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(WotError::protocol("http binding is already running"));
        }

        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| HttpBindingError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| HttpBindingError::Bind { addr, source })?;

        let (closing, closed) = watch::channel(false);
        let state = HttpState::new(
            handler,
            Arc::clone(&self.codecs),
            self.routes.clone(),
            closed.clone(),
        );
        let app = crate::router::build(state);
        let mut shutdown = closed;
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.wait_for(|closed| *closed).await;
                })
                .await;
            if let Err(error) = served {
                tracing::error!(%error, "http server stopped with error");
            }
        });

        let base_url = self.base_url_for(local_addr);
        tracing::info!(%local_addr, %base_url, "http binding listening");
        *running = Some(Running {
            base_url,
            local_addr,
            closing,
            task,
        });
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn stop(&self) -> Result<(), WotError> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        self.routes.clear();
        let _ = running.closing.send(true);
        if let Err(error) = running.task.await {
            tracing::warn!(%error, "http server task ended abnormally");
        }
        tracing::info!(local_addr = %running.local_addr, "http binding stopped");
        Ok(())
    }

    async fn publish(&self, thing: &Thing, affordance: &str) -> Result<Vec<Form>, WotError> {
        let base_url = self
            .running
            .lock()
            .await
            .as_ref()
            .map(|running| running.base_url.clone())
            .ok_or(HttpBindingError::NotRunning)?;
        let found = thing.affordance(affordance).ok_or_else(|| NotFoundError {
            entity: "Affordance",
            id: affordance.to_string(),
        })?;
        let slug = thing.slug();
        self.routes.insert(&slug, &thing.id, found.kind(), affordance);
        Ok(self.forms(&base_url, &slug, affordance, found))
    }

    async fn unpublish(&self, thing: &ThingId, affordance: &str) -> Result<(), WotError> {
        self.routes.remove(thing, affordance);
        Ok(())
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
