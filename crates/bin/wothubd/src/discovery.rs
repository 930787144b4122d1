//! Directory announcements and lifecycle events, written to the log.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use wothub_app::ports::{AdvertisedThing, DiscoveryAdvertiser};
use wothub_domain::error::WotError;
use wothub_domain::event::ServientEvent;

/// Logs the directory every time it changes.
#[derive(Debug, Default)]
pub struct LogAdvertiser;

#[async_trait]
impl DiscoveryAdvertiser for LogAdvertiser {
    async fn advertise(&self, things: &[AdvertisedThing]) -> Result<(), WotError> {
        tracing::info!(count = things.len(), "directory updated");
        for thing in things {
            let hrefs: Vec<&str> = thing.forms.iter().map(|form| form.href.as_str()).collect();
            tracing::debug!(thing = %thing.id, title = %thing.title, ?hrefs, "advertised");
        }
        Ok(())
    }
}

/// Log servient lifecycle events until the servient is dropped.
pub fn log_events(mut events: broadcast::Receiver<ServientEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(kind = ?event.kind, at = %event.timestamp, "servient event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "servient events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
