//! Discovery port: announces the local Things to the network.

use async_trait::async_trait;
use wothub_domain::error::WotError;
use wothub_domain::form::Form;
use wothub_domain::id::ThingId;

/// One entry of the advertised directory.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertisedThing {
    pub id: ThingId,
    pub title: String,
    pub forms: Vec<Form>,
}

/// Receives the complete directory after every registry change.
///
/// How the entries reach the network (multicast DNS, a directory service, a
/// log line) is up to the implementation. Calls are made under the
/// servient's writer lock, one at a time, so an advertiser must not register
/// or remove Things or bindings itself.
#[async_trait]
pub trait DiscoveryAdvertiser: Send + Sync {
    async fn advertise(&self, things: &[AdvertisedThing]) -> Result<(), WotError>;
}
