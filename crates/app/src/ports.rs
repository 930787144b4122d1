//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the servient core and the transports.
//! They are defined here (in `app`) so that both the core and the adapter
//! crates can depend on them without creating circular dependencies.
//!
//! Unlike purely static ports, bindings are chosen at runtime by
//! [`BindingKind`](wothub_domain::form::BindingKind), so these traits are
//! object-safe and used as `Arc<dyn …>`.

pub mod binding;
pub mod discovery;

pub use binding::{BindingClient, BindingServer, ClientSubscription, InteractionHandler};
pub use discovery::{AdvertisedThing, DiscoveryAdvertiser};
