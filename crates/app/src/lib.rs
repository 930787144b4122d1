//! # wothub-app
//!
//! Servient core: **port definitions** (traits) and the runtime built on them.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - `BindingServer`: expose local Things on a transport
//!   - `BindingClient`: interact with remote Things through their forms
//!   - `DiscoveryAdvertiser`: announce the local directory
//! - Define the **inbound port** servers call into: `InteractionHandler`
//! - Provide the **in-process infrastructure** that doesn't need IO:
//!   - `CodecRegistry`: media type ↔ value conversion
//!   - `SubscriptionHub`: cross-binding notification fan-out
//!   - `InProcessEventBus`: servient lifecycle events
//! - Host Things: `ExposedThing` (local state), `ConsumedThing` (remote
//!   access), `Servient` (registry and binding lifecycle)
//!
//! ## Dependency rule
//! Depends on `wothub-domain` only (plus `tokio` for channels, tasks and
//! timers). Never imports adapter crates. Adapters depend on *this* crate,
//! not the reverse.

pub mod codec;
pub mod consumed;
pub mod event_bus;
pub mod exposed;
pub mod hub;
pub mod ports;
pub mod servient;

pub use consumed::{ConsumedThing, FirstAvailable, FormSelector, PreferBindings};
pub use exposed::ExposedThing;
pub use servient::{Servient, ServientBuilder};
