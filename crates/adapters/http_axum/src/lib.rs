//! # wothub-adapter-http-axum
//!
//! HTTP protocol binding built on [axum](https://docs.rs/axum) and
//! [reqwest](https://docs.rs/reqwest).
//!
//! ## Responsibilities
//! - [`HttpServer`] serves registered Things under `/things/{slug}`:
//!   properties are read with `GET` and written with `PUT`, actions are
//!   invoked with `POST`, observed properties and events are streamed as
//!   Server-Sent Events.
//! - [`HttpClient`] performs the same interactions against any `http` form.
//! - Failures travel as `{"error": message, "kind": kind}` with a matching
//!   status code so the client can rebuild the original error.
//!
//! ## Endpoints
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | `GET` | `/health` | liveness |
//! | `GET` | `/things` | every Thing Description |
//! | `GET` | `/things/{slug}` | one Thing Description |
//! | `GET` / `PUT` | `/things/{slug}/properties/{name}` | read / write |
//! | `GET` | `/things/{slug}/properties/{name}/observable` | SSE change stream |
//! | `POST` | `/things/{slug}/actions/{name}` | invoke |
//! | `GET` | `/things/{slug}/events/{name}` | SSE event stream |
//!
//! ## Dependency rule
//! Depends on `wothub-app` (port traits) and `wothub-domain`. Never leaks
//! axum or reqwest types into either.

mod api;
mod client;
mod config;
mod error;
mod router;
mod server;
mod state;

pub use client::HttpClient;
pub use config::HttpBindingConfig;
pub use error::{ErrorBody, HttpBindingError};
pub use server::HttpServer;
