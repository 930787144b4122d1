//! # wothub-domain
//!
//! Pure domain model for the wothub Web-of-Things runtime.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, the error taxonomy, timestamps
//! - Define **Things** (devices or services with named interaction affordances)
//! - Define **Affordances** (properties, actions, events) and their **data schemas**
//! - Define **Forms** (binding-specific addresses through which an affordance is reached)
//! - Define **Thing Descriptions** (the published, form-annotated snapshot of a Thing)
//! - Define **Notifications** (encoded property changes and event emissions)
//! - Define **Servient events** (lifecycle records of the registry)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod affordance;
pub mod data_schema;
pub mod description;
pub mod event;
pub mod form;
pub mod notification;
pub mod thing;
