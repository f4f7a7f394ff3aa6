//! halyard - A branch-aware, multi-tenant infrastructure model
//!
//! Entities are versioned rows scoped by tenancy and visibility. Edits land
//! in edit sessions, are saved into change sets and applied onto head.
//! Attribute values are derived through a dependency graph of prototypes
//! and functions, and components are reconciled against external providers.

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod functions;
pub mod graph;
pub mod ids;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod reconcile;
pub mod secrets;
pub mod store;
pub mod tenancy;

pub use error::{Error, Result};
