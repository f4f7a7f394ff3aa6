//! # Reconciliation
//!
//! Qualifies, creates and syncs the provider-side resources of components.

mod errors;
mod profile;
mod provider;
mod reconciler;

pub use errors::{ProviderFailure, ReconcileError, ReconcileResult};
pub use profile::{ArgTemplate, ProviderProfile, QualificationRule};
pub use provider::{ProcessProvider, Provider, ProviderCall, ProviderOutput, ScriptedProvider, ScriptedReply};
pub use reconciler::{
    CallOutcome, QualificationResult, ReconcileConfig, Reconciler, SyncReport, SystemSync,
};
