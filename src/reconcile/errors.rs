//! # Reconcile Errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::GraphError;
use crate::ids::{LogicalId, SystemId};
use crate::model::PropPath;
use crate::store::StoreError;

/// Result type for reconciliation
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Why a single provider call produced no output.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "camelCase")]
pub enum ProviderFailure {
    #[error("Provider call timed out after {0}ms")]
    Timeout(u64),

    #[error("Provider call canceled")]
    Canceled,

    #[error("Failed to start provider: {0}")]
    Spawn(String),

    #[error("Provider I/O error: {0}")]
    Io(String),

    #[error("Provider call could not be built: {0}")]
    InvalidCall(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Component not found: {0}")]
    UnknownComponent(LogicalId),

    /// `create` found a resource and made no provider call
    #[error("Resource already exists for component {component_id}")]
    AlreadyExists { component_id: LogicalId },

    #[error("Attribute {path} of component {component_id} on system {system_id} is not resolved")]
    MissingAttribute {
        component_id: LogicalId,
        system_id: SystemId,
        path: PropPath,
    },

    #[error("Provider failed for component {component_id} on system {system_id} (exit {exit_code:?}): {stderr}")]
    ProviderError {
        component_id: LogicalId,
        system_id: SystemId,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Provider call for component {component_id} on system {system_id} timed out after {timeout_ms}ms")]
    Timeout {
        component_id: LogicalId,
        system_id: SystemId,
        timeout_ms: u64,
    },
}

impl From<crate::tenancy::TenancyError> for ReconcileError {
    fn from(err: crate::tenancy::TenancyError) -> Self {
        ReconcileError::Store(err.into())
    }
}

impl ReconcileError {
    /// Wraps a failed call with the component and system it was made for.
    pub fn from_failure(component_id: LogicalId, system_id: SystemId, failure: ProviderFailure) -> Self {
        match failure {
            ProviderFailure::Timeout(timeout_ms) => ReconcileError::Timeout {
                component_id,
                system_id,
                timeout_ms,
            },
            other => ReconcileError::ProviderError {
                component_id,
                system_id,
                exit_code: None,
                stderr: other.to_string(),
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::Store(inner) => inner.code(),
            ReconcileError::Graph(inner) => inner.code(),
            ReconcileError::UnknownComponent(_) => "HALYARD_NOT_FOUND",
            ReconcileError::AlreadyExists { .. } => "HALYARD_ALREADY_EXISTS",
            ReconcileError::MissingAttribute { .. } => "HALYARD_CONSTRAINT_ERROR",
            ReconcileError::ProviderError { .. } => "HALYARD_PROVIDER_ERROR",
            ReconcileError::Timeout { .. } => "HALYARD_TIMEOUT",
        }
    }
}
