//! # Graph Errors

use thiserror::Error;

use super::attribute::AttributeKey;
use crate::ids::LogicalId;
use crate::store::StoreError;

/// Result type for dependency graph operations
pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The recompute pass was aborted before evaluating anything
    #[error("Dependency cycle detected through {} attributes", nodes.len())]
    CycleDetected { nodes: Vec<AttributeKey> },

    #[error("Component not found: {0}")]
    UnknownComponent(LogicalId),

    #[error("Invalid prop path: {0}")]
    InvalidPath(String),
}

impl From<crate::tenancy::TenancyError> for GraphError {
    fn from(err: crate::tenancy::TenancyError) -> Self {
        GraphError::Store(err.into())
    }
}

impl GraphError {
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::Store(inner) => inner.code(),
            GraphError::CycleDetected { .. } => "HALYARD_CYCLE_DETECTED",
            GraphError::UnknownComponent(_) => "HALYARD_NOT_FOUND",
            GraphError::InvalidPath(_) => "HALYARD_CONSTRAINT_ERROR",
        }
    }
}
