//! # Store Errors

use thiserror::Error;

use crate::ids::{ChangeSetId, LogicalId, VersionId};
use crate::tenancy::TenancyError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors. Any error returned from inside a transaction discards the
/// whole transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Tenancy(#[from] TenancyError),

    /// Write target not visible, already deleted, or on a closed branch
    #[error("Visibility conflict: {reason}")]
    VisibilityConflict {
        logical_id: Option<LogicalId>,
        change_set_id: Option<ChangeSetId>,
        reason: String,
    },

    /// Concurrent mutation detected on merge or optimistic update
    #[error("Apply conflict on {logical_id}: {reason}")]
    ApplyConflict {
        logical_id: LogicalId,
        change_set_id: Option<ChangeSetId>,
        reason: String,
    },

    #[error("Constraint violation: {0}")]
    ConstraintError(String),

    #[error("Entity not found: {0}")]
    NotFound(LogicalId),

    #[error("Version {attempted} committed out of order, expected {expected}")]
    OutOfOrder {
        attempted: VersionId,
        expected: VersionId,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn visibility(reason: impl Into<String>) -> Self {
        StoreError::VisibilityConflict {
            logical_id: None,
            change_set_id: None,
            reason: reason.into(),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Tenancy(inner) => inner.code(),
            StoreError::VisibilityConflict { .. } => "HALYARD_VISIBILITY_CONFLICT",
            StoreError::ApplyConflict { .. } => "HALYARD_APPLY_CONFLICT",
            StoreError::ConstraintError(_) | StoreError::OutOfOrder { .. } => {
                "HALYARD_CONSTRAINT_ERROR"
            }
            StoreError::NotFound(_) => "HALYARD_NOT_FOUND",
            StoreError::Serialization(_) => "HALYARD_SERIALIZATION",
            StoreError::Internal(_) => "HALYARD_INTERNAL",
        }
    }

    /// Logical id the error is about, when there is one.
    pub fn logical_id(&self) -> Option<LogicalId> {
        match self {
            StoreError::VisibilityConflict { logical_id, .. } => *logical_id,
            StoreError::ApplyConflict { logical_id, .. } => Some(*logical_id),
            StoreError::NotFound(logical_id) => Some(*logical_id),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let id = LogicalId::new();
        let err = StoreError::ApplyConflict {
            logical_id: id,
            change_set_id: None,
            reason: "head moved".into(),
        };
        assert_eq!(err.code(), "HALYARD_APPLY_CONFLICT");
        assert_eq!(err.logical_id(), Some(id));
        assert_eq!(
            StoreError::from(TenancyError::TenancyViolation("x".into())).code(),
            "HALYARD_TENANCY_VIOLATION"
        );
    }
}
