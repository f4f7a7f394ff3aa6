//! # Lifecycle Errors

use thiserror::Error;

use crate::store::StoreError;

/// Result type for change-set and edit-session operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Transition not allowed from the current state
    #[error("Invalid transition: cannot {action} {branch} while {state}")]
    InvalidTransition {
        branch: String,
        state: String,
        action: &'static str,
    },

    #[error("Branch not found: {0}")]
    NotFound(String),
}

impl From<crate::tenancy::TenancyError> for LifecycleError {
    fn from(err: crate::tenancy::TenancyError) -> Self {
        LifecycleError::Store(err.into())
    }
}

impl LifecycleError {
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::Store(inner) => inner.code(),
            LifecycleError::InvalidTransition { .. } => "HALYARD_INVALID_TRANSITION",
            LifecycleError::NotFound(_) => "HALYARD_NOT_FOUND",
        }
    }
}
