//! # Tenancy Errors

use thiserror::Error;

/// Result type for tenancy and visibility evaluation
pub type TenancyResult<T> = Result<T, TenancyError>;

/// Tenancy and visibility errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenancyError {
    /// Empty tenancy, or a row outside the caller's scope
    #[error("Tenancy violation: {0}")]
    TenancyViolation(String),

    /// Malformed visibility request
    #[error("Visibility conflict: {0}")]
    VisibilityConflict(String),
}

impl TenancyError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            TenancyError::TenancyViolation(_) => "HALYARD_TENANCY_VIOLATION",
            TenancyError::VisibilityConflict(_) => "HALYARD_VISIBILITY_CONFLICT",
        }
    }
}
