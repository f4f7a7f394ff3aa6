//! # Function Errors

use thiserror::Error;

/// Result type for function execution
pub type FunctionResult<T> = Result<T, FunctionError>;

/// Function errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FunctionError {
    #[error("Function handler not found: {0}")]
    NotFound(String),

    #[error("Function handler already registered: {0}")]
    AlreadyExists(String),

    #[error("Function timeout after {0}ms")]
    Timeout(u64),

    /// The function ran and reported failure
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// The function's output could not be understood
    #[error("Invalid function output: {0}")]
    InvalidOutput(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FunctionError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            FunctionError::Timeout(_) => "HALYARD_TIMEOUT",
            FunctionError::AlreadyExists(_) => "HALYARD_CONSTRAINT_ERROR",
            FunctionError::Internal(_) => "HALYARD_INTERNAL",
            FunctionError::NotFound(_)
            | FunctionError::RuntimeError(_)
            | FunctionError::InvalidOutput(_)
            | FunctionError::Io(_) => "HALYARD_RESOLVER_ERROR",
        }
    }
}

impl From<std::io::Error> for FunctionError {
    fn from(err: std::io::Error) -> Self {
        FunctionError::Io(err.to_string())
    }
}
