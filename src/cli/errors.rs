//! CLI-specific error types

use thiserror::Error;

use crate::config::ConfigError;
use crate::graph::GraphError;
use crate::lifecycle::LifecycleError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid fixture: {0}")]
    Fixture(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("I/O error: {0}")]
    Io(String),
}

impl CliError {
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(e) => e.code(),
            CliError::Fixture(_) => "HALYARD_CLI_FIXTURE_ERROR",
            CliError::Store(e) => e.code(),
            CliError::Lifecycle(e) => e.code(),
            CliError::Graph(e) => e.code(),
            CliError::Io(_) => "HALYARD_CLI_IO_ERROR",
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(format!("JSON error: {}", e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
