//! Crate-level error
//!
//! Every subsystem keeps its own error enum; `Error` unifies them for
//! callers that drive several subsystems at once.

use thiserror::Error;

use crate::config::ConfigError;
use crate::events::EventError;
use crate::functions::FunctionError;
use crate::graph::GraphError;
use crate::lifecycle::LifecycleError;
use crate::reconcile::ReconcileError;
use crate::store::StoreError;
use crate::tenancy::TenancyError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Tenancy(#[from] TenancyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Function(#[from] FunctionError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Tenancy(e) => e.code(),
            Error::Store(e) => e.code(),
            Error::Lifecycle(e) => e.code(),
            Error::Graph(e) => e.code(),
            Error::Function(e) => e.code(),
            Error::Reconcile(e) => e.code(),
            Error::Event(e) => e.code(),
            Error::Config(e) => e.code(),
        }
    }
}
