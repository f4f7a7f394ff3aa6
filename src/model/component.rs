//! # Components and Systems

use serde::{Deserialize, Serialize};

use crate::ids::LogicalId;

/// An instance of a schema variant in the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,

    pub schema_id: LogicalId,

    pub schema_variant_id: LogicalId,
}

impl Component {
    pub fn new(name: impl Into<String>, schema_id: LogicalId, schema_variant_id: LogicalId) -> Self {
        Self {
            name: name.into(),
            schema_id,
            schema_variant_id,
        }
    }
}

/// An environment components are deployed into (cluster, account, region).
///
/// Its logical id doubles as the `SystemId` used for per-system attribute
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub name: String,
}

impl System {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
