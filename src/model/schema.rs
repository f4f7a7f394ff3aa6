//! # Schemas

use serde::{Deserialize, Serialize};

use crate::ids::LogicalId;

/// Broad category of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaKind {
    /// Abstract description of a thing (e.g. "a docker image")
    Concept,
    /// How a concept is realized on a provider
    Implementation,
    /// Directly reconcilable resource
    Concrete,
}

/// A type of component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,

    pub kind: SchemaKind,

    #[serde(default)]
    pub description: String,
}

impl Schema {
    pub fn new(name: impl Into<String>, kind: SchemaKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
        }
    }
}

/// One concrete variant of a schema (e.g. a provider API version).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVariant {
    pub schema_id: LogicalId,

    pub name: String,
}

impl SchemaVariant {
    pub fn new(schema_id: LogicalId, name: impl Into<String>) -> Self {
        Self {
            schema_id,
            name: name.into(),
        }
    }
}
