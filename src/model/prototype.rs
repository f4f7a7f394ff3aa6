//! # Prototypes
//!
//! A prototype declares how one property is computed in one applicability
//! context. The input shape decides which other properties it reads; the
//! func decides how the gathered input becomes the value.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::diagram::{EdgeKind, RelationDirection};
use crate::ids::{LogicalId, SystemId};

/// Slash-separated property path, e.g. `/domain/region`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropPath(String);

impl PropPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Paths are absolute and have no empty segments.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() > 1 && self.0.starts_with('/') && !self.0[1..].split('/').any(str::is_empty)
    }
}

impl fmt::Display for PropPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PropPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Where a prototype applies. Every field that is set must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrototypeContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<LogicalId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_variant_id: Option<LogicalId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<LogicalId>,

    /// `None` is the baseline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<SystemId>,
}

impl PrototypeContext {
    pub fn for_schema(schema_id: LogicalId) -> Self {
        Self {
            schema_id: Some(schema_id),
            ..Self::default()
        }
    }

    pub fn for_schema_variant(schema_variant_id: LogicalId) -> Self {
        Self {
            schema_variant_id: Some(schema_variant_id),
            ..Self::default()
        }
    }

    pub fn for_component(component_id: LogicalId) -> Self {
        Self {
            component_id: Some(component_id),
            ..Self::default()
        }
    }

    pub fn in_system(mut self, system_id: SystemId) -> Self {
        self.system_id = if system_id.is_baseline() {
            None
        } else {
            Some(system_id)
        };
        self
    }

    /// Whether the entity part of the context matches a component.
    pub fn applies_to(
        &self,
        component_id: LogicalId,
        schema_id: LogicalId,
        schema_variant_id: LogicalId,
    ) -> bool {
        self.component_id.map_or(true, |id| id == component_id)
            && self.schema_id.map_or(true, |id| id == schema_id)
            && self
                .schema_variant_id
                .map_or(true, |id| id == schema_variant_id)
    }

    pub fn system(&self) -> SystemId {
        self.system_id.unwrap_or(SystemId::BASELINE)
    }

    /// Specificity ordering: system, then component, then variant, then schema.
    pub fn specificity(&self) -> (bool, bool, bool, bool) {
        (
            self.system_id.is_some(),
            self.component_id.is_some(),
            self.schema_variant_id.is_some(),
            self.schema_id.is_some(),
        )
    }
}

/// Which values a prototype reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "camelCase")]
pub enum PrototypeInput {
    /// Direct assignment
    Value { value: Value },

    /// Another property of the same entity
    CopySame { path: PropPath },

    /// A property of the first related entity (ordered by logical id)
    CopyRelated {
        edge_kind: EdgeKind,
        #[serde(default)]
        direction: RelationDirection,
        path: PropPath,
    },

    /// A property of every related entity, as an ordered sequence
    Aggregate {
        edge_kind: EdgeKind,
        #[serde(default)]
        direction: RelationDirection,
        path: PropPath,
    },
}

/// The function turning gathered input into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "camelCase")]
pub enum FuncRef {
    /// Input passes through unchanged; never invokes an executor
    #[default]
    Identity,
    /// A `Func` entity executed through the resolver cache
    Func(LogicalId),
}

/// Binds a function to a property in an applicability context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    pub path: PropPath,

    #[serde(default)]
    pub context: PrototypeContext,

    pub input: PrototypeInput,

    #[serde(default)]
    pub func: FuncRef,

    /// Hand-set by a user rather than shipped with a schema
    #[serde(default)]
    pub authored: bool,
}

impl Prototype {
    /// A schema-level default value.
    pub fn value(path: impl Into<PropPath>, context: PrototypeContext, value: Value) -> Self {
        Self {
            path: path.into(),
            context,
            input: PrototypeInput::Value { value },
            func: FuncRef::Identity,
            authored: false,
        }
    }

    /// A user-authored value on one component.
    pub fn authored(
        path: impl Into<PropPath>,
        component_id: LogicalId,
        system_id: SystemId,
        value: Value,
    ) -> Self {
        Self {
            path: path.into(),
            context: PrototypeContext::for_component(component_id).in_system(system_id),
            input: PrototypeInput::Value { value },
            func: FuncRef::Identity,
            authored: true,
        }
    }

    pub fn copy_same(
        path: impl Into<PropPath>,
        context: PrototypeContext,
        from: impl Into<PropPath>,
    ) -> Self {
        Self {
            path: path.into(),
            context,
            input: PrototypeInput::CopySame { path: from.into() },
            func: FuncRef::Identity,
            authored: false,
        }
    }

    pub fn copy_related(
        path: impl Into<PropPath>,
        context: PrototypeContext,
        edge_kind: EdgeKind,
        from: impl Into<PropPath>,
    ) -> Self {
        Self {
            path: path.into(),
            context,
            input: PrototypeInput::CopyRelated {
                edge_kind,
                direction: RelationDirection::Predecessors,
                path: from.into(),
            },
            func: FuncRef::Identity,
            authored: false,
        }
    }

    pub fn aggregate(
        path: impl Into<PropPath>,
        context: PrototypeContext,
        edge_kind: EdgeKind,
        from: impl Into<PropPath>,
    ) -> Self {
        Self {
            path: path.into(),
            context,
            input: PrototypeInput::Aggregate {
                edge_kind,
                direction: RelationDirection::Predecessors,
                path: from.into(),
            },
            func: FuncRef::Identity,
            authored: false,
        }
    }

    pub fn with_func(mut self, func_id: LogicalId) -> Self {
        self.func = FuncRef::Func(func_id);
        self
    }

    pub fn with_direction(mut self, new_direction: RelationDirection) -> Self {
        match &mut self.input {
            PrototypeInput::CopyRelated { direction, .. }
            | PrototypeInput::Aggregate { direction, .. } => *direction = new_direction,
            PrototypeInput::Value { .. } | PrototypeInput::CopySame { .. } => {}
        }
        self
    }
}
