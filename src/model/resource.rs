//! # Resources
//!
//! The provider-side record of a component as it exists in one system.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{LogicalId, SystemId};

/// Health of a resource. Ordered so that `max` is the worst.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Health {
    #[default]
    Ok,
    Warning,
    Error,
}

impl Health {
    /// Worst-of aggregation; an empty set is `Ok`.
    pub fn worst_of(items: impl IntoIterator<Item = Health>) -> Health {
        items.into_iter().max().unwrap_or(Health::Ok)
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Ok => write!(f, "ok"),
            Health::Warning => write!(f, "warning"),
            Health::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub component_id: LogicalId,

    pub system_id: SystemId,

    /// Provider output describing the resource
    #[serde(default)]
    pub data: Value,

    #[serde(default)]
    pub health: Health,
}

impl Resource {
    pub fn new(component_id: LogicalId, system_id: SystemId, data: Value, health: Health) -> Self {
        Self {
            component_id,
            system_id,
            data,
            health,
        }
    }
}
