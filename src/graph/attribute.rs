//! # Attribute Values
//!
//! Derived, cached values keyed by `(entity, path, system)`. Never the
//! source of truth: an `AttributeSet` can always be rebuilt from rows.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{LogicalId, SystemId};
use crate::model::PropPath;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeKey {
    pub entity_id: LogicalId,

    pub path: PropPath,

    pub system_id: SystemId,
}

impl AttributeKey {
    pub fn new(entity_id: LogicalId, path: impl Into<PropPath>, system_id: SystemId) -> Self {
        Self {
            entity_id,
            path: path.into(),
            system_id,
        }
    }

    pub fn baseline(entity_id: LogicalId, path: impl Into<PropPath>) -> Self {
        Self::new(entity_id, path, SystemId::BASELINE)
    }

    /// The same property on the baseline system.
    pub fn to_baseline(&self) -> Self {
        Self {
            entity_id: self.entity_id,
            path: self.path.clone(),
            system_id: SystemId::BASELINE,
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}@{}", self.entity_id, self.path, self.system_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum AttributeState {
    Resolved { value: Value },
    /// The function failed or timed out
    Failed { message: String },
    /// A dependency is failed or unresolved
    Unresolved { blocked_by: Vec<AttributeKey> },
}

impl AttributeState {
    pub fn value(&self) -> Option<&Value> {
        match self {
            AttributeState::Resolved { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, AttributeState::Resolved { .. })
    }
}

/// Where a value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum Provenance {
    Authored { prototype_id: LogicalId },
    Prototype { prototype_id: LogicalId },
    Resolver { func_id: LogicalId, binding_hash: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub key: AttributeKey,

    pub state: AttributeState,

    pub provenance: Provenance,
}

/// All attribute values of one `(tenant, change set, edit session)` scope,
/// ordered by key. Serializes as an ordered list, so equal sets always
/// produce identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<AttributeValue>", into = "Vec<AttributeValue>")]
pub struct AttributeSet {
    values: BTreeMap<AttributeKey, AttributeValue>,
}

impl From<Vec<AttributeValue>> for AttributeSet {
    fn from(values: Vec<AttributeValue>) -> Self {
        Self {
            values: values.into_iter().map(|v| (v.key.clone(), v)).collect(),
        }
    }
}

impl From<AttributeSet> for Vec<AttributeValue> {
    fn from(set: AttributeSet) -> Self {
        set.values.into_values().collect()
    }
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &AttributeKey) -> Option<&AttributeValue> {
        self.values.get(key)
    }

    /// The value for a key, falling back to the baseline system.
    pub fn lookup(&self, key: &AttributeKey) -> Option<&AttributeValue> {
        self.values
            .get(key)
            .or_else(|| self.values.get(&key.to_baseline()))
    }

    /// Resolved value of `(entity, path)` on `system`, with baseline fallback.
    pub fn resolved(&self, entity_id: LogicalId, path: &str, system_id: SystemId) -> Option<&Value> {
        self.lookup(&AttributeKey::new(entity_id, path, system_id))
            .and_then(|v| v.state.value())
    }

    pub fn contains(&self, key: &AttributeKey) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, value: AttributeValue) {
        self.values.insert(value.key.clone(), value);
    }

    pub fn remove(&mut self, key: &AttributeKey) -> Option<AttributeValue> {
        self.values.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeValue> {
        self.values.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &AttributeKey> {
        self.values.keys()
    }

    /// Every value of one entity.
    pub fn for_entity(&self, entity_id: LogicalId) -> impl Iterator<Item = &AttributeValue> {
        self.values
            .values()
            .filter(move |v| v.key.entity_id == entity_id)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&AttributeKey) -> bool) {
        self.values.retain(|key, _| keep(key));
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolved(key: AttributeKey, value: Value) -> AttributeValue {
        AttributeValue {
            key,
            state: AttributeState::Resolved { value },
            provenance: Provenance::Prototype {
                prototype_id: LogicalId::new(),
            },
        }
    }

    #[test]
    fn test_lookup_falls_back_to_baseline() {
        let c = LogicalId::new();
        let system = SystemId::from_logical(LogicalId::new());
        let mut set = AttributeSet::new();
        set.insert(resolved(AttributeKey::baseline(c, "/region"), json!("us-east-1")));
        assert_eq!(set.resolved(c, "/region", system), Some(&json!("us-east-1")));

        set.insert(resolved(AttributeKey::new(c, "/region", system), json!("eu-west-1")));
        assert_eq!(set.resolved(c, "/region", system), Some(&json!("eu-west-1")));
        assert_eq!(set.resolved(c, "/region", SystemId::BASELINE), Some(&json!("us-east-1")));
    }

    #[test]
    fn test_serialization_is_order_independent() {
        let c = LogicalId::new();
        let a = resolved(AttributeKey::baseline(c, "/a"), json!(1));
        let b = resolved(AttributeKey::baseline(c, "/b"), json!(2));

        let mut first = AttributeSet::new();
        first.insert(a.clone());
        first.insert(b.clone());
        let mut second = AttributeSet::new();
        second.insert(b);
        second.insert(a);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());

        let back: AttributeSet = serde_json::from_slice(&first.to_json().unwrap()).unwrap();
        assert_eq!(back, first);
    }
}
