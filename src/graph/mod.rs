//! # Attribute Graph
//!
//! Computes property values from prototypes. Values are derived state held
//! per request scope; the store rows remain the only source of truth.

mod attribute;
mod cache;
mod dependency;
mod engine;
mod errors;
mod inputs;
mod relations;
mod schematic;
mod scopes;

pub use attribute::{AttributeKey, AttributeSet, AttributeState, AttributeValue, Provenance};
pub use cache::{CacheKey, CacheStats, ResolverCache};
pub use dependency::{DependencyGraph, InputPlan, NodeSpec};
pub use engine::{GraphEngine, RecomputeReport, ResolverConfig};
pub use errors::{GraphError, GraphResult};
pub use inputs::{GraphInputs, PrototypeEntry};
pub use relations::RelationIndex;
pub use schematic::{Schematic, SchematicNode};
pub use scopes::{AttributeStore, ScopeKey};
