//! Graph inputs: the rows one recompute pass reads, resolved once from a
//! store snapshot.

use std::collections::{BTreeMap, BTreeSet};

use super::relations::RelationIndex;
use crate::ids::{LogicalId, SystemId, VersionId};
use crate::model::{Component, Edge, EntityPayload, Func, PropPath, Prototype, Resolver};
use crate::store::{RequestContext, StoreResult, StoreSnapshot};

#[derive(Debug, Clone)]
pub struct PrototypeEntry {
    pub id: LogicalId,
    pub version_id: VersionId,
    pub prototype: Prototype,
}

#[derive(Debug, Clone, Default)]
pub struct GraphInputs {
    pub components: BTreeMap<LogicalId, Component>,
    pub prototypes: BTreeMap<PropPath, Vec<PrototypeEntry>>,
    pub funcs: BTreeMap<LogicalId, Func>,
    pub systems: BTreeSet<SystemId>,
    pub edges: BTreeMap<LogicalId, Edge>,
    pub relations: RelationIndex,
    pub resolvers: Vec<Resolver>,
    pub watermark: VersionId,
}

impl GraphInputs {
    pub fn load(snapshot: &StoreSnapshot, ctx: &RequestContext) -> StoreResult<Self> {
        let mut inputs = GraphInputs {
            watermark: snapshot.watermark(),
            ..Self::default()
        };

        for row in snapshot.resolve_all(ctx, false)? {
            match &row.payload {
                EntityPayload::Component(component) => {
                    inputs.components.insert(row.logical_id, component.clone());
                }
                EntityPayload::Prototype(prototype) => {
                    inputs
                        .prototypes
                        .entry(prototype.path.clone())
                        .or_default()
                        .push(PrototypeEntry {
                            id: row.logical_id,
                            version_id: row.version_id,
                            prototype: prototype.clone(),
                        });
                }
                EntityPayload::Func(func) => {
                    inputs.funcs.insert(row.logical_id, func.clone());
                }
                EntityPayload::System(_) => {
                    inputs.systems.insert(SystemId::from_logical(row.logical_id));
                }
                EntityPayload::Edge(edge) => {
                    inputs.edges.insert(row.logical_id, edge.clone());
                }
                EntityPayload::Resolver(resolver) => inputs.resolvers.push(resolver.clone()),
                _ => {}
            }
        }

        inputs.relations = RelationIndex::build(inputs.edges.values());
        Ok(inputs)
    }

    /// Persisted resolvers whose func still has the definition they ran with.
    pub fn current_resolvers(&self) -> impl Iterator<Item = &Resolver> + '_ {
        self.resolvers.iter().filter(|resolver| {
            self.funcs
                .get(&resolver.func_id)
                .map_or(false, |func| func.definition_hash() == resolver.func_hash)
        })
    }

    /// Baseline plus every system some prototype overrides.
    pub fn evaluated_systems(&self) -> BTreeSet<SystemId> {
        let mut systems = BTreeSet::from([SystemId::BASELINE]);
        systems.extend(
            self.prototypes
                .values()
                .flatten()
                .filter_map(|entry| entry.prototype.context.system_id),
        );
        systems
    }

    /// The prototype computing `path` of `component_id` on `system_id`.
    ///
    /// Candidates must match the path and every context field they define.
    /// A candidate without a system applies to every system. The most
    /// specific candidate wins; ties go to the newest version.
    pub fn select(
        &self,
        component_id: LogicalId,
        path: &PropPath,
        system_id: SystemId,
    ) -> Option<&PrototypeEntry> {
        let component = self.components.get(&component_id)?;
        self.prototypes
            .get(path)?
            .iter()
            .filter(|entry| {
                entry.prototype.context.applies_to(
                    component_id,
                    component.schema_id,
                    component.schema_variant_id,
                )
            })
            .filter(|entry| {
                entry
                    .prototype
                    .context
                    .system_id
                    .map_or(true, |system| system == system_id)
            })
            .max_by_key(|entry| (entry.prototype.context.specificity(), entry.version_id))
    }

    /// Paths with at least one prototype applicable to the component.
    pub fn paths_for(&self, component_id: LogicalId) -> Vec<&PropPath> {
        let Some(component) = self.components.get(&component_id) else {
            return Vec::new();
        };
        self.prototypes
            .iter()
            .filter(|(_, entries)| {
                entries.iter().any(|entry| {
                    entry.prototype.context.applies_to(
                        component_id,
                        component.schema_id,
                        component.schema_variant_id,
                    )
                })
            })
            .map(|(path, _)| path)
            .collect()
    }
}
