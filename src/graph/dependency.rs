//! Dependency graph
//!
//! One node per `(component, path, system)` that has a selected prototype.
//! An edge runs from every attribute a prototype reads to the attribute it
//! computes. Reads of a system without its own node fall back to the
//! baseline node.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use serde_json::Value;

use super::attribute::{AttributeKey, AttributeSet};
use super::errors::{GraphError, GraphResult};
use super::inputs::GraphInputs;
use crate::ids::LogicalId;
use crate::model::{PropPath, Prototype, PrototypeInput};

/// How a node's input is gathered.
#[derive(Debug, Clone, PartialEq)]
pub enum InputPlan {
    Value(Value),
    /// One attribute, or `Null` when there is none
    Read(Option<AttributeKey>),
    /// One entry per related entity, ordered by entity id
    Aggregate(Vec<(LogicalId, Option<AttributeKey>)>),
}

#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub key: AttributeKey,
    pub prototype_id: LogicalId,
    pub prototype: Prototype,
    pub plan: InputPlan,
}

impl NodeSpec {
    pub fn deps(&self) -> Vec<&AttributeKey> {
        match &self.plan {
            InputPlan::Value(_) => Vec::new(),
            InputPlan::Read(key) => key.iter().collect(),
            InputPlan::Aggregate(items) => items.iter().filter_map(|(_, key)| key.as_ref()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<AttributeKey, NodeSpec>,
    graph: DiGraph<AttributeKey, ()>,
    indices: HashMap<AttributeKey, NodeIndex>,
}

impl DependencyGraph {
    pub fn build(inputs: &GraphInputs) -> Self {
        let systems = inputs.evaluated_systems();

        let mut selected = BTreeMap::new();
        for component_id in inputs.components.keys() {
            for path in inputs.paths_for(*component_id) {
                for system_id in &systems {
                    if let Some(entry) = inputs.select(*component_id, path, *system_id) {
                        selected.insert(AttributeKey::new(*component_id, path.clone(), *system_id), entry);
                    }
                }
            }
        }

        let read_key = |entity_id: LogicalId, key: &AttributeKey, path: PropPath| {
            let wanted = AttributeKey::new(entity_id, path, key.system_id);
            if selected.contains_key(&wanted) {
                Some(wanted)
            } else {
                let baseline = wanted.to_baseline();
                selected.contains_key(&baseline).then_some(baseline)
            }
        };

        let mut nodes = BTreeMap::new();
        for (key, entry) in &selected {
            let plan = match &entry.prototype.input {
                PrototypeInput::Value { value } => InputPlan::Value(value.clone()),
                PrototypeInput::CopySame { path } => {
                    InputPlan::Read(read_key(key.entity_id, key, path.clone()))
                }
                PrototypeInput::CopyRelated {
                    edge_kind,
                    direction,
                    path,
                } => {
                    let first = inputs
                        .relations
                        .related(key.entity_id, *edge_kind, *direction)
                        .into_iter()
                        .find(|id| inputs.components.contains_key(id));
                    InputPlan::Read(first.and_then(|id| read_key(id, key, path.clone())))
                }
                PrototypeInput::Aggregate {
                    edge_kind,
                    direction,
                    path,
                } => InputPlan::Aggregate(
                    inputs
                        .relations
                        .related(key.entity_id, *edge_kind, *direction)
                        .into_iter()
                        .filter(|id| inputs.components.contains_key(id))
                        .map(|id| (id, read_key(id, key, path.clone())))
                        .collect(),
                ),
            };
            nodes.insert(
                key.clone(),
                NodeSpec {
                    key: key.clone(),
                    prototype_id: entry.id,
                    prototype: entry.prototype.clone(),
                    plan,
                },
            );
        }

        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for key in nodes.keys() {
            indices.insert(key.clone(), graph.add_node(key.clone()));
        }
        for node in nodes.values() {
            let to = indices[&node.key];
            for dep in node.deps() {
                if let Some(from) = indices.get(dep) {
                    graph.update_edge(*from, to, ());
                }
            }
        }

        Self {
            nodes,
            graph,
            indices,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, key: &AttributeKey) -> Option<&NodeSpec> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &AttributeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &AttributeKey> {
        self.nodes.keys()
    }

    /// Nodes a pass must start from: every changed key (a baseline key
    /// stands for all systems of that property) and every node the
    /// previous set has never seen.
    pub fn roots(&self, changed: &[AttributeKey], previous: &AttributeSet) -> BTreeSet<AttributeKey> {
        let mut roots = BTreeSet::new();
        for key in changed {
            if key.system_id.is_baseline() {
                roots.extend(
                    self.nodes
                        .keys()
                        .filter(|k| k.entity_id == key.entity_id && k.path == key.path)
                        .cloned(),
                );
            } else if self.contains(key) {
                roots.insert(key.clone());
            }
        }
        roots.extend(self.nodes.keys().filter(|k| !previous.contains(k)).cloned());
        roots
    }

    /// Evaluation levels for everything reachable from `roots`.
    ///
    /// Every node of a level depends only on nodes of earlier levels or on
    /// nodes outside the pass. Fails before anything is evaluated if the
    /// reachable subgraph has a cycle.
    pub fn levels(&self, roots: &BTreeSet<AttributeKey>) -> GraphResult<Vec<Vec<AttributeKey>>> {
        let starts: Vec<NodeIndex> = roots
            .iter()
            .filter_map(|key| self.indices.get(key).copied())
            .collect();
        if starts.is_empty() {
            return Ok(Vec::new());
        }

        let mut reachable = BTreeSet::new();
        for start in starts {
            if reachable.contains(&start) {
                continue;
            }
            let mut bfs = Bfs::new(&self.graph, start);
            while let Some(index) = bfs.next(&self.graph) {
                reachable.insert(index);
            }
        }

        let sub = self.graph.filter_map(
            |index, key| reachable.contains(&index).then(|| key.clone()),
            |_, edge| Some(*edge),
        );

        let mut cyclic: Vec<AttributeKey> = tarjan_scc(&sub)
            .into_iter()
            .filter(|scc| scc.len() > 1 || sub.contains_edge(scc[0], scc[0]))
            .flatten()
            .map(|index| sub[index].clone())
            .collect();
        if !cyclic.is_empty() {
            cyclic.sort();
            return Err(GraphError::CycleDetected { nodes: cyclic });
        }

        let order = toposort(&sub, None).map_err(|cycle| GraphError::CycleDetected {
            nodes: vec![sub[cycle.node_id()].clone()],
        })?;

        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        let mut levels: Vec<Vec<AttributeKey>> = Vec::new();
        for index in order {
            let level = sub
                .neighbors_directed(index, Direction::Incoming)
                .filter_map(|dep| depth.get(&dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(index, level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(sub[index].clone());
        }
        for level in &mut levels {
            level.sort();
        }
        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::inputs::PrototypeEntry;
    use crate::ids::{SystemId, VersionId};
    use crate::model::{Component, Edge, EdgeKind, PrototypeContext, Vertex};
    use crate::graph::relations::RelationIndex;
    use serde_json::json;

    struct Fixture {
        inputs: GraphInputs,
        schema: LogicalId,
        version: u64,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                inputs: GraphInputs::default(),
                schema: LogicalId::new(),
                version: 0,
            }
        }

        fn component(&mut self) -> LogicalId {
            let id = LogicalId::new();
            self.inputs
                .components
                .insert(id, Component::new("c", self.schema, LogicalId::new()));
            id
        }

        fn prototype(&mut self, prototype: Prototype) {
            self.version += 1;
            self.inputs
                .prototypes
                .entry(prototype.path.clone())
                .or_default()
                .push(PrototypeEntry {
                    id: LogicalId::new(),
                    version_id: VersionId::new(self.version),
                    prototype,
                });
        }

        fn schema_ctx(&self) -> PrototypeContext {
            PrototypeContext::for_schema(self.schema)
        }
    }

    #[test]
    fn test_copy_same_levels() {
        let mut f = Fixture::new();
        let c = f.component();
        let ctx = f.schema_ctx();
        f.prototype(Prototype::value("/a", ctx, json!(1)));
        f.prototype(Prototype::copy_same("/b", ctx, "/a"));
        f.prototype(Prototype::copy_same("/c", ctx, "/b"));
        let graph = DependencyGraph::build(&f.inputs);
        assert_eq!(graph.len(), 3);

        let roots = BTreeSet::from([AttributeKey::baseline(c, "/a")]);
        let levels = graph.levels(&roots).unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[2], vec![AttributeKey::baseline(c, "/c")]);
    }

    #[test]
    fn test_levels_cover_every_root() {
        let mut f = Fixture::new();
        let c = f.component();
        let ctx = f.schema_ctx();
        f.prototype(Prototype::value("/a", ctx, json!(1)));
        f.prototype(Prototype::copy_same("/b", ctx, "/a"));
        f.prototype(Prototype::value("/x", ctx, json!(2)));
        f.prototype(Prototype::copy_same("/y", ctx, "/x"));
        f.prototype(Prototype::value("/z", ctx, json!(3)));
        let graph = DependencyGraph::build(&f.inputs);

        let roots = BTreeSet::from([AttributeKey::baseline(c, "/a"), AttributeKey::baseline(c, "/x")]);
        let levels = graph.levels(&roots).unwrap();
        let mut reached: Vec<AttributeKey> = levels.into_iter().flatten().collect();
        reached.sort();
        let mut expected: Vec<AttributeKey> = ["/a", "/b", "/x", "/y"]
            .iter()
            .map(|path| AttributeKey::baseline(c, *path))
            .collect();
        expected.sort();
        assert_eq!(reached, expected);
    }

    #[test]
    fn test_cycle_detected() {
        let mut f = Fixture::new();
        let c = f.component();
        let ctx = f.schema_ctx();
        f.prototype(Prototype::copy_same("/a", ctx, "/b"));
        f.prototype(Prototype::copy_same("/b", ctx, "/a"));
        let graph = DependencyGraph::build(&f.inputs);
        let roots = BTreeSet::from([AttributeKey::baseline(c, "/a")]);
        match graph.levels(&roots) {
            Err(GraphError::CycleDetected { nodes }) => assert_eq!(nodes.len(), 2),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_loop_detected() {
        let mut f = Fixture::new();
        let c = f.component();
        let ctx = f.schema_ctx();
        f.prototype(Prototype::copy_same("/a", ctx, "/a"));
        let graph = DependencyGraph::build(&f.inputs);
        let roots = BTreeSet::from([AttributeKey::baseline(c, "/a")]);
        assert!(matches!(
            graph.levels(&roots),
            Err(GraphError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_system_read_falls_back_to_baseline() {
        let mut f = Fixture::new();
        let c = f.component();
        let ctx = f.schema_ctx();
        let system = SystemId::from_logical(LogicalId::new());
        f.prototype(Prototype::value("/a", ctx, json!("base")));
        f.prototype(Prototype::copy_same("/b", ctx, "/a"));
        f.prototype(Prototype::value("/b", ctx.in_system(system), json!("override")));
        let graph = DependencyGraph::build(&f.inputs);

        // A candidate without a system applies to the override system too.
        let a_system = graph.node(&AttributeKey::new(c, "/a", system)).unwrap();
        assert_eq!(a_system.plan, InputPlan::Value(json!("base")));
        let b_system = graph.node(&AttributeKey::new(c, "/b", system)).unwrap();
        assert_eq!(b_system.plan, InputPlan::Value(json!("override")));
        let b_base = graph.node(&AttributeKey::baseline(c, "/b")).unwrap();
        assert_eq!(b_base.plan, InputPlan::Read(Some(AttributeKey::baseline(c, "/a"))));
    }

    #[test]
    fn test_aggregate_reads_every_related_entity() {
        let mut f = Fixture::new();
        let (a, b, target) = (f.component(), f.component(), f.component());
        let ctx = f.schema_ctx();
        f.prototype(Prototype::value("/name", ctx, json!("n")));
        f.prototype(Prototype::aggregate("/inputs", PrototypeContext::for_component(target), EdgeKind::Configures, "/name"));
        let edges = [
            Edge::new(EdgeKind::Configures, Vertex::new(LogicalId::new(), a), Vertex::new(LogicalId::new(), target)),
            Edge::new(EdgeKind::Configures, Vertex::new(LogicalId::new(), b), Vertex::new(LogicalId::new(), target)),
        ];
        f.inputs.relations = RelationIndex::build(&edges);
        let graph = DependencyGraph::build(&f.inputs);

        let node = graph.node(&AttributeKey::baseline(target, "/inputs")).unwrap();
        assert_eq!(node.deps().len(), 2);
    }

    #[test]
    fn test_new_nodes_are_roots() {
        let mut f = Fixture::new();
        let c = f.component();
        let ctx = f.schema_ctx();
        f.prototype(Prototype::value("/a", ctx, json!(1)));
        let graph = DependencyGraph::build(&f.inputs);
        let roots = graph.roots(&[], &AttributeSet::new());
        assert!(roots.contains(&AttributeKey::baseline(c, "/a")));
    }
}
