//! Schematic: the part of the diagram reachable from one component.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use super::errors::{GraphError, GraphResult};
use super::relations::RelationIndex;
use crate::ids::LogicalId;
use crate::model::{Edge, EdgeKind, EntityKind, EntityPayload, RelationDirection};
use crate::store::{RequestContext, Store};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchematicNode {
    pub object_id: LogicalId,

    pub kind: EntityKind,

    pub name: String,

    pub predecessors: BTreeMap<EdgeKind, Vec<LogicalId>>,

    pub successors: BTreeMap<EdgeKind, Vec<LogicalId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schematic {
    pub root: LogicalId,

    pub nodes: BTreeMap<LogicalId, SchematicNode>,

    /// Edges between included nodes, by edge logical id
    pub edges: BTreeMap<LogicalId, Edge>,
}

impl Schematic {
    /// Walks edges of `edge_kinds` in both directions from `root`.
    pub fn build(
        store: &Store,
        ctx: &RequestContext,
        root: LogicalId,
        edge_kinds: &[EdgeKind],
    ) -> GraphResult<Self> {
        let snapshot = store.snapshot()?;
        let rows = snapshot.resolve_all(ctx, false)?;

        let mut names = BTreeMap::new();
        let mut all_edges = BTreeMap::new();
        for row in &rows {
            match &row.payload {
                EntityPayload::Component(component) => {
                    names.insert(row.logical_id, (EntityKind::Component, component.name.clone()));
                }
                EntityPayload::System(system) => {
                    names.insert(row.logical_id, (EntityKind::System, system.name.clone()));
                }
                EntityPayload::Edge(edge) if edge_kinds.contains(&edge.kind) => {
                    all_edges.insert(row.logical_id, edge.clone());
                }
                _ => {}
            }
        }
        if names.get(&root).map(|(kind, _)| *kind) != Some(EntityKind::Component) {
            return Err(GraphError::UnknownComponent(root));
        }

        let relations = RelationIndex::build(all_edges.values());
        let mut included = BTreeSet::from([root]);
        let mut queue = VecDeque::from([root]);
        while let Some(object_id) = queue.pop_front() {
            for direction in [RelationDirection::Predecessors, RelationDirection::Successors] {
                for kind in edge_kinds {
                    for next in relations.related(object_id, *kind, direction) {
                        if names.contains_key(&next) && included.insert(next) {
                            queue.push_back(next);
                        }
                    }
                }
            }
        }

        let connections = |object_id: LogicalId, direction| {
            relations
                .connections(object_id, direction)
                .into_iter()
                .map(|(kind, ids)| {
                    let ids: Vec<LogicalId> = ids.into_iter().filter(|id| included.contains(id)).collect();
                    (kind, ids)
                })
                .filter(|(_, ids)| !ids.is_empty())
                .collect::<BTreeMap<_, _>>()
        };

        let nodes = included
            .iter()
            .filter_map(|object_id| {
                let (kind, name) = names.get(object_id)?;
                Some((
                    *object_id,
                    SchematicNode {
                        object_id: *object_id,
                        kind: *kind,
                        name: name.clone(),
                        predecessors: connections(*object_id, RelationDirection::Predecessors),
                        successors: connections(*object_id, RelationDirection::Successors),
                    },
                ))
            })
            .collect();

        let edges = all_edges
            .into_iter()
            .filter(|(_, edge)| {
                included.contains(&edge.tail.object_id) && included.contains(&edge.head.object_id)
            })
            .collect();

        Ok(Self { root, nodes, edges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorkspaceId;
    use crate::model::{Component, System, Vertex};
    use crate::tenancy::TenancyContext;

    #[test]
    fn test_walks_only_requested_kinds() {
        let store = Store::new();
        let ctx = RequestContext::head(TenancyContext::for_workspace(WorkspaceId::new()));
        let create = |payload| store.create(&ctx, payload).unwrap().logical_id;
        let component = |name: &str| {
            EntityPayload::Component(Component::new(name, LogicalId::new(), LogicalId::new()))
        };

        let (a, b, c) = (create(component("a")), create(component("b")), create(component("c")));
        let system = create(EntityPayload::System(System::new("prod")));
        let edge = |kind, tail, head| {
            EntityPayload::Edge(Edge::new(kind, Vertex::new(LogicalId::new(), tail), Vertex::new(LogicalId::new(), head)))
        };
        create(edge(EdgeKind::Configures, a, b));
        create(edge(EdgeKind::Configures, b, c));
        create(edge(EdgeKind::Includes, system, a));

        let schematic = Schematic::build(&store, &ctx, b, &[EdgeKind::Configures]).unwrap();
        assert_eq!(schematic.nodes.len(), 3);
        assert_eq!(schematic.edges.len(), 2);
        let node_b = &schematic.nodes[&b];
        assert_eq!(node_b.predecessors[&EdgeKind::Configures], vec![a]);
        assert_eq!(node_b.successors[&EdgeKind::Configures], vec![c]);

        let with_systems =
            Schematic::build(&store, &ctx, b, &[EdgeKind::Configures, EdgeKind::Includes]).unwrap();
        assert_eq!(with_systems.nodes[&system].kind, EntityKind::System);

        assert!(matches!(
            Schematic::build(&store, &ctx, system, &[EdgeKind::Includes]),
            Err(GraphError::UnknownComponent(_))
        ));
    }
}
