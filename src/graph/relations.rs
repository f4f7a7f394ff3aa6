//! Relation index over diagram edges.

use std::collections::{BTreeMap, BTreeSet};

use crate::ids::LogicalId;
use crate::model::{Edge, EdgeKind, RelationDirection};

#[derive(Debug, Clone, Default)]
pub struct RelationIndex {
    related: BTreeMap<(LogicalId, EdgeKind, RelationDirection), BTreeSet<LogicalId>>,
}

impl RelationIndex {
    pub fn build<'a>(edges: impl IntoIterator<Item = &'a Edge>) -> Self {
        let mut index = Self::default();
        for edge in edges {
            let (tail, head) = (edge.tail.object_id, edge.head.object_id);
            index
                .related
                .entry((head, edge.kind, RelationDirection::Predecessors))
                .or_default()
                .insert(tail);
            index
                .related
                .entry((tail, edge.kind, RelationDirection::Successors))
                .or_default()
                .insert(head);
        }
        index
    }

    /// Related objects ordered by logical id.
    pub fn related(
        &self,
        object_id: LogicalId,
        kind: EdgeKind,
        direction: RelationDirection,
    ) -> Vec<LogicalId> {
        self.related
            .get(&(object_id, kind, direction))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All related objects by edge kind.
    pub fn connections(
        &self,
        object_id: LogicalId,
        direction: RelationDirection,
    ) -> BTreeMap<EdgeKind, Vec<LogicalId>> {
        self.related
            .iter()
            .filter(|((id, _, dir), _)| *id == object_id && *dir == direction)
            .map(|((_, kind, _), ids)| (*kind, ids.iter().copied().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Vertex;

    #[test]
    fn test_predecessors_and_successors() {
        let (a, b, c) = (LogicalId::new(), LogicalId::new(), LogicalId::new());
        let edges = vec![
            Edge::new(EdgeKind::Configures, Vertex::new(LogicalId::new(), a), Vertex::new(LogicalId::new(), c)),
            Edge::new(EdgeKind::Configures, Vertex::new(LogicalId::new(), b), Vertex::new(LogicalId::new(), c)),
        ];
        let index = RelationIndex::build(&edges);
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(
            index.related(c, EdgeKind::Configures, RelationDirection::Predecessors),
            expected
        );
        assert_eq!(
            index.related(a, EdgeKind::Configures, RelationDirection::Successors),
            vec![c]
        );
        assert!(index
            .related(c, EdgeKind::Includes, RelationDirection::Predecessors)
            .is_empty());
        assert_eq!(index.connections(c, RelationDirection::Predecessors).len(), 1);
    }
}
