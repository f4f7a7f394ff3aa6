//! # Nodes and Edges
//!
//! Nodes place an object (component or system) on the diagram. Edges connect
//! two node vertices and carry a kind; the engine traverses edges of a
//! declared kind to find related entities.

use serde::{Deserialize, Serialize};

use crate::ids::LogicalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Component,
    System,
    Deployment,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

/// A diagram node pointing at an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,

    /// The component or system this node displays
    pub object_id: LogicalId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<NodePosition>,
}

impl Node {
    pub fn new(kind: NodeKind, object_id: LogicalId) -> Self {
        Self {
            kind,
            object_id,
            position: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(NodePosition { x, y });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    /// The tail configures the head (data flows tail to head)
    Configures,
    Deployment,
    Implementation,
    Component,
    /// A system (tail) includes a component (head)
    Includes,
}

/// One end of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub node_id: LogicalId,

    pub object_id: LogicalId,

    #[serde(default = "default_socket")]
    pub socket: String,
}

fn default_socket() -> String {
    "output".to_string()
}

impl Vertex {
    pub fn new(node_id: LogicalId, object_id: LogicalId) -> Self {
        Self {
            node_id,
            object_id,
            socket: default_socket(),
        }
    }

    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = socket.into();
        self
    }
}

/// A directed connection from `tail` to `head`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,

    pub tail: Vertex,

    pub head: Vertex,
}

impl Edge {
    pub fn new(kind: EdgeKind, tail: Vertex, head: Vertex) -> Self {
        Self { kind, tail, head }
    }
}

/// Which end of an edge a traversal follows from the starting object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RelationDirection {
    /// Objects at the tail of edges whose head is the start
    #[default]
    Predecessors,
    /// Objects at the head of edges whose tail is the start
    Successors,
}
