//! Entity Model
//!
//! Payload types stored in versioned rows. Every entity kind is one variant
//! of [`EntityPayload`]; the store never interprets payloads beyond their
//! kind and their own validation rules.

mod component;
mod diagram;
mod func;
mod prototype;
mod resource;
mod schema;
mod secret;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use component::{Component, System};
pub use diagram::{Edge, EdgeKind, Node, NodeKind, NodePosition, RelationDirection, Vertex};
pub use func::{binding_hash, Func, FuncBinding, FuncKind, Resolver, ResolverContext};
pub use prototype::{FuncRef, PropPath, Prototype, PrototypeContext, PrototypeInput};
pub use resource::{Health, Resource};
pub use schema::{Schema, SchemaKind, SchemaVariant};
pub use secret::{
    RedactedSecret, Secret, SecretAlgorithm, SecretKind, SecretObjectType, SecretVersion,
};

/// The payload of a versioned row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum EntityPayload {
    Schema(Schema),
    SchemaVariant(SchemaVariant),
    Component(Component),
    System(System),
    Node(Node),
    Edge(Edge),
    Func(Func),
    Prototype(Prototype),
    FuncBinding(FuncBinding),
    Resolver(Resolver),
    Resource(Resource),
    Secret(Secret),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Schema,
    SchemaVariant,
    Component,
    System,
    Node,
    Edge,
    Func,
    Prototype,
    FuncBinding,
    Resolver,
    Resource,
    Secret,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Schema => "schema",
            EntityKind::SchemaVariant => "schemaVariant",
            EntityKind::Component => "component",
            EntityKind::System => "system",
            EntityKind::Node => "node",
            EntityKind::Edge => "edge",
            EntityKind::Func => "func",
            EntityKind::Prototype => "prototype",
            EntityKind::FuncBinding => "funcBinding",
            EntityKind::Resolver => "resolver",
            EntityKind::Resource => "resource",
            EntityKind::Secret => "secret",
        };
        f.write_str(name)
    }
}

impl EntityPayload {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPayload::Schema(_) => EntityKind::Schema,
            EntityPayload::SchemaVariant(_) => EntityKind::SchemaVariant,
            EntityPayload::Component(_) => EntityKind::Component,
            EntityPayload::System(_) => EntityKind::System,
            EntityPayload::Node(_) => EntityKind::Node,
            EntityPayload::Edge(_) => EntityKind::Edge,
            EntityPayload::Func(_) => EntityKind::Func,
            EntityPayload::Prototype(_) => EntityKind::Prototype,
            EntityPayload::FuncBinding(_) => EntityKind::FuncBinding,
            EntityPayload::Resolver(_) => EntityKind::Resolver,
            EntityPayload::Resource(_) => EntityKind::Resource,
            EntityPayload::Secret(_) => EntityKind::Secret,
        }
    }

    /// Payload-local invariants. Returns the reason a payload is rejected.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            EntityPayload::Schema(schema) if schema.name.trim().is_empty() => {
                Err("schema name must not be empty".to_string())
            }
            EntityPayload::Component(component) if component.name.trim().is_empty() => {
                Err("component name must not be empty".to_string())
            }
            EntityPayload::System(system) if system.name.trim().is_empty() => {
                Err("system name must not be empty".to_string())
            }
            EntityPayload::Prototype(prototype) => {
                let mut paths = vec![&prototype.path];
                match &prototype.input {
                    PrototypeInput::Value { .. } => {}
                    PrototypeInput::CopySame { path }
                    | PrototypeInput::CopyRelated { path, .. }
                    | PrototypeInput::Aggregate { path, .. } => paths.push(path),
                }
                match paths.into_iter().find(|path| !path.is_well_formed()) {
                    Some(path) => Err(format!("malformed prop path '{}'", path)),
                    None => Ok(()),
                }
            }
            EntityPayload::FuncBinding(binding) if binding.hash != binding_hash(&binding.args) => {
                Err("func binding hash does not match its arguments".to_string())
            }
            EntityPayload::Secret(secret) if !secret.has_valid_ciphertext() => {
                Err(format!("secret '{}' has no valid ciphertext", secret.name))
            }
            _ => Ok(()),
        }
    }

    pub fn as_component(&self) -> Option<&Component> {
        match self {
            EntityPayload::Component(component) => Some(component),
            _ => None,
        }
    }

    pub fn as_prototype(&self) -> Option<&Prototype> {
        match self {
            EntityPayload::Prototype(prototype) => Some(prototype),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            EntityPayload::Edge(edge) => Some(edge),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&Func> {
        match self {
            EntityPayload::Func(func) => Some(func),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            EntityPayload::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    pub fn as_secret(&self) -> Option<&Secret> {
        match self {
            EntityPayload::Secret(secret) => Some(secret),
            _ => None,
        }
    }
}
