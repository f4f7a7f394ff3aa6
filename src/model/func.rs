//! # Functions, Bindings and Resolvers
//!
//! A `Func` names a handler the executor layer knows how to run. A
//! `FuncBinding` is one concrete set of arguments for a func, addressed by
//! the hash of its canonical JSON. A `Resolver` records the result of
//! running a binding in a context, so identical bindings are never
//! executed twice.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::ids::{LogicalId, SystemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FuncKind {
    /// Computes a property value
    Attribute,
    /// Produces generated code; changes emit `CodeGenerated`
    CodeGeneration,
    /// Dry-run check against a provider
    Qualification,
}

impl FuncKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuncKind::Attribute => "attribute",
            FuncKind::CodeGeneration => "codeGeneration",
            FuncKind::Qualification => "qualification",
        }
    }
}

/// A function definition referenced by prototypes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Func {
    pub name: String,

    pub kind: FuncKind,

    /// Handler name resolved by the function executor
    pub handler: String,
}

impl Func {
    pub fn new(name: impl Into<String>, kind: FuncKind, handler: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            handler: handler.into(),
        }
    }

    /// Hex sha256 of the definition. Changes whenever the func is edited.
    pub fn definition_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [self.name.as_str(), self.kind.as_str(), self.handler.as_str()] {
            hasher.update(part.len().to_be_bytes());
            hasher.update(part.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// The arguments one execution of a func receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncBinding {
    pub func_id: LogicalId,

    pub args: Value,

    /// Content hash of `args`, see [`binding_hash`]
    pub hash: String,
}

impl FuncBinding {
    pub fn new(func_id: LogicalId, args: Value) -> Self {
        let hash = binding_hash(&args);
        Self {
            func_id,
            args,
            hash,
        }
    }
}

/// Hex sha256 of the canonical JSON encoding of `args`.
///
/// Object keys are emitted in sorted order at every depth, so two values
/// that compare equal always hash the same.
pub fn binding_hash(args: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(args, &mut canonical);
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// The entity and system a binding was executed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolverContext {
    pub component_id: LogicalId,

    pub system_id: SystemId,
}

/// A cached execution result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolver {
    pub func_id: LogicalId,

    /// [`Func::definition_hash`] of the func that produced `result`
    #[serde(default)]
    pub func_hash: String,

    pub binding_hash: String,

    pub context: ResolverContext,

    pub result: Value,
}
