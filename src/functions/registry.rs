//! # Builtin Executor
//!
//! In-process handlers registered by name. Ships with a small set of
//! builtins; embedders register their own.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::errors::{FunctionError, FunctionResult};
use super::runtime::{ExecutionOutput, ExecutionRequest, FunctionExecutor};

/// A synchronous in-process handler.
pub type BuiltinHandler = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

pub struct BuiltinExecutor {
    handlers: RwLock<HashMap<String, BuiltinHandler>>,
}

impl std::fmt::Debug for BuiltinExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinExecutor")
            .field("handlers", &self.handler_names())
            .finish()
    }
}

impl Default for BuiltinExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinExecutor {
    /// An executor with the standard builtins registered.
    pub fn new() -> Self {
        let executor = Self::empty();
        let builtins: [(&str, BuiltinHandler); 4] = [
            ("identity", Arc::new(identity)),
            ("string:concat", Arc::new(concat)),
            ("json:to_string", Arc::new(to_json_string)),
            ("codegen:json", Arc::new(codegen_json)),
        ];
        if let Ok(mut handlers) = executor.handlers.write() {
            for (name, handler) in builtins {
                handlers.insert(name.to_string(), handler);
            }
        }
        executor
    }

    pub fn empty() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register<F>(&self, name: &str, handler: F) -> FunctionResult<()>
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| FunctionError::Internal("Lock poisoned".into()))?;
        if handlers.contains_key(name) {
            return Err(FunctionError::AlreadyExists(name.to_string()));
        }
        handlers.insert(name.to_string(), Arc::new(handler));
        Ok(())
    }

    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn handler(&self, name: &str) -> FunctionResult<BuiltinHandler> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| FunctionError::Internal("Lock poisoned".into()))?;
        handlers
            .get(name)
            .cloned()
            .ok_or_else(|| FunctionError::NotFound(name.to_string()))
    }
}

#[async_trait]
impl FunctionExecutor for BuiltinExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> FunctionResult<ExecutionOutput> {
        let handler = self.handler(&request.handler)?;
        handler(&request.args)
            .map(ExecutionOutput::value)
            .map_err(FunctionError::RuntimeError)
    }

    fn name(&self) -> &str {
        "builtin"
    }
}

fn identity(args: &Value) -> Result<Value, String> {
    Ok(args.clone())
}

fn to_json_string(args: &Value) -> Result<Value, String> {
    Ok(Value::String(args.to_string()))
}

/// Joins an array of values into one string. Strings are used as-is,
/// other values by their JSON text. `null` entries are skipped.
fn concat(args: &Value) -> Result<Value, String> {
    let items = args
        .as_array()
        .ok_or_else(|| format!("string:concat expects an array, got {}", args))?;
    let mut out = String::new();
    for item in items {
        match item {
            Value::Null => {}
            Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
    }
    Ok(Value::String(out))
}

fn codegen_json(args: &Value) -> Result<Value, String> {
    let code = serde_json::to_string_pretty(args).map_err(|e| e.to_string())?;
    Ok(json!({ "format": "json", "code": code }))
}
