//! # Function Runtime
//!
//! The capability interface for running prototype functions. The core never
//! interprets function bodies; it hands a request to an executor and gets a
//! JSON value back. Executors must be pure with respect to their request
//! arguments, since results are cached by argument hash.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::FunctionResult;
use crate::ids::LogicalId;
use crate::model::{Func, FuncKind, ResolverContext};

/// One execution of a func.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub invocation_id: Uuid,

    pub func_id: LogicalId,

    pub handler: String,

    pub kind: FuncKind,

    pub args: Value,

    pub context: ResolverContext,
}

impl ExecutionRequest {
    pub fn new(func_id: LogicalId, func: &Func, args: Value, context: ResolverContext) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            func_id,
            handler: func.handler.clone(),
            kind: func.kind,
            args,
            context,
        }
    }
}

/// What an execution produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub value: Value,

    /// Lines the function logged before its result
    #[serde(default)]
    pub logs: Vec<String>,
}

impl ExecutionOutput {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            logs: Vec::new(),
        }
    }
}

/// Runs function requests.
#[async_trait]
pub trait FunctionExecutor: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> FunctionResult<ExecutionOutput>;

    /// Executor name for logs
    fn name(&self) -> &str;
}
