//! # Function Invoker
//!
//! Wraps an executor with a per-call timeout and logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::errors::{FunctionError, FunctionResult};
use super::runtime::{ExecutionOutput, ExecutionRequest, FunctionExecutor};

#[derive(Clone)]
pub struct Invoker {
    executor: Arc<dyn FunctionExecutor>,
    timeout: Duration,
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("executor", &self.executor.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Invoker {
    pub fn new(executor: Arc<dyn FunctionExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn invoke(&self, request: &ExecutionRequest) -> FunctionResult<ExecutionOutput> {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.executor.execute(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(FunctionError::Timeout(self.timeout.as_millis() as u64)),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(output) => debug!(
                event = "FUNCTION_INVOKED",
                invocation_id = %request.invocation_id,
                func_id = %request.func_id,
                handler = %request.handler,
                executor = self.executor.name(),
                duration_ms,
                logs = output.logs.len(),
            ),
            Err(err) => warn!(
                event = "FUNCTION_FAILED",
                invocation_id = %request.invocation_id,
                func_id = %request.func_id,
                handler = %request.handler,
                executor = self.executor.name(),
                duration_ms,
                code = err.code(),
                error = %err,
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::BuiltinExecutor;
    use crate::ids::{LogicalId, SystemId};
    use crate::model::{Func, FuncKind, ResolverContext};
    use async_trait::async_trait;
    use serde_json::json;

    struct Sleepy;

    #[async_trait]
    impl FunctionExecutor for Sleepy {
        async fn execute(&self, _request: &ExecutionRequest) -> FunctionResult<ExecutionOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ExecutionOutput::value(json!(null)))
        }

        fn name(&self) -> &str {
            "sleepy"
        }
    }

    fn request(handler: &str) -> ExecutionRequest {
        ExecutionRequest::new(
            LogicalId::new(),
            &Func::new("f", FuncKind::Attribute, handler),
            json!("x"),
            ResolverContext {
                component_id: LogicalId::new(),
                system_id: SystemId::BASELINE,
            },
        )
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let invoker = Invoker::new(Arc::new(BuiltinExecutor::new()), Duration::from_secs(1));
        let out = invoker.invoke(&request("identity")).await.unwrap();
        assert_eq!(out.value, json!("x"));
    }

    #[tokio::test]
    async fn test_invoke_timeout() {
        let invoker = Invoker::new(Arc::new(Sleepy), Duration::from_millis(20));
        let err = invoker.invoke(&request("any")).await.unwrap_err();
        assert_eq!(err, FunctionError::Timeout(20));
    }
}
