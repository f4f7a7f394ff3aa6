//! # Function Execution
//!
//! Prototype functions are opaque, content-addressed computations run
//! through a `FunctionExecutor`:
//! - `BuiltinExecutor` - named in-process handlers
//! - `ProcessExecutor` - one child process per request, JSON over stdio
//!
//! The `Invoker` adds the per-call timeout.

pub mod errors;
pub mod invoker;
pub mod process;
pub mod registry;
pub mod runtime;

pub use errors::{FunctionError, FunctionResult};
pub use invoker::Invoker;
pub use process::ProcessExecutor;
pub use registry::{BuiltinExecutor, BuiltinHandler};
pub use runtime::{ExecutionOutput, ExecutionRequest, FunctionExecutor};
