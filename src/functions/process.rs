//! # Process Executor
//!
//! Runs each request in a child process. The request is written to stdin as
//! one JSON line; stdin is then closed. Every stdout line before the last is
//! a log line. The last non-empty line is the result:
//!
//! ```text
//! {"status":"success","value":<json>}
//! {"status":"failure","error":{"message":"..."}}
//! ```
//!
//! The child is killed if the execution future is dropped (timeout).

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::errors::{FunctionError, FunctionResult};
use super::runtime::{ExecutionOutput, ExecutionRequest, FunctionExecutor};

#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
enum ProcessReply {
    Success { value: Value },
    Failure { error: ProcessFailure },
}

#[derive(Debug, Deserialize)]
struct ProcessFailure {
    message: String,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Splits child stdout into log lines and the final reply.
fn parse_stdout(stdout: &str) -> FunctionResult<ExecutionOutput> {
    let mut lines: Vec<&str> = stdout.lines().filter(|line| !line.trim().is_empty()).collect();
    let last = lines
        .pop()
        .ok_or_else(|| FunctionError::InvalidOutput("function produced no output".into()))?;
    let reply: ProcessReply = serde_json::from_str(last)
        .map_err(|e| FunctionError::InvalidOutput(format!("{}: {}", e, last)))?;
    match reply {
        ProcessReply::Success { value } => Ok(ExecutionOutput {
            value,
            logs: lines.into_iter().map(str::to_string).collect(),
        }),
        ProcessReply::Failure { error } => Err(FunctionError::RuntimeError(error.message)),
    }
}

#[async_trait]
impl FunctionExecutor for ProcessExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> FunctionResult<ExecutionOutput> {
        let mut payload = serde_json::to_vec(request)
            .map_err(|e| FunctionError::Internal(e.to_string()))?;
        payload.push(b'\n');

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FunctionError::RuntimeError(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        parse_stdout(&String::from_utf8_lossy(&output.stdout))
    }

    fn name(&self) -> &str {
        "process"
    }
}
