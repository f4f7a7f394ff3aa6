//! # Providers
//!
//! A provider runs one command against an external system and reports its
//! exit code and output. Calls carry their own timeout and observe a
//! cancellation token.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::errors::ProviderFailure;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCall {
    pub command: String,

    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Qualification calls run with the provider's dry-run flag
    #[serde(default)]
    pub dry_run: bool,

    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOutput {
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,
}

impl ProviderOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().filter(|line| !line.trim().is_empty())
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    async fn invoke(
        &self,
        call: &ProviderCall,
        cancel: &CancellationToken,
    ) -> Result<ProviderOutput, ProviderFailure>;

    fn name(&self) -> &str;
}

/// Runs calls as child processes. The child is killed on timeout or
/// cancellation.
#[derive(Debug, Clone, Default)]
pub struct ProcessProvider;

impl ProcessProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for ProcessProvider {
    async fn invoke(
        &self,
        call: &ProviderCall,
        cancel: &CancellationToken,
    ) -> Result<ProviderOutput, ProviderFailure> {
        let child = Command::new(&call.command)
            .args(&call.args)
            .envs(&call.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderFailure::Spawn(format!("{}: {}", call.command, e)))?;

        tokio::select! {
            output = child.wait_with_output() => {
                let output = output.map_err(|e| ProviderFailure::Io(e.to_string()))?;
                Ok(ProviderOutput {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            _ = tokio::time::sleep(call.timeout) => {
                Err(ProviderFailure::Timeout(call.timeout.as_millis() as u64))
            }
            _ = cancel.cancelled() => Err(ProviderFailure::Canceled),
        }
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// A canned reply of the [`ScriptedProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedReply {
    result: Result<ProviderOutput, ProviderFailure>,
    delay: Option<Duration>,
}

impl ScriptedReply {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::exit(0, stdout, "")
    }

    pub fn exit(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            result: Ok(ProviderOutput {
                exit_code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            }),
            delay: None,
        }
    }

    pub fn failure(failure: ProviderFailure) -> Self {
        Self {
            result: Err(failure),
            delay: None,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Deterministic in-memory provider.
///
/// Replies with the first rule whose needle appears in one of the call's
/// arguments, or the default reply. Every call is recorded.
#[derive(Debug)]
pub struct ScriptedProvider {
    rules: Vec<(String, ScriptedReply)>,
    default: ScriptedReply,
    calls: Mutex<Vec<ProviderCall>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new(ScriptedReply::ok(""))
    }
}

impl ScriptedProvider {
    pub fn new(default: ScriptedReply) -> Self {
        Self {
            rules: Vec::new(),
            default,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, needle: impl Into<String>, reply: ScriptedReply) -> Self {
        self.rules.push((needle.into(), reply));
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn reply_for(&self, call: &ProviderCall) -> &ScriptedReply {
        self.rules
            .iter()
            .find(|(needle, _)| call.args.iter().any(|arg| arg.contains(needle.as_str())))
            .map(|(_, reply)| reply)
            .unwrap_or(&self.default)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn invoke(
        &self,
        call: &ProviderCall,
        cancel: &CancellationToken,
    ) -> Result<ProviderOutput, ProviderFailure> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.clone());
        let reply = self.reply_for(call).clone();

        if let Some(delay) = reply.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(ProviderFailure::Canceled),
            }
        }
        reply.result
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: &[&str]) -> ProviderCall {
        ProviderCall {
            command: "aws".into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::new(),
            dry_run: false,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_scripted_rules_match_arguments() {
        let provider = ScriptedProvider::new(ScriptedReply::ok("default"))
            .on("describe", ScriptedReply::exit(3, "", "denied"));
        let cancel = CancellationToken::new();

        let out = provider.invoke(&call(&["ec2", "describe-instances"]), &cancel).await.unwrap();
        assert_eq!(out.exit_code, 3);
        let out = provider.invoke(&call(&["ec2", "run-instances"]), &cancel).await.unwrap();
        assert_eq!(out.stdout, "default");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_delay_observes_cancellation() {
        let provider = ScriptedProvider::new(ScriptedReply::ok("late").after(Duration::from_secs(30)));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = provider.invoke(&call(&["x"]), &cancel).await.unwrap_err();
        assert_eq!(err, ProviderFailure::Canceled);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_provider_captures_output() {
        let call = ProviderCall {
            command: "sh".into(),
            args: vec!["-c".into(), "echo out; echo err >&2; exit 2".into()],
            env: BTreeMap::new(),
            dry_run: false,
            timeout: Duration::from_secs(10),
        };
        let out = ProcessProvider::new()
            .invoke(&call, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.exit_code, 2);
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_provider_cancel_kills_child() {
        let call = ProviderCall {
            command: "sleep".into(),
            args: vec!["10".into()],
            env: BTreeMap::new(),
            dry_run: false,
            timeout: Duration::from_secs(30),
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = ProcessProvider::new().invoke(&call, &cancel).await.unwrap_err();
        assert_eq!(err, ProviderFailure::Canceled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_provider_times_out() {
        let call = ProviderCall {
            command: "sleep".into(),
            args: vec!["5".into()],
            env: BTreeMap::new(),
            dry_run: false,
            timeout: Duration::from_millis(50),
        };
        let err = ProcessProvider::new()
            .invoke(&call, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderFailure::Timeout(50));
    }
}
