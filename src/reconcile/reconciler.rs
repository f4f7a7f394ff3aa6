//! # Reconciler
//!
//! Drives a provider for one component across every system that includes
//! it. Calls run concurrently under a semaphore, each with its own timeout;
//! one system failing never affects another's result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::errors::{ProviderFailure, ReconcileError, ReconcileResult};
use super::profile::ProviderProfile;
use super::provider::{Provider, ProviderCall, ProviderOutput};
use crate::events::{EventEmitter, EventPayload, EventScope};
use crate::graph::GraphEngine;
use crate::ids::{LogicalId, SystemId};
use crate::model::{EdgeKind, EntityKind, EntityPayload, Health, Resource};
use crate::store::{RequestContext, StoreError, StoreSnapshot};

/// Reconciliation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,

    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_max_concurrent_calls() -> usize {
    4
}

fn default_call_timeout_ms() -> u64 {
    60_000
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: default_max_concurrent_calls(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

/// Result of one provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CallOutcome {
    Completed { output: ProviderOutput },
    Failed { failure: ProviderFailure },
    /// Canceled before or while running
    Skipped,
}

impl CallOutcome {
    /// `Error` on a failed call or non-zero exit, `Warning` when skipped or
    /// when the provider wrote to stderr.
    pub fn health(&self) -> Health {
        match self {
            CallOutcome::Completed { output } if !output.success() => Health::Error,
            CallOutcome::Completed { output } if !output.stderr.trim().is_empty() => Health::Warning,
            CallOutcome::Completed { .. } => Health::Ok,
            CallOutcome::Failed { .. } => Health::Error,
            CallOutcome::Skipped => Health::Warning,
        }
    }

    pub fn output(&self) -> Option<&ProviderOutput> {
        match self {
            CallOutcome::Completed { output } => Some(output),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualificationResult {
    pub system_id: SystemId,

    pub qualified: bool,

    pub outcome: CallOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemSync {
    pub system_id: SystemId,

    pub health: Health,

    pub outcome: CallOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub component_id: LogicalId,

    /// Worst health over all systems
    pub health: Health,

    pub systems: Vec<SystemSync>,
}

pub struct Reconciler {
    graph: Arc<GraphEngine>,
    events: Arc<EventEmitter>,
    provider: Arc<dyn Provider>,
    profile: ProviderProfile,
    limiter: Arc<Semaphore>,
    call_timeout: Duration,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("provider", &self.provider.name())
            .field("profile", &self.profile.name)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl Reconciler {
    pub fn new(
        graph: Arc<GraphEngine>,
        events: Arc<EventEmitter>,
        provider: Arc<dyn Provider>,
        profile: ProviderProfile,
        config: &ReconcileConfig,
    ) -> Self {
        Self {
            graph,
            events,
            provider,
            profile,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_calls.max(1))),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        }
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    /// Systems including the component, ordered by id. A component no
    /// system includes is reconciled against the baseline only.
    pub fn systems_for(&self, ctx: &RequestContext, component_id: LogicalId) -> ReconcileResult<Vec<SystemId>> {
        let snapshot = self.graph.store().snapshot()?;
        self.require_component(&snapshot, ctx, component_id)?;
        systems_including(&snapshot, ctx, component_id)
    }

    /// Dry-runs the create call on every system.
    pub async fn qualify(
        &self,
        ctx: &RequestContext,
        component_id: LogicalId,
    ) -> ReconcileResult<Vec<QualificationResult>> {
        let snapshot = self.graph.store().snapshot()?;
        self.require_component(&snapshot, ctx, component_id)?;
        let systems = systems_including(&snapshot, ctx, component_id)?;
        let values = self.graph.attributes(ctx).await?;

        let mut calls = Vec::with_capacity(systems.len());
        for system_id in &systems {
            let args = self.profile.render_qualification(component_id, *system_id, &values)?;
            calls.push((*system_id, self.call(args, true)));
        }

        let scope = EventScope::for_request(ctx);
        let results: Vec<QualificationResult> = self
            .run_calls(calls, &CancellationToken::new())
            .await
            .into_iter()
            .map(|(system_id, outcome)| {
                let qualified = outcome
                    .output()
                    .map_or(false, |output| self.profile.qualification.is_qualified(output));
                QualificationResult {
                    system_id,
                    qualified,
                    outcome,
                }
            })
            .collect();

        for result in &results {
            info!(
                event = "QUALIFICATION_CHECKED",
                component_id = %component_id,
                system_id = %result.system_id,
                qualified = result.qualified,
            );
            self.events.publish(
                scope.clone(),
                EventPayload::CheckedQualifications {
                    component_id,
                    system_id: result.system_id,
                    qualified: result.qualified,
                },
            );
        }
        Ok(results)
    }

    /// Creates the component's resource on every system.
    ///
    /// Refuses without calling the provider when a resource already exists.
    /// Any failed system fails the whole create and no resource is written.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        component_id: LogicalId,
    ) -> ReconcileResult<Vec<Resource>> {
        let snapshot = self.graph.store().snapshot()?;
        self.require_component(&snapshot, ctx, component_id)?;
        if !resources_of(&snapshot, ctx, component_id)?.is_empty() {
            return Err(ReconcileError::AlreadyExists { component_id });
        }
        let systems = systems_including(&snapshot, ctx, component_id)?;
        let values = self.graph.attributes(ctx).await?;

        let mut calls = Vec::with_capacity(systems.len());
        for system_id in &systems {
            let args = self
                .profile
                .render(&self.profile.create_args, component_id, *system_id, &values)?;
            calls.push((*system_id, self.call(args, false)));
        }
        let outcomes = self.run_calls(calls, &CancellationToken::new()).await;
        self.publish_output(ctx, component_id, &outcomes);

        let mut resources = Vec::with_capacity(outcomes.len());
        for (system_id, outcome) in &outcomes {
            let output = match outcome {
                CallOutcome::Completed { output } if output.success() => output,
                CallOutcome::Completed { output } => {
                    return Err(self.create_failed(ReconcileError::ProviderError {
                        component_id,
                        system_id: *system_id,
                        exit_code: Some(output.exit_code),
                        stderr: output.stderr.trim().to_string(),
                    }))
                }
                CallOutcome::Failed { failure } => {
                    return Err(self.create_failed(ReconcileError::from_failure(
                        component_id,
                        *system_id,
                        failure.clone(),
                    )))
                }
                CallOutcome::Skipped => {
                    return Err(self.create_failed(ReconcileError::from_failure(
                        component_id,
                        *system_id,
                        ProviderFailure::Canceled,
                    )))
                }
            };
            resources.push(Resource::new(
                component_id,
                *system_id,
                resource_data(output),
                outcome.health(),
            ));
        }

        self.graph.store().transaction(|tx| {
            for resource in &resources {
                tx.create(ctx, EntityPayload::Resource(resource.clone()))?;
            }
            Ok::<_, StoreError>(())
        })?;

        let health = Health::worst_of(resources.iter().map(|r| r.health));
        info!(
            event = "RESOURCE_CREATED",
            component_id = %component_id,
            systems = resources.len(),
            health = %health,
        );
        self.events.publish(
            EventScope::for_request(ctx),
            EventPayload::ResourceSynced {
                component_id,
                health,
                system_ids: systems,
            },
        );
        Ok(resources)
    }

    /// Checks the component's status on every system.
    ///
    /// Resources of systems that answered without error are refreshed.
    /// When `cancel` fires, running calls are stopped and they and the
    /// calls not yet started are reported as skipped.
    pub async fn sync(
        &self,
        ctx: &RequestContext,
        component_id: LogicalId,
        cancel: &CancellationToken,
    ) -> ReconcileResult<SyncReport> {
        let snapshot = self.graph.store().snapshot()?;
        self.require_component(&snapshot, ctx, component_id)?;
        let systems = systems_including(&snapshot, ctx, component_id)?;
        let values = self.graph.attributes(ctx).await?;

        let mut calls = Vec::with_capacity(systems.len());
        let mut unrenderable = BTreeMap::new();
        for system_id in &systems {
            match self
                .profile
                .render(&self.profile.status_args, component_id, *system_id, &values)
            {
                Ok(args) => calls.push((*system_id, self.call(args, false))),
                Err(err) => {
                    unrenderable.insert(*system_id, ProviderFailure::InvalidCall(err.to_string()));
                }
            }
        }
        let mut outcomes: BTreeMap<SystemId, CallOutcome> =
            self.run_calls(calls, cancel).await.into_iter().collect();
        for (system_id, failure) in unrenderable {
            outcomes.insert(system_id, CallOutcome::Failed { failure });
        }
        let outcomes: Vec<(SystemId, CallOutcome)> = outcomes.into_iter().collect();
        self.publish_output(ctx, component_id, &outcomes);

        let existing = resources_of(&snapshot, ctx, component_id)?;
        let systems_report: Vec<SystemSync> = outcomes
            .into_iter()
            .map(|(system_id, outcome)| SystemSync {
                system_id,
                health: outcome.health(),
                outcome,
            })
            .collect();

        self.graph.store().transaction(|tx| {
            for system in &systems_report {
                let Some(output) = system.outcome.output() else {
                    continue;
                };
                if system.health == Health::Error {
                    continue;
                }
                let payload = EntityPayload::Resource(Resource::new(
                    component_id,
                    system.system_id,
                    resource_data(output),
                    system.health,
                ));
                match existing.get(&system.system_id) {
                    Some(resource_id) => tx.update(ctx, *resource_id, payload)?,
                    None => tx.create(ctx, payload)?,
                };
            }
            Ok::<_, StoreError>(())
        })?;

        let health = Health::worst_of(systems_report.iter().map(|s| s.health));
        let failed = systems_report.iter().filter(|s| s.health == Health::Error).count();
        info!(
            event = "RESOURCE_SYNCED",
            component_id = %component_id,
            systems = systems_report.len(),
            failed,
            health = %health,
        );
        self.events.publish(
            EventScope::for_request(ctx),
            EventPayload::ResourceSynced {
                component_id,
                health,
                system_ids: systems_report.iter().map(|s| s.system_id).collect(),
            },
        );

        Ok(SyncReport {
            component_id,
            health,
            systems: systems_report,
        })
    }

    fn call(&self, args: Vec<String>, dry_run: bool) -> ProviderCall {
        ProviderCall {
            command: self.profile.command.clone(),
            args,
            env: self.profile.env.clone(),
            dry_run,
            timeout: self.call_timeout,
        }
    }

    fn require_component(
        &self,
        snapshot: &StoreSnapshot,
        ctx: &RequestContext,
        component_id: LogicalId,
    ) -> ReconcileResult<()> {
        let found = snapshot
            .resolve(ctx, component_id, false)?
            .map_or(false, |row| row.kind() == EntityKind::Component);
        if found {
            Ok(())
        } else {
            Err(ReconcileError::UnknownComponent(component_id))
        }
    }

    fn create_failed(&self, err: ReconcileError) -> ReconcileError {
        warn!(event = "RESOURCE_CREATE_FAILED", code = err.code(), error = %err);
        err
    }

    /// Runs every call and returns the outcomes in input order.
    async fn run_calls(
        &self,
        calls: Vec<(SystemId, ProviderCall)>,
        cancel: &CancellationToken,
    ) -> Vec<(SystemId, CallOutcome)> {
        let systems: Vec<SystemId> = calls.iter().map(|(system_id, _)| *system_id).collect();
        let mut tasks = JoinSet::new();
        for (index, (_, call)) in calls.into_iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let limiter = Arc::clone(&self.limiter);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => CallOutcome::Skipped,
                    permit = limiter.acquire_owned() => match permit {
                        Ok(_permit) if !cancel.is_cancelled() => invoke(provider.as_ref(), &call, &cancel).await,
                        _ => CallOutcome::Skipped,
                    },
                };
                (index, outcome)
            });
        }

        let mut finished = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    finished.insert(index, outcome);
                }
                Err(err) => warn!(event = "PROVIDER_TASK_FAILED", error = %err),
            }
        }

        systems
            .into_iter()
            .enumerate()
            .map(|(index, system_id)| {
                let outcome = finished.remove(&index).unwrap_or(CallOutcome::Failed {
                    failure: ProviderFailure::Io("provider task aborted".into()),
                });
                (system_id, outcome)
            })
            .collect()
    }

    fn publish_output(
        &self,
        ctx: &RequestContext,
        component_id: LogicalId,
        outcomes: &[(SystemId, CallOutcome)],
    ) {
        let scope = EventScope::for_request(ctx);
        for (system_id, outcome) in outcomes {
            let Some(output) = outcome.output() else {
                continue;
            };
            for line in output.stdout_lines() {
                self.events.publish(
                    scope.clone(),
                    EventPayload::CommandOutput {
                        component_id,
                        system_id: *system_id,
                        output: line.to_string(),
                    },
                );
            }
        }
    }
}

async fn invoke(provider: &dyn Provider, call: &ProviderCall, cancel: &CancellationToken) -> CallOutcome {
    let result = match tokio::time::timeout(call.timeout, provider.invoke(call, cancel)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderFailure::Timeout(call.timeout.as_millis() as u64)),
    };
    match result {
        Ok(output) => CallOutcome::Completed { output },
        Err(ProviderFailure::Canceled) => CallOutcome::Skipped,
        Err(failure) => CallOutcome::Failed { failure },
    }
}

/// Provider stdout as JSON when it parses, otherwise as raw text.
fn resource_data(output: &ProviderOutput) -> Value {
    serde_json::from_str(&output.stdout).unwrap_or_else(|_| json!({ "stdout": output.stdout }))
}

fn systems_including(
    snapshot: &StoreSnapshot,
    ctx: &RequestContext,
    component_id: LogicalId,
) -> ReconcileResult<Vec<SystemId>> {
    let rows = snapshot.resolve_all(ctx, false)?;
    let systems: Vec<LogicalId> = rows
        .iter()
        .filter(|row| row.kind() == EntityKind::System)
        .map(|row| row.logical_id)
        .collect();
    let mut included: Vec<SystemId> = rows
        .iter()
        .filter_map(|row| row.payload.as_edge())
        .filter(|edge| edge.kind == EdgeKind::Includes && edge.head.object_id == component_id)
        .filter(|edge| systems.contains(&edge.tail.object_id))
        .map(|edge| SystemId::from_logical(edge.tail.object_id))
        .collect();
    included.sort();
    included.dedup();
    if included.is_empty() {
        included.push(SystemId::BASELINE);
    }
    Ok(included)
}

/// Resource row ids of a component by system.
fn resources_of(
    snapshot: &StoreSnapshot,
    ctx: &RequestContext,
    component_id: LogicalId,
) -> ReconcileResult<BTreeMap<SystemId, LogicalId>> {
    Ok(snapshot
        .resolve_kind(ctx, EntityKind::Resource)?
        .iter()
        .filter_map(|row| {
            let resource = row.payload.as_resource()?;
            (resource.component_id == component_id).then_some((resource.system_id, row.logical_id))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(exit_code: i32, stderr: &str) -> CallOutcome {
        CallOutcome::Completed {
            output: ProviderOutput {
                exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        }
    }

    #[test]
    fn test_outcome_health() {
        assert_eq!(completed(0, "").health(), Health::Ok);
        assert_eq!(completed(0, "deprecated\n").health(), Health::Warning);
        assert_eq!(completed(0, "  \n").health(), Health::Ok);
        assert_eq!(completed(2, "").health(), Health::Error);
        assert_eq!(CallOutcome::Skipped.health(), Health::Warning);
        let failed = CallOutcome::Failed {
            failure: ProviderFailure::Timeout(10),
        };
        assert_eq!(failed.health(), Health::Error);
        assert!(failed.output().is_none());
    }

    #[test]
    fn test_resource_data_falls_back_to_text() {
        let json_output = ProviderOutput {
            exit_code: 0,
            stdout: r#"{"id": "i-1"}"#.into(),
            stderr: String::new(),
        };
        assert_eq!(resource_data(&json_output), json!({"id": "i-1"}));
        let text = ProviderOutput {
            stdout: "created".into(),
            ..json_output
        };
        assert_eq!(resource_data(&text), json!({"stdout": "created"}));
    }
}
