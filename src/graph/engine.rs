//! # Resolver Engine
//!
//! Recomputes attribute values for one request scope.
//!
//! A pass loads every visible row once, builds the dependency graph, and
//! evaluates the part reachable from the changed keys level by level.
//! Evaluations inside a level run concurrently; function invocations are
//! bounded by a semaphore. The new set replaces the scope's previous set
//! only when the pass completes, so a cycle or a store failure leaves
//! readers on the old values.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::attribute::{AttributeKey, AttributeSet, AttributeState, AttributeValue, Provenance};
use super::cache::{CacheKey, CacheStats, ResolverCache};
use super::dependency::{DependencyGraph, InputPlan, NodeSpec};
use super::errors::{GraphError, GraphResult};
use super::inputs::GraphInputs;
use super::scopes::{AttributeStore, ScopeKey};
use crate::events::{EventEmitter, EventPayload, EventScope};
use crate::functions::{ExecutionRequest, FunctionError, FunctionExecutor, Invoker};
use crate::ids::{LogicalId, SystemId, VersionId};
use crate::model::{
    binding_hash, EntityKind, EntityPayload, FuncBinding, FuncKind, FuncRef, PropPath, Prototype,
    Resolver, ResolverContext,
};
use crate::store::{RequestContext, Store, StoreError};

/// Resolver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Function invocations running at once, across all scopes
    #[serde(default = "default_max_concurrent_invocations")]
    pub max_concurrent_invocations: usize,

    #[serde(default = "default_function_timeout_ms")]
    pub function_timeout_ms: u64,
}

fn default_max_concurrent_invocations() -> usize {
    8
}

fn default_function_timeout_ms() -> u64 {
    30_000
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_invocations: default_max_concurrent_invocations(),
            function_timeout_ms: default_function_timeout_ms(),
        }
    }
}

/// What one recompute pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecomputeReport {
    /// Store watermark the pass read at
    pub watermark: VersionId,

    pub evaluated: usize,

    /// Keys whose value differs from the previous set
    pub changed: Vec<AttributeKey>,

    /// Keys that no longer have a prototype
    pub removed: Vec<AttributeKey>,

    pub invocations: usize,

    pub cache_hits: usize,
}

struct Outcome {
    value: AttributeValue,
    resolver: Option<(FuncBinding, Resolver)>,
    invoked: bool,
    cache_hit: bool,
}

impl Outcome {
    fn settled(key: &AttributeKey, state: AttributeState, provenance: Provenance) -> Self {
        Self {
            value: AttributeValue {
                key: key.clone(),
                state,
                provenance,
            },
            resolver: None,
            invoked: false,
            cache_hit: false,
        }
    }
}

pub struct GraphEngine {
    store: Arc<Store>,
    events: Arc<EventEmitter>,
    invoker: Invoker,
    cache: ResolverCache,
    scopes: AttributeStore,
    limiter: Semaphore,
}

impl std::fmt::Debug for GraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEngine")
            .field("invoker", &self.invoker)
            .field("cache", &self.cache.stats())
            .field("scopes", &self.scopes.scope_count())
            .finish()
    }
}

impl GraphEngine {
    pub fn new(
        store: Arc<Store>,
        events: Arc<EventEmitter>,
        executor: Arc<dyn FunctionExecutor>,
        config: &ResolverConfig,
    ) -> Self {
        Self {
            store,
            events,
            invoker: Invoker::new(executor, Duration::from_millis(config.function_timeout_ms)),
            cache: ResolverCache::new(),
            scopes: AttributeStore::new(),
            limiter: Semaphore::new(config.max_concurrent_invocations.max(1)),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The scope's current values, computing them on first access.
    pub async fn attributes(&self, ctx: &RequestContext) -> GraphResult<Arc<AttributeSet>> {
        let scope = ScopeKey::for_request(ctx);
        if let Some(set) = self.scopes.get(&scope) {
            return Ok(set);
        }
        self.recompute_all(ctx).await?;
        Ok(self.scopes.get(&scope).unwrap_or_default())
    }

    pub async fn value(
        &self,
        ctx: &RequestContext,
        key: &AttributeKey,
    ) -> GraphResult<Option<AttributeValue>> {
        Ok(self.attributes(ctx).await?.lookup(key).cloned())
    }

    /// Loads the resolver rows visible to `ctx` into the cache. Rows recorded
    /// against an older definition of their func are skipped.
    pub fn warm_cache(&self, ctx: &RequestContext) -> GraphResult<usize> {
        let inputs = GraphInputs::load(&self.store.snapshot()?, ctx)?;
        let added = self.cache.warm(inputs.current_resolvers());
        debug!(event = "RESOLVER_CACHE_WARMED", added, entries = self.cache.len());
        Ok(added)
    }

    /// Recomputes everything downstream of `changed`.
    pub async fn recompute(
        &self,
        ctx: &RequestContext,
        changed: &[AttributeKey],
    ) -> GraphResult<RecomputeReport> {
        self.run(ctx, Some(changed)).await
    }

    /// Recomputes every node of the scope.
    pub async fn recompute_all(&self, ctx: &RequestContext) -> GraphResult<RecomputeReport> {
        self.run(ctx, None).await
    }

    /// Writes the authored value of one property, then recomputes from it.
    pub async fn set_authored_value(
        &self,
        ctx: &RequestContext,
        component_id: LogicalId,
        path: impl Into<PropPath>,
        system_id: SystemId,
        value: Value,
    ) -> GraphResult<RecomputeReport> {
        let path = path.into();
        if !path.is_well_formed() {
            return Err(GraphError::InvalidPath(path.to_string()));
        }

        let snapshot = self.store.snapshot()?;
        let is_component = snapshot
            .resolve(ctx, component_id, false)?
            .map_or(false, |row| row.payload.as_component().is_some());
        if !is_component {
            return Err(GraphError::UnknownComponent(component_id));
        }

        let existing = snapshot
            .resolve_kind(ctx, EntityKind::Prototype)?
            .into_iter()
            .find(|row| {
                row.payload.as_prototype().map_or(false, |prototype| {
                    prototype.authored
                        && prototype.path == path
                        && prototype.context.component_id == Some(component_id)
                        && prototype.context.system() == system_id
                })
            });

        let payload = EntityPayload::Prototype(Prototype::authored(
            path.clone(),
            component_id,
            system_id,
            value,
        ));
        let row = match existing {
            Some(row) => self.store.update(ctx, row.logical_id, payload)?,
            None => self.store.create(ctx, payload)?,
        };
        debug!(
            event = "AUTHORED_VALUE_SET",
            component_id = %component_id,
            path = %path,
            system_id = %system_id,
            prototype_id = %row.logical_id,
        );

        self.recompute(ctx, &[AttributeKey::new(component_id, path, system_id)])
            .await
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        changed: Option<&[AttributeKey]>,
    ) -> GraphResult<RecomputeReport> {
        ctx.tenancy.check()?;
        ctx.visibility.check()?;
        let start = Instant::now();

        let scope = ScopeKey::for_request(ctx);
        let lock = self.scopes.lock(&scope);
        let _guard = lock.lock().await;

        let snapshot = self.store.snapshot()?;
        let inputs = GraphInputs::load(&snapshot, ctx)?;
        self.cache.warm(inputs.current_resolvers());
        let graph = DependencyGraph::build(&inputs);
        let previous = self.scopes.get(&scope).unwrap_or_default();

        let roots = match changed {
            Some(changed) => graph.roots(changed, &previous),
            None => graph.keys().cloned().collect(),
        };
        let levels = match graph.levels(&roots) {
            Ok(levels) => levels,
            Err(err) => {
                warn!(
                    event = "RECOMPUTE_ABORTED",
                    scope = %scope.tenancy_key,
                    change_set_id = ?scope.change_set_id,
                    code = err.code(),
                    error = %err,
                );
                return Err(err);
            }
        };

        let mut report = RecomputeReport {
            watermark: inputs.watermark,
            ..RecomputeReport::default()
        };
        let mut working = (*previous).clone();
        report.removed = previous
            .keys()
            .filter(|key| !graph.contains(key))
            .cloned()
            .collect();
        for key in &report.removed {
            working.remove(key);
        }

        let mut bindings = BTreeMap::new();
        for level in &levels {
            let outcomes = join_all(
                level
                    .iter()
                    .filter_map(|key| graph.node(key))
                    .map(|node| self.evaluate(node, &inputs, &working)),
            )
            .await;
            for outcome in outcomes {
                report.evaluated += 1;
                report.invocations += usize::from(outcome.invoked);
                report.cache_hits += usize::from(outcome.cache_hit);
                if let Some((binding, resolver)) = outcome.resolver {
                    bindings.insert(CacheKey::of(&resolver), (binding, resolver));
                }
                working.insert(outcome.value);
            }
        }

        report.changed = working
            .iter()
            .filter(|value| previous.get(&value.key) != Some(*value))
            .map(|value| value.key.clone())
            .collect();

        if !bindings.is_empty() {
            let persisted = self.store.transaction(|tx| {
                for (binding, resolver) in bindings.values() {
                    tx.create(ctx, EntityPayload::FuncBinding(binding.clone()))?;
                    tx.create(ctx, EntityPayload::Resolver(resolver.clone()))?;
                }
                Ok::<_, StoreError>(())
            });
            if let Err(err) = persisted {
                warn!(
                    event = "RESOLVER_PERSIST_FAILED",
                    bindings = bindings.len(),
                    code = err.code(),
                    error = %err,
                );
            }
        }

        let working = Arc::new(working);
        self.scopes.swap(scope, working.clone());
        self.publish_changes(ctx, &graph, &inputs, &working, &report);

        info!(
            event = "RECOMPUTE_COMPLETE",
            watermark = report.watermark.value(),
            evaluated = report.evaluated,
            changed = report.changed.len(),
            removed = report.removed.len(),
            invocations = report.invocations,
            cache_hits = report.cache_hits,
            duration_ms = start.elapsed().as_millis() as u64,
        );
        Ok(report)
    }

    async fn evaluate(
        &self,
        node: &NodeSpec,
        inputs: &GraphInputs,
        working: &AttributeSet,
    ) -> Outcome {
        let identity = if node.prototype.authored {
            Provenance::Authored {
                prototype_id: node.prototype_id,
            }
        } else {
            Provenance::Prototype {
                prototype_id: node.prototype_id,
            }
        };

        let input = match gather(&node.plan, working) {
            Ok(input) => input,
            Err(blocked_by) => {
                return Outcome::settled(
                    &node.key,
                    AttributeState::Unresolved { blocked_by },
                    identity,
                )
            }
        };

        let func_id = match node.prototype.func {
            FuncRef::Identity => {
                return Outcome::settled(&node.key, AttributeState::Resolved { value: input }, identity)
            }
            FuncRef::Func(func_id) => func_id,
        };

        let hash = binding_hash(&input);
        let provenance = Provenance::Resolver {
            func_id,
            binding_hash: hash.clone(),
        };
        let Some(func) = inputs.funcs.get(&func_id) else {
            return Outcome::settled(
                &node.key,
                AttributeState::Failed {
                    message: format!("Function not found: {}", func_id),
                },
                provenance,
            );
        };

        let context = ResolverContext {
            component_id: node.key.entity_id,
            system_id: node.key.system_id,
        };
        let key = CacheKey {
            func_id,
            func_hash: func.definition_hash(),
            binding_hash: hash.clone(),
            context,
        };
        if let Some(value) = self.cache.get(&key) {
            let mut outcome = Outcome::settled(&node.key, AttributeState::Resolved { value }, provenance);
            outcome.cache_hit = true;
            return outcome;
        }

        let request = ExecutionRequest::new(func_id, func, input.clone(), context);
        let result = match self.limiter.acquire().await {
            Ok(_permit) => self.invoker.invoke(&request).await,
            Err(_) => Err(FunctionError::Internal("Invocation limiter closed".into())),
        };

        let mut outcome = match result {
            Ok(output) => {
                let func_hash = key.func_hash.clone();
                self.cache.insert(key, output.value.clone());
                let resolver = Resolver {
                    func_id,
                    func_hash,
                    binding_hash: hash,
                    context,
                    result: output.value.clone(),
                };
                let mut outcome = Outcome::settled(
                    &node.key,
                    AttributeState::Resolved {
                        value: output.value,
                    },
                    provenance,
                );
                outcome.resolver = Some((FuncBinding::new(func_id, input), resolver));
                outcome
            }
            Err(err) => Outcome::settled(
                &node.key,
                AttributeState::Failed {
                    message: err.to_string(),
                },
                provenance,
            ),
        };
        outcome.invoked = true;
        outcome
    }

    fn publish_changes(
        &self,
        ctx: &RequestContext,
        graph: &DependencyGraph,
        inputs: &GraphInputs,
        values: &AttributeSet,
        report: &RecomputeReport,
    ) {
        let scope = EventScope::for_request(ctx);

        let mut component_ids: Vec<LogicalId> = report
            .changed
            .iter()
            .chain(&report.removed)
            .map(|key| key.entity_id)
            .collect();
        component_ids.sort();
        component_ids.dedup();
        if !component_ids.is_empty() {
            self.events.publish(
                scope.clone(),
                EventPayload::DependentValuesUpdated { component_ids },
            );
        }

        for key in &report.changed {
            let generates_code = graph
                .node(key)
                .and_then(|node| match node.prototype.func {
                    FuncRef::Func(func_id) => inputs.funcs.get(&func_id),
                    FuncRef::Identity => None,
                })
                .map_or(false, |func| func.kind == FuncKind::CodeGeneration);
            let resolved = values.get(key).map_or(false, |v| v.state.is_resolved());
            if generates_code && resolved {
                self.events.publish(
                    scope.clone(),
                    EventPayload::CodeGenerated {
                        component_id: key.entity_id,
                        system_id: key.system_id,
                        path: key.path.clone(),
                    },
                );
            }
        }
    }
}

/// Collects a node's input from already computed values, or the keys that
/// block it.
fn gather(plan: &InputPlan, values: &AttributeSet) -> Result<Value, Vec<AttributeKey>> {
    let read = |key: &AttributeKey| values.get(key).and_then(|v| v.state.value()).cloned();
    match plan {
        InputPlan::Value(value) => Ok(value.clone()),
        InputPlan::Read(None) => Ok(Value::Null),
        InputPlan::Read(Some(key)) => read(key).ok_or_else(|| vec![key.clone()]),
        InputPlan::Aggregate(items) => {
            let mut blocked = Vec::new();
            let mut gathered = Vec::with_capacity(items.len());
            for (entity_id, key) in items {
                let value = match key {
                    None => Value::Null,
                    Some(key) => match read(key) {
                        Some(value) => value,
                        None => {
                            blocked.push(key.clone());
                            continue;
                        }
                    },
                };
                gathered.push(json!({ "entity_id": entity_id, "value": value }));
            }
            if blocked.is_empty() {
                Ok(Value::Array(gathered))
            } else {
                Err(blocked)
            }
        }
    }
}
