//! Dependent Value Propagation Tests
//!
//! Recompute behavior of the graph engine against a real store:
//! - Idempotent, byte-identical passes
//! - Cycles abort before any value changes
//! - Per-system overrides, cross-component reads and aggregation
//! - Change-set scopes are isolated from head

use std::sync::Arc;

use halyard::events::{EventEmitter, EventPayload, EventScope};
use halyard::functions::BuiltinExecutor;
use halyard::graph::{AttributeKey, GraphEngine, GraphError, ResolverConfig};
use halyard::ids::{LogicalId, SystemId, WorkspaceId};
use halyard::lifecycle::LifecycleManager;
use halyard::model::{
    Component, Edge, EdgeKind, EntityPayload, Func, FuncKind, Prototype, PrototypeContext, System,
    Vertex,
};
use halyard::store::{RequestContext, Store};
use halyard::tenancy::{TenancyContext, VisibilityContext};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

struct Harness {
    engine: GraphEngine,
    events: Arc<EventEmitter>,
    lifecycle: LifecycleManager,
    ctx: RequestContext,
    schema: LogicalId,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(Store::new());
        let events = Arc::new(EventEmitter::default());
        let engine = GraphEngine::new(
            store.clone(),
            events.clone(),
            Arc::new(BuiltinExecutor::new()),
            &ResolverConfig::default(),
        );
        Self {
            engine,
            lifecycle: LifecycleManager::new(store, events.clone()),
            events,
            ctx: RequestContext::head(TenancyContext::for_workspace(WorkspaceId::new())),
            schema: LogicalId::new(),
        }
    }

    fn create(&self, payload: EntityPayload) -> LogicalId {
        self.engine.store().create(&self.ctx, payload).unwrap().logical_id
    }

    fn component(&self, name: &str) -> LogicalId {
        self.create(EntityPayload::Component(Component::new(
            name,
            self.schema,
            LogicalId::new(),
        )))
    }

    fn system(&self, name: &str) -> SystemId {
        SystemId::from_logical(self.create(EntityPayload::System(System::new(name))))
    }

    fn prototype(&self, prototype: Prototype) -> LogicalId {
        self.create(EntityPayload::Prototype(prototype))
    }

    fn func(&self, kind: FuncKind, handler: &str) -> LogicalId {
        self.create(EntityPayload::Func(Func::new(handler, kind, handler)))
    }

    /// `tail` configures `head`.
    fn connect(&self, tail: LogicalId, head: LogicalId) {
        self.create(EntityPayload::Edge(Edge::new(
            EdgeKind::Configures,
            Vertex::new(LogicalId::new(), tail),
            Vertex::new(LogicalId::new(), head),
        )));
    }

    fn schema_ctx(&self) -> PrototypeContext {
        PrototypeContext::for_schema(self.schema)
    }
}

// =============================================================================
// Idempotence
// =============================================================================

#[tokio::test]
async fn test_recompute_is_byte_identical() {
    let h = Harness::new();
    let web = h.component("web");
    let db = h.component("db");
    h.connect(db, web);
    let to_string = h.func(FuncKind::Attribute, "json:to_string");
    let ctx = h.schema_ctx();
    h.prototype(Prototype::value("/port", ctx, json!(5432)));
    h.prototype(Prototype::copy_same("/port_label", ctx, "/port").with_func(to_string));
    h.prototype(Prototype::copy_related("/upstream_port", ctx, EdgeKind::Configures, "/port"));

    h.engine.recompute_all(&h.ctx).await.unwrap();
    let first = h.engine.attributes(&h.ctx).await.unwrap().to_json().unwrap();

    let report = h.engine.recompute_all(&h.ctx).await.unwrap();
    let second = h.engine.attributes(&h.ctx).await.unwrap().to_json().unwrap();
    assert_eq!(first, second);
    assert!(report.changed.is_empty());
    assert_eq!(report.invocations, 0);

    let set = h.engine.attributes(&h.ctx).await.unwrap();
    assert_eq!(set.resolved(db, "/port_label", SystemId::BASELINE), Some(&json!("5432")));
    assert_eq!(set.resolved(web, "/upstream_port", SystemId::BASELINE), Some(&json!(5432)));
    // db has no predecessor to copy from.
    assert_eq!(set.resolved(db, "/upstream_port", SystemId::BASELINE), Some(&json!(null)));
}

#[tokio::test]
async fn test_authored_change_propagates_downstream() {
    let h = Harness::new();
    let web = h.component("web");
    let db = h.component("db");
    h.connect(db, web);
    let ctx = h.schema_ctx();
    h.prototype(Prototype::value("/host", ctx, json!("localhost")));
    h.prototype(Prototype::copy_related("/db_host", ctx, EdgeKind::Configures, "/host"));
    h.engine.recompute_all(&h.ctx).await.unwrap();

    let mut rx = h.events.subscribe(EventScope::for_request(&h.ctx));
    let report = h
        .engine
        .set_authored_value(&h.ctx, db, "/host", SystemId::BASELINE, json!("db.internal"))
        .await
        .unwrap();

    assert!(report.changed.contains(&AttributeKey::baseline(db, "/host")));
    assert!(report.changed.contains(&AttributeKey::baseline(web, "/db_host")));
    let set = h.engine.attributes(&h.ctx).await.unwrap();
    assert_eq!(set.resolved(web, "/db_host", SystemId::BASELINE), Some(&json!("db.internal")));
    assert_eq!(set.resolved(web, "/host", SystemId::BASELINE), Some(&json!("localhost")));

    let event = rx.recv().await.unwrap();
    let mut expected = vec![web, db];
    expected.sort();
    assert_eq!(
        event.payload,
        EventPayload::DependentValuesUpdated {
            component_ids: expected
        }
    );
}

// =============================================================================
// Cycles
// =============================================================================

#[tokio::test]
async fn test_cycle_aborts_and_keeps_prior_values() {
    let h = Harness::new();
    let c = h.component("loop");
    let ctx = h.schema_ctx();
    h.prototype(Prototype::value("/a", ctx, json!("seed")));
    h.prototype(Prototype::copy_same("/b", ctx, "/a"));
    h.engine.recompute_all(&h.ctx).await.unwrap();
    let before = h.engine.attributes(&h.ctx).await.unwrap().to_json().unwrap();
    let events_before = h.events.recent(usize::MAX).len();

    // A component-level prototype outranks the schema default and closes the loop.
    h.prototype(Prototype::copy_same("/a", PrototypeContext::for_component(c), "/b"));
    let err = h.engine.recompute_all(&h.ctx).await.unwrap_err();
    match &err {
        GraphError::CycleDetected { nodes } => {
            assert!(nodes.contains(&AttributeKey::baseline(c, "/a")));
            assert!(nodes.contains(&AttributeKey::baseline(c, "/b")));
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
    assert_eq!(err.code(), "HALYARD_CYCLE_DETECTED");

    let after = h.engine.attributes(&h.ctx).await.unwrap().to_json().unwrap();
    assert_eq!(before, after);
    assert_eq!(h.events.recent(usize::MAX).len(), events_before);
}

// =============================================================================
// Systems and Relations
// =============================================================================

#[tokio::test]
async fn test_system_override_and_baseline_fallback() {
    let h = Harness::new();
    let c = h.component("vm");
    let prod = h.system("prod");
    let staging = h.system("staging");
    let ctx = h.schema_ctx();
    h.prototype(Prototype::value("/region", ctx, json!("us-east-1")));
    h.prototype(Prototype::value("/region", ctx.in_system(prod), json!("eu-west-1")));
    h.prototype(Prototype::copy_same("/zone", ctx, "/region"));

    h.engine.recompute_all(&h.ctx).await.unwrap();
    let set = h.engine.attributes(&h.ctx).await.unwrap();
    assert_eq!(set.resolved(c, "/region", prod), Some(&json!("eu-west-1")));
    assert_eq!(set.resolved(c, "/zone", prod), Some(&json!("eu-west-1")));
    assert_eq!(set.resolved(c, "/region", staging), Some(&json!("us-east-1")));
    assert_eq!(set.resolved(c, "/zone", SystemId::BASELINE), Some(&json!("us-east-1")));
}

#[tokio::test]
async fn test_aggregate_orders_by_entity() {
    let h = Harness::new();
    let lb = h.component("lb");
    let first = h.component("app-1");
    let second = h.component("app-2");
    h.connect(first, lb);
    h.connect(second, lb);
    h.prototype(Prototype::value("/ip", PrototypeContext::for_component(first), json!("10.0.0.1")));
    h.prototype(Prototype::value("/ip", PrototypeContext::for_component(second), json!("10.0.0.2")));
    h.prototype(Prototype::aggregate(
        "/backends",
        PrototypeContext::for_component(lb),
        EdgeKind::Configures,
        "/ip",
    ));

    h.engine.recompute_all(&h.ctx).await.unwrap();
    let set = h.engine.attributes(&h.ctx).await.unwrap();
    let backends = set.resolved(lb, "/backends", SystemId::BASELINE).unwrap();
    let mut expected = vec![(first, "10.0.0.1"), (second, "10.0.0.2")];
    expected.sort();
    let expected: Vec<_> = expected
        .into_iter()
        .map(|(id, ip)| json!({"entity_id": id, "value": ip}))
        .collect();
    assert_eq!(backends, &json!(expected));
}

#[tokio::test]
async fn test_codegen_change_emits_event() {
    let h = Harness::new();
    let c = h.component("svc");
    let codegen = h.func(FuncKind::CodeGeneration, "codegen:json");
    let ctx = h.schema_ctx();
    h.prototype(Prototype::value("/spec", ctx, json!({"replicas": 2})));
    h.prototype(Prototype::copy_same("/code", ctx, "/spec").with_func(codegen));

    h.engine.recompute_all(&h.ctx).await.unwrap();
    let generated = h.events.recent(usize::MAX).into_iter().any(|event| {
        event.payload
            == EventPayload::CodeGenerated {
                component_id: c,
                system_id: SystemId::BASELINE,
                path: "/code".into(),
            }
    });
    assert!(generated);
    let set = h.engine.attributes(&h.ctx).await.unwrap();
    assert_eq!(set.resolved(c, "/code", SystemId::BASELINE).unwrap()["format"], "json");
}

// =============================================================================
// Resolver Cache
// =============================================================================

#[tokio::test]
async fn test_func_edit_reinvokes_instead_of_hitting_cache() {
    let h = Harness::new();
    let c = h.component("svc");
    let func = h.func(FuncKind::Attribute, "identity");
    let ctx = h.schema_ctx();
    h.prototype(Prototype::value("/a", ctx, json!({"k": 1})));
    h.prototype(Prototype::copy_same("/s", ctx, "/a").with_func(func));
    h.engine.recompute_all(&h.ctx).await.unwrap();

    h.engine
        .store()
        .update(
            &h.ctx,
            func,
            EntityPayload::Func(Func::new("identity", FuncKind::Attribute, "json:to_string")),
        )
        .unwrap();
    let report = h.engine.recompute_all(&h.ctx).await.unwrap();
    assert_eq!(report.invocations, 1);
    assert_eq!(report.cache_hits, 0);
    assert!(report.changed.contains(&AttributeKey::baseline(c, "/s")));
    let set = h.engine.attributes(&h.ctx).await.unwrap();
    assert_eq!(set.resolved(c, "/s", SystemId::BASELINE), Some(&json!("{\"k\":1}")));

    // A fresh engine only warms from resolvers of the current definition.
    let fresh = GraphEngine::new(
        h.engine.store().clone(),
        h.events.clone(),
        Arc::new(BuiltinExecutor::new()),
        &ResolverConfig::default(),
    );
    assert_eq!(fresh.warm_cache(&h.ctx).unwrap(), 1);
    let report = fresh.recompute_all(&h.ctx).await.unwrap();
    assert_eq!(report.invocations, 0);
    let set = fresh.attributes(&h.ctx).await.unwrap();
    assert_eq!(set.resolved(c, "/s", SystemId::BASELINE), Some(&json!("{\"k\":1}")));
}

#[tokio::test]
async fn test_func_edit_in_change_set_does_not_reuse_head_results() {
    let h = Harness::new();
    let c = h.component("svc");
    let func = h.func(FuncKind::Attribute, "identity");
    let ctx = h.schema_ctx();
    h.prototype(Prototype::value("/a", ctx, json!({"k": 1})));
    h.prototype(Prototype::copy_same("/s", ctx, "/a").with_func(func));
    h.engine.recompute_all(&h.ctx).await.unwrap();

    let cs = h.lifecycle.open_change_set(&h.ctx.tenancy, "new-handler").unwrap();
    let cs_ctx = h.ctx.with_visibility(VisibilityContext::change_set(cs.id));
    h.engine
        .store()
        .update(
            &cs_ctx,
            func,
            EntityPayload::Func(Func::new("identity", FuncKind::Attribute, "json:to_string")),
        )
        .unwrap();

    let report = h.engine.recompute_all(&cs_ctx).await.unwrap();
    assert_eq!(report.invocations, 1);
    let in_change_set = h.engine.attributes(&cs_ctx).await.unwrap();
    assert_eq!(
        in_change_set.resolved(c, "/s", SystemId::BASELINE),
        Some(&json!("{\"k\":1}"))
    );

    let report = h.engine.recompute_all(&h.ctx).await.unwrap();
    assert_eq!(report.invocations, 0);
    let on_head = h.engine.attributes(&h.ctx).await.unwrap();
    assert_eq!(on_head.resolved(c, "/s", SystemId::BASELINE), Some(&json!({"k": 1})));
}

// =============================================================================
// Scopes
// =============================================================================

#[tokio::test]
async fn test_change_set_scope_isolated_from_head() {
    let h = Harness::new();
    let c = h.component("vm");
    h.prototype(Prototype::value("/size", h.schema_ctx(), json!("small")));
    h.engine.recompute_all(&h.ctx).await.unwrap();

    let cs = h.lifecycle.open_change_set(&h.ctx.tenancy, "resize").unwrap();
    let cs_ctx = h.ctx.with_visibility(VisibilityContext::change_set(cs.id));
    h.engine
        .set_authored_value(&cs_ctx, c, "/size", SystemId::BASELINE, json!("large"))
        .await
        .unwrap();

    let in_change_set = h.engine.attributes(&cs_ctx).await.unwrap();
    assert_eq!(in_change_set.resolved(c, "/size", SystemId::BASELINE), Some(&json!("large")));
    let on_head = h.engine.attributes(&h.ctx).await.unwrap();
    assert_eq!(on_head.resolved(c, "/size", SystemId::BASELINE), Some(&json!("small")));

    h.lifecycle.apply_change_set(&h.ctx.tenancy, cs.id).unwrap();
    h.engine.recompute_all(&h.ctx).await.unwrap();
    let applied = h.engine.attributes(&h.ctx).await.unwrap();
    assert_eq!(applied.resolved(c, "/size", SystemId::BASELINE), Some(&json!("large")));
}
