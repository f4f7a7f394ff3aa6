//! Visibility Precedence Tests
//!
//! Resolution across head, change-set and edit-session rows:
//! - Narrowest branch wins regardless of write order
//! - Canceled branches never resolve
//! - Tenancy filters rows before precedence

use std::sync::Arc;

use halyard::events::EventEmitter;
use halyard::ids::{ChangeSetId, EditSessionId, LogicalId, WorkspaceId};
use halyard::lifecycle::LifecycleManager;
use halyard::model::{EntityPayload, System};
use halyard::store::{ListOptions, RequestContext, Store};
use halyard::tenancy::{Tenancy, TenancyContext, Visibility, VisibilityContext};

// =============================================================================
// Helper Functions
// =============================================================================

struct Fixture {
    lifecycle: LifecycleManager,
    tenancy: TenancyContext,
    workspace: WorkspaceId,
    change_set: ChangeSetId,
    edit_session: EditSessionId,
}

impl Fixture {
    fn new() -> Self {
        let workspace = WorkspaceId::new();
        let tenancy = TenancyContext::for_workspace(workspace);
        let lifecycle = LifecycleManager::new(Arc::new(Store::new()), Arc::new(EventEmitter::default()));
        let change_set = lifecycle.open_change_set(&tenancy, "edit").unwrap().id;
        let edit_session = lifecycle.open_edit_session(&tenancy, change_set).unwrap().id;
        Self {
            lifecycle,
            tenancy,
            workspace,
            change_set,
            edit_session,
        }
    }

    fn store(&self) -> &Arc<Store> {
        self.lifecycle.store()
    }

    fn visibility(&self, level: &str) -> Visibility {
        match level {
            "head" => Visibility::head(),
            "change_set" => Visibility::from_context(&VisibilityContext::change_set(self.change_set)),
            _ => Visibility::from_context(&VisibilityContext::edit_session(
                self.change_set,
                self.edit_session,
            )),
        }
    }

    /// Writes one version per level, in the given order.
    fn write_in_order(&self, id: LogicalId, order: &[&str]) {
        self.store()
            .transaction(|tx| {
                for level in order {
                    tx.write_version(
                        id,
                        Tenancy::for_workspace(self.workspace),
                        self.visibility(level),
                        system(level),
                    )?;
                }
                Ok::<_, halyard::store::StoreError>(())
            })
            .unwrap();
    }

    fn ctx(&self, visibility: VisibilityContext) -> RequestContext {
        RequestContext::new(self.tenancy.clone(), visibility)
    }

    fn name_at(&self, id: LogicalId, visibility: VisibilityContext) -> Option<String> {
        self.store()
            .get(&self.ctx(visibility), id, false)
            .unwrap()
            .map(|row| match &row.payload {
                EntityPayload::System(system) => system.name.clone(),
                other => panic!("unexpected payload {:?}", other),
            })
    }
}

fn system(name: &str) -> EntityPayload {
    EntityPayload::System(System::new(name))
}

// =============================================================================
// Precedence
// =============================================================================

#[test]
fn test_precedence_independent_of_write_order() {
    let orders: [[&str; 3]; 6] = [
        ["head", "change_set", "edit_session"],
        ["head", "edit_session", "change_set"],
        ["change_set", "head", "edit_session"],
        ["change_set", "edit_session", "head"],
        ["edit_session", "head", "change_set"],
        ["edit_session", "change_set", "head"],
    ];
    let f = Fixture::new();
    for order in &orders {
        let id = LogicalId::new();
        f.write_in_order(id, order);

        let es = VisibilityContext::edit_session(f.change_set, f.edit_session);
        let cs = VisibilityContext::change_set(f.change_set);
        assert_eq!(f.name_at(id, es).as_deref(), Some("edit_session"), "order {:?}", order);
        assert_eq!(f.name_at(id, cs).as_deref(), Some("change_set"), "order {:?}", order);
        assert_eq!(
            f.name_at(id, VisibilityContext::head()).as_deref(),
            Some("head"),
            "order {:?}",
            order
        );
    }
}

#[test]
fn test_falls_back_to_wider_branch() {
    let f = Fixture::new();
    let head_only = LogicalId::new();
    f.write_in_order(head_only, &["head"]);
    let cs_only = LogicalId::new();
    f.write_in_order(cs_only, &["change_set"]);

    let es = VisibilityContext::edit_session(f.change_set, f.edit_session);
    assert_eq!(f.name_at(head_only, es).as_deref(), Some("head"));
    assert_eq!(f.name_at(cs_only, es).as_deref(), Some("change_set"));
    assert_eq!(f.name_at(cs_only, VisibilityContext::head()), None);
}

#[test]
fn test_latest_version_wins_within_branch() {
    let f = Fixture::new();
    let head = f.ctx(VisibilityContext::head());
    let row = f.store().create(&head, system("v1")).unwrap();
    f.store().update(&head, row.logical_id, system("v2")).unwrap();
    assert_eq!(
        f.name_at(row.logical_id, VisibilityContext::head()).as_deref(),
        Some("v2")
    );
}

// =============================================================================
// Tombstones and Canceled Branches
// =============================================================================

#[test]
fn test_tombstone_hides_row_unless_requested() {
    let f = Fixture::new();
    let cs = f.ctx(VisibilityContext::change_set(f.change_set));
    let row = f.store().create(&f.ctx(VisibilityContext::head()), system("prod")).unwrap();
    f.store().mark_deleted(&cs, row.logical_id).unwrap();

    assert!(f.store().get(&cs, row.logical_id, false).unwrap().is_none());
    let deleted = f.store().get(&cs, row.logical_id, true).unwrap().unwrap();
    assert!(deleted.is_deleted());
    // Head still sees the live row.
    assert!(f
        .store()
        .get(&f.ctx(VisibilityContext::head()), row.logical_id, false)
        .unwrap()
        .is_some());
}

#[test]
fn test_canceled_change_set_never_resolves() {
    let f = Fixture::new();
    let id = LogicalId::new();
    f.write_in_order(id, &["head", "change_set", "edit_session"]);
    f.lifecycle.cancel_change_set(&f.tenancy, f.change_set).unwrap();

    let cs = f.ctx(VisibilityContext::change_set(f.change_set));
    let es = f.ctx(VisibilityContext::edit_session(f.change_set, f.edit_session));
    for ctx in [&cs, &es] {
        let row = f.store().get(ctx, id, true).unwrap().unwrap();
        assert!(row.visibility.is_head());

        let listed = f
            .store()
            .list(ctx, ListOptions { include_deleted: true, kind: None }, |_| true)
            .unwrap()
            .to_vec();
        assert_eq!(listed.len(), 1);
        assert!(listed.iter().all(|row| row.visibility.is_head()));
    }
}

#[test]
fn test_canceled_edit_session_falls_back_to_change_set() {
    let f = Fixture::new();
    let id = LogicalId::new();
    f.write_in_order(id, &["change_set", "edit_session"]);
    f.lifecycle.cancel_edit_session(&f.tenancy, f.edit_session).unwrap();

    let es = VisibilityContext::edit_session(f.change_set, f.edit_session);
    assert_eq!(f.name_at(id, es).as_deref(), Some("change_set"));
}

// =============================================================================
// Tenancy
// =============================================================================

#[test]
fn test_other_workspace_rows_invisible() {
    let f = Fixture::new();
    let other = TenancyContext::for_workspace(WorkspaceId::new());
    let row = f
        .store()
        .create(&RequestContext::head(other.clone()), system("theirs"))
        .unwrap();

    assert!(f
        .store()
        .get(&f.ctx(VisibilityContext::head()), row.logical_id, true)
        .unwrap()
        .is_none());
    assert!(f
        .store()
        .get(&RequestContext::head(other), row.logical_id, false)
        .unwrap()
        .is_some());
}

#[test]
fn test_edit_session_without_change_set_rejected() {
    let f = Fixture::new();
    let ctx = f.ctx(VisibilityContext {
        change_set_id: None,
        edit_session_id: Some(f.edit_session),
    });
    let err = f.store().get(&ctx, LogicalId::new(), false).unwrap_err();
    assert_eq!(err.code(), "HALYARD_VISIBILITY_CONFLICT");
}
