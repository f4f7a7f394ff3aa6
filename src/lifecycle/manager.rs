//! Change-set and edit-session operations
//!
//! Every operation runs in one store transaction: the status change and the
//! rows it rewrites commit together or not at all. Events are published
//! after the commit.

use std::sync::Arc;

use tracing::{info, warn};

use super::errors::{LifecycleError, LifecycleResult};
use super::state::{
    change_set_transition, edit_session_transition, ChangeSetAction, EditSessionAction,
};
use crate::events::{EventEmitter, EventPayload, EventScope};
use crate::ids::{ChangeSetId, EditSessionId, LogicalId};
use crate::store::{
    ChangeSet, ChangeSetStatus, EditSession, EditSessionStatus, Store, StoreError, WriteTxn,
};
use crate::tenancy::{Tenancy, TenancyContext, TenancyError, Visibility};

#[derive(Debug, Clone)]
pub struct LifecycleManager {
    store: Arc<Store>,
    events: Arc<EventEmitter>,
}

impl LifecycleManager {
    pub fn new(store: Arc<Store>, events: Arc<EventEmitter>) -> Self {
        Self { store, events }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn open_change_set(
        &self,
        tenancy: &TenancyContext,
        name: impl Into<String>,
    ) -> LifecycleResult<ChangeSet> {
        self.open_change_set_with_id(tenancy, ChangeSetId::new(), name)
    }

    /// Opens a change set with a caller-chosen id (fixture loading).
    pub fn open_change_set_with_id(
        &self,
        tenancy: &TenancyContext,
        id: ChangeSetId,
        name: impl Into<String>,
    ) -> LifecycleResult<ChangeSet> {
        tenancy.check()?;
        let name = name.into();
        let change_set = self.store.transaction(|tx| {
            let change_set = ChangeSet {
                id,
                name,
                tenancy: Tenancy::from_context(tenancy),
                status: ChangeSetStatus::Open,
                opened_at: tx.watermark(),
            };
            tx.branches_mut().insert_change_set(change_set.clone())?;
            Ok::<_, LifecycleError>(change_set)
        })?;

        info!(
            event = "CHANGE_SET_CREATED",
            change_set_id = %change_set.id,
            opened_at = change_set.opened_at.value(),
        );
        self.events.publish(
            EventScope::tenant(tenancy),
            EventPayload::ChangeSetCreated {
                change_set_id: change_set.id,
            },
        );
        Ok(change_set)
    }

    pub fn open_edit_session(
        &self,
        tenancy: &TenancyContext,
        change_set_id: ChangeSetId,
    ) -> LifecycleResult<EditSession> {
        self.open_edit_session_with_id(tenancy, change_set_id, EditSessionId::new())
    }

    pub fn open_edit_session_with_id(
        &self,
        tenancy: &TenancyContext,
        change_set_id: ChangeSetId,
        id: EditSessionId,
    ) -> LifecycleResult<EditSession> {
        tenancy.check()?;
        let edit_session = self.store.transaction(|tx| {
            let change_set = owned_change_set(tx, tenancy, change_set_id)?;
            if change_set.status != ChangeSetStatus::Open {
                return Err(LifecycleError::InvalidTransition {
                    branch: format!("change set {}", change_set_id),
                    state: change_set.status.to_string(),
                    action: "open an edit session in",
                });
            }
            let edit_session = EditSession {
                id,
                change_set_id,
                tenancy: change_set.tenancy.clone(),
                status: EditSessionStatus::Open,
                opened_at: tx.watermark(),
            };
            tx.branches_mut().insert_edit_session(edit_session.clone())?;
            Ok(edit_session)
        })?;

        info!(
            event = "EDIT_SESSION_OPENED",
            change_set_id = %change_set_id,
            edit_session_id = %edit_session.id,
        );
        Ok(edit_session)
    }

    /// Rewrites every entity touched in the edit session into its change
    /// set.
    ///
    /// Conflicts when a change-set row for one of those entities was
    /// committed after the session opened.
    pub fn save_edit_session(
        &self,
        tenancy: &TenancyContext,
        edit_session_id: EditSessionId,
    ) -> LifecycleResult<Vec<LogicalId>> {
        tenancy.check()?;
        let (change_set_id, written) = self.store.transaction(|tx| {
            let edit_session = owned_edit_session(tx, tenancy, edit_session_id)?;
            let change_set = owned_change_set(tx, tenancy, edit_session.change_set_id)?;
            if change_set.status != ChangeSetStatus::Open {
                return Err(LifecycleError::InvalidTransition {
                    branch: format!("edit session {}", edit_session_id),
                    state: format!("its change set is {}", change_set.status),
                    action: "save",
                });
            }
            let next = edit_session_transition(&edit_session, EditSessionAction::Save)?;

            let rows = tx.branch_rows(Some(change_set.id), Some(edit_session_id));
            for logical_id in rows.keys() {
                if let Some(version) = tx.latest_on_branch(*logical_id, Some(change_set.id), None) {
                    if version > edit_session.opened_at {
                        return Err(StoreError::ApplyConflict {
                            logical_id: *logical_id,
                            change_set_id: Some(change_set.id),
                            reason: format!(
                                "change set row {} was written after edit session {} opened",
                                version, edit_session_id
                            ),
                        }
                        .into());
                    }
                }
            }

            for row in rows.values() {
                let visibility = Visibility {
                    change_set_id: Some(change_set.id),
                    edit_session_id: None,
                    deleted: row.visibility.deleted,
                };
                tx.rewrite(row, visibility)?;
            }
            tx.branches_mut()
                .set_edit_session_status(edit_session_id, next)?;
            Ok::<_, LifecycleError>((change_set.id, rows.into_keys().collect::<Vec<_>>()))
        })?;

        info!(
            event = "EDIT_SESSION_SAVED",
            change_set_id = %change_set_id,
            edit_session_id = %edit_session_id,
            rows = written.len(),
        );
        self.events.publish(
            EventScope::change_set(tenancy, change_set_id),
            EventPayload::ChangeSetWritten {
                change_set_id,
                edit_session_id,
                written: written.clone(),
            },
        );
        Ok(written)
    }

    pub fn cancel_edit_session(
        &self,
        tenancy: &TenancyContext,
        edit_session_id: EditSessionId,
    ) -> LifecycleResult<EditSession> {
        tenancy.check()?;
        let edit_session = self.store.transaction(|tx| {
            let mut edit_session = owned_edit_session(tx, tenancy, edit_session_id)?;
            let next = edit_session_transition(&edit_session, EditSessionAction::Cancel)?;
            tx.branches_mut()
                .set_edit_session_status(edit_session_id, next)?;
            edit_session.status = next;
            Ok::<_, LifecycleError>(edit_session)
        })?;

        info!(
            event = "EDIT_SESSION_CANCELED",
            change_set_id = %edit_session.change_set_id,
            edit_session_id = %edit_session_id,
        );
        Ok(edit_session)
    }

    /// Rewrites every entity touched in the change set onto head.
    ///
    /// Refused while edit sessions are open. Conflicts when head was written
    /// for one of those entities after the change set opened.
    pub fn apply_change_set(
        &self,
        tenancy: &TenancyContext,
        change_set_id: ChangeSetId,
    ) -> LifecycleResult<Vec<LogicalId>> {
        tenancy.check()?;
        let result = self.store.transaction(|tx| {
            let change_set = owned_change_set(tx, tenancy, change_set_id)?;
            let next = change_set_transition(&change_set, ChangeSetAction::Apply)?;

            let open_sessions = tx
                .branches()
                .edit_sessions_of(change_set_id)
                .filter(|es| es.status == EditSessionStatus::Open)
                .count();
            if open_sessions > 0 {
                return Err(LifecycleError::InvalidTransition {
                    branch: format!("change set {}", change_set_id),
                    state: format!("{} edit sessions are open", open_sessions),
                    action: "apply",
                });
            }

            let rows = tx.branch_rows(Some(change_set_id), None);
            for logical_id in rows.keys() {
                if let Some(version) = tx.latest_on_branch(*logical_id, None, None) {
                    if version > change_set.opened_at {
                        return Err(StoreError::ApplyConflict {
                            logical_id: *logical_id,
                            change_set_id: Some(change_set_id),
                            reason: format!(
                                "head row {} was written after change set opened at {}",
                                version, change_set.opened_at
                            ),
                        }
                        .into());
                    }
                }
            }

            for row in rows.values() {
                let visibility = Visibility {
                    deleted: row.visibility.deleted,
                    ..Visibility::head()
                };
                tx.rewrite(row, visibility)?;
            }
            tx.branches_mut().set_change_set_status(change_set_id, next)?;
            Ok::<_, LifecycleError>(rows.into_keys().collect::<Vec<_>>())
        });

        let applied = match result {
            Ok(applied) => applied,
            Err(err) => {
                warn!(
                    event = "CHANGE_SET_APPLY_FAILED",
                    change_set_id = %change_set_id,
                    code = err.code(),
                    error = %err,
                );
                return Err(err);
            }
        };

        info!(
            event = "CHANGE_SET_APPLIED",
            change_set_id = %change_set_id,
            rows = applied.len(),
        );
        self.events.publish(
            EventScope::tenant(tenancy),
            EventPayload::ChangeSetApplied {
                change_set_id,
                applied: applied.clone(),
            },
        );
        Ok(applied)
    }

    /// Cancels the change set and every edit session still open in it.
    pub fn cancel_change_set(
        &self,
        tenancy: &TenancyContext,
        change_set_id: ChangeSetId,
    ) -> LifecycleResult<ChangeSet> {
        tenancy.check()?;
        let (change_set, cascaded) = self.store.transaction(|tx| {
            let mut change_set = owned_change_set(tx, tenancy, change_set_id)?;
            let next = change_set_transition(&change_set, ChangeSetAction::Cancel)?;

            let open: Vec<EditSessionId> = tx
                .branches()
                .edit_sessions_of(change_set_id)
                .filter(|es| es.status == EditSessionStatus::Open)
                .map(|es| es.id)
                .collect();
            for id in &open {
                tx.branches_mut()
                    .set_edit_session_status(*id, EditSessionStatus::Canceled)?;
            }
            tx.branches_mut().set_change_set_status(change_set_id, next)?;
            change_set.status = next;
            Ok::<_, LifecycleError>((change_set, open.len()))
        })?;

        info!(
            event = "CHANGE_SET_CANCELED",
            change_set_id = %change_set_id,
            edit_sessions_canceled = cascaded,
        );
        self.events.publish(
            EventScope::tenant(tenancy),
            EventPayload::ChangeSetCanceled { change_set_id },
        );
        Ok(change_set)
    }
}

fn owned_change_set(
    tx: &WriteTxn<'_>,
    tenancy: &TenancyContext,
    change_set_id: ChangeSetId,
) -> LifecycleResult<ChangeSet> {
    let change_set = tx
        .branches()
        .change_set(change_set_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("change set {}", change_set_id)))?;
    if !tenancy.admits(&change_set.tenancy) {
        return Err(TenancyError::TenancyViolation(format!(
            "change set {} belongs to another tenant",
            change_set_id
        ))
        .into());
    }
    Ok(change_set.clone())
}

fn owned_edit_session(
    tx: &WriteTxn<'_>,
    tenancy: &TenancyContext,
    edit_session_id: EditSessionId,
) -> LifecycleResult<EditSession> {
    let edit_session = tx
        .branches()
        .edit_session(edit_session_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("edit session {}", edit_session_id)))?;
    if !tenancy.admits(&edit_session.tenancy) {
        return Err(TenancyError::TenancyViolation(format!(
            "edit session {} belongs to another tenant",
            edit_session_id
        ))
        .into());
    }
    Ok(edit_session.clone())
}
