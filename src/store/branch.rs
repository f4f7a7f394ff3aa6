//! Branch records
//!
//! Change sets and edit sessions live in the store next to the rows they
//! scope, so a branch status change and the rows it rewrites commit in the
//! same transaction. Which transitions are legal is decided by the
//! lifecycle layer; the registry only records them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::{StoreError, StoreResult};
use crate::ids::{ChangeSetId, EditSessionId, VersionId};
use crate::tenancy::{InertBranches, Tenancy, TenancyContext, VisibilityContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeSetStatus {
    Open,
    Applied,
    Canceled,
}

impl ChangeSetStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChangeSetStatus::Open)
    }
}

impl fmt::Display for ChangeSetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeSetStatus::Open => write!(f, "open"),
            ChangeSetStatus::Applied => write!(f, "applied"),
            ChangeSetStatus::Canceled => write!(f, "canceled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditSessionStatus {
    Open,
    Saved,
    Canceled,
}

impl EditSessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EditSessionStatus::Open)
    }
}

impl fmt::Display for EditSessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditSessionStatus::Open => write!(f, "open"),
            EditSessionStatus::Saved => write!(f, "saved"),
            EditSessionStatus::Canceled => write!(f, "canceled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub id: ChangeSetId,

    pub name: String,

    pub tenancy: Tenancy,

    pub status: ChangeSetStatus,

    /// Store watermark when the change set opened
    pub opened_at: VersionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSession {
    pub id: EditSessionId,

    pub change_set_id: ChangeSetId,

    pub tenancy: Tenancy,

    pub status: EditSessionStatus,

    /// Store watermark when the edit session opened
    pub opened_at: VersionId,
}

/// All branches known to the store, plus the derived inert set.
#[derive(Debug, Clone, Default)]
pub struct BranchRegistry {
    change_sets: BTreeMap<ChangeSetId, ChangeSet>,
    edit_sessions: BTreeMap<EditSessionId, EditSession>,
    inert: Arc<InertBranches>,
}

impl BranchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn change_set(&self, id: ChangeSetId) -> Option<&ChangeSet> {
        self.change_sets.get(&id)
    }

    pub fn edit_session(&self, id: EditSessionId) -> Option<&EditSession> {
        self.edit_sessions.get(&id)
    }

    pub fn change_sets(&self) -> impl Iterator<Item = &ChangeSet> {
        self.change_sets.values()
    }

    /// Edit sessions nested in a change set.
    pub fn edit_sessions_of(&self, change_set_id: ChangeSetId) -> impl Iterator<Item = &EditSession> {
        self.edit_sessions
            .values()
            .filter(move |es| es.change_set_id == change_set_id)
    }

    pub fn inert(&self) -> &Arc<InertBranches> {
        &self.inert
    }

    pub fn insert_change_set(&mut self, change_set: ChangeSet) -> StoreResult<()> {
        if self.change_sets.contains_key(&change_set.id) {
            return Err(StoreError::ConstraintError(format!(
                "change set {} already exists",
                change_set.id
            )));
        }
        if change_set.status.is_terminal() {
            Arc::make_mut(&mut self.inert).change_sets.insert(change_set.id);
        }
        self.change_sets.insert(change_set.id, change_set);
        Ok(())
    }

    pub fn insert_edit_session(&mut self, edit_session: EditSession) -> StoreResult<()> {
        if self.edit_sessions.contains_key(&edit_session.id) {
            return Err(StoreError::ConstraintError(format!(
                "edit session {} already exists",
                edit_session.id
            )));
        }
        if !self.change_sets.contains_key(&edit_session.change_set_id) {
            return Err(StoreError::ConstraintError(format!(
                "edit session {} references unknown change set {}",
                edit_session.id, edit_session.change_set_id
            )));
        }
        if edit_session.status.is_terminal() {
            Arc::make_mut(&mut self.inert)
                .edit_sessions
                .insert(edit_session.id);
        }
        self.edit_sessions.insert(edit_session.id, edit_session);
        Ok(())
    }

    pub fn set_change_set_status(
        &mut self,
        id: ChangeSetId,
        status: ChangeSetStatus,
    ) -> StoreResult<()> {
        let change_set = self
            .change_sets
            .get_mut(&id)
            .ok_or_else(|| StoreError::ConstraintError(format!("unknown change set {}", id)))?;
        change_set.status = status;
        if status.is_terminal() {
            Arc::make_mut(&mut self.inert).change_sets.insert(id);
        }
        Ok(())
    }

    pub fn set_edit_session_status(
        &mut self,
        id: EditSessionId,
        status: EditSessionStatus,
    ) -> StoreResult<()> {
        let edit_session = self
            .edit_sessions
            .get_mut(&id)
            .ok_or_else(|| StoreError::ConstraintError(format!("unknown edit session {}", id)))?;
        edit_session.status = status;
        if status.is_terminal() {
            Arc::make_mut(&mut self.inert).edit_sessions.insert(id);
        }
        Ok(())
    }

    /// Rejects writes to a branch that is unknown, closed, outside the
    /// caller's tenancy, or an edit session outside its change set.
    pub fn check_writable(
        &self,
        tenancy: &TenancyContext,
        visibility: &VisibilityContext,
    ) -> StoreResult<()> {
        visibility.check()?;

        if let Some(change_set_id) = visibility.change_set_id {
            let change_set = self.change_sets.get(&change_set_id).ok_or_else(|| {
                StoreError::VisibilityConflict {
                    logical_id: None,
                    change_set_id: Some(change_set_id),
                    reason: format!("change set {} does not exist", change_set_id),
                }
            })?;
            if !tenancy.admits(&change_set.tenancy) {
                return Err(crate::tenancy::TenancyError::TenancyViolation(format!(
                    "change set {} belongs to another tenant",
                    change_set_id
                ))
                .into());
            }
            if change_set.status != ChangeSetStatus::Open {
                return Err(StoreError::VisibilityConflict {
                    logical_id: None,
                    change_set_id: Some(change_set_id),
                    reason: format!("change set {} is {}", change_set_id, change_set.status),
                });
            }
        }

        if let Some(edit_session_id) = visibility.edit_session_id {
            let edit_session = self.edit_sessions.get(&edit_session_id).ok_or_else(|| {
                StoreError::VisibilityConflict {
                    logical_id: None,
                    change_set_id: visibility.change_set_id,
                    reason: format!("edit session {} does not exist", edit_session_id),
                }
            })?;
            if Some(edit_session.change_set_id) != visibility.change_set_id {
                return Err(StoreError::VisibilityConflict {
                    logical_id: None,
                    change_set_id: visibility.change_set_id,
                    reason: format!(
                        "edit session {} belongs to change set {}",
                        edit_session_id, edit_session.change_set_id
                    ),
                });
            }
            if edit_session.status != EditSessionStatus::Open {
                return Err(StoreError::VisibilityConflict {
                    logical_id: None,
                    change_set_id: visibility.change_set_id,
                    reason: format!("edit session {} is {}", edit_session_id, edit_session.status),
                });
            }
        }

        Ok(())
    }
}
