//! Branch state machines
//!
//! ```text
//! ChangeSet:   Open --apply--> Applied
//!              Open --cancel-> Canceled
//! EditSession: Open --save---> Saved
//!              Open --cancel-> Canceled
//! ```
//!
//! Applied, Saved and Canceled are terminal.

use super::errors::{LifecycleError, LifecycleResult};
use crate::store::{ChangeSet, ChangeSetStatus, EditSession, EditSessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSetAction {
    Apply,
    Cancel,
}

impl ChangeSetAction {
    fn as_str(&self) -> &'static str {
        match self {
            ChangeSetAction::Apply => "apply",
            ChangeSetAction::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditSessionAction {
    Save,
    Cancel,
}

impl EditSessionAction {
    fn as_str(&self) -> &'static str {
        match self {
            EditSessionAction::Save => "save",
            EditSessionAction::Cancel => "cancel",
        }
    }
}

pub fn change_set_transition(
    change_set: &ChangeSet,
    action: ChangeSetAction,
) -> LifecycleResult<ChangeSetStatus> {
    match (change_set.status, action) {
        (ChangeSetStatus::Open, ChangeSetAction::Apply) => Ok(ChangeSetStatus::Applied),
        (ChangeSetStatus::Open, ChangeSetAction::Cancel) => Ok(ChangeSetStatus::Canceled),
        (state, action) => Err(LifecycleError::InvalidTransition {
            branch: format!("change set {}", change_set.id),
            state: state.to_string(),
            action: action.as_str(),
        }),
    }
}

pub fn edit_session_transition(
    edit_session: &EditSession,
    action: EditSessionAction,
) -> LifecycleResult<EditSessionStatus> {
    match (edit_session.status, action) {
        (EditSessionStatus::Open, EditSessionAction::Save) => Ok(EditSessionStatus::Saved),
        (EditSessionStatus::Open, EditSessionAction::Cancel) => Ok(EditSessionStatus::Canceled),
        (state, action) => Err(LifecycleError::InvalidTransition {
            branch: format!("edit session {}", edit_session.id),
            state: state.to_string(),
            action: action.as_str(),
        }),
    }
}
