//! Visibility - which branch a row belongs to
//!
//! The absence of both a change set and an edit session is the head
//! timeline. An edit session is always nested in exactly one change set.

use serde::{Deserialize, Serialize};

use super::errors::{TenancyError, TenancyResult};
use crate::ids::{ChangeSetId, EditSessionId};

/// The visibility recorded on a stored row.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Visibility {
    #[serde(default)]
    pub change_set_id: Option<ChangeSetId>,

    #[serde(default)]
    pub edit_session_id: Option<EditSessionId>,

    /// Tombstone marker
    #[serde(default)]
    pub deleted: bool,
}

impl Visibility {
    pub fn head() -> Self {
        Self::default()
    }

    /// A live row written under the given request context.
    pub fn from_context(ctx: &VisibilityContext) -> Self {
        Self {
            change_set_id: ctx.change_set_id,
            edit_session_id: ctx.edit_session_id,
            deleted: false,
        }
    }

    pub fn tombstone(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn level(&self) -> BranchLevel {
        match (self.change_set_id, self.edit_session_id) {
            (_, Some(_)) => BranchLevel::EditSession,
            (Some(_), None) => BranchLevel::ChangeSet,
            (None, None) => BranchLevel::Head,
        }
    }

    pub fn is_head(&self) -> bool {
        self.level() == BranchLevel::Head
    }

    /// Same branch, ignoring the deleted flag.
    pub fn same_branch(&self, other: &Visibility) -> bool {
        self.change_set_id == other.change_set_id && self.edit_session_id == other.edit_session_id
    }
}

/// Precedence of a branch during resolution. Higher wins.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BranchLevel {
    Head = 1,
    ChangeSet = 2,
    EditSession = 3,
}

/// The `(change_set, edit_session)` a caller reads and writes under.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisibilityContext {
    #[serde(default)]
    pub change_set_id: Option<ChangeSetId>,

    #[serde(default)]
    pub edit_session_id: Option<EditSessionId>,
}

impl VisibilityContext {
    pub fn head() -> Self {
        Self::default()
    }

    pub fn change_set(change_set_id: ChangeSetId) -> Self {
        Self {
            change_set_id: Some(change_set_id),
            edit_session_id: None,
        }
    }

    pub fn edit_session(change_set_id: ChangeSetId, edit_session_id: EditSessionId) -> Self {
        Self {
            change_set_id: Some(change_set_id),
            edit_session_id: Some(edit_session_id),
        }
    }

    /// Rejects an edit session without its change set.
    pub fn check(&self) -> TenancyResult<()> {
        if self.edit_session_id.is_some() && self.change_set_id.is_none() {
            return Err(TenancyError::VisibilityConflict(
                "edit session requested without a change set".to_string(),
            ));
        }
        Ok(())
    }

    /// Precedence of a row's branch under this request, or `None` when the
    /// row belongs to a branch this request cannot see.
    pub fn rank(&self, visibility: &Visibility) -> Option<BranchLevel> {
        match visibility.level() {
            BranchLevel::Head => Some(BranchLevel::Head),
            BranchLevel::ChangeSet => {
                if self.change_set_id.is_some() && visibility.change_set_id == self.change_set_id {
                    Some(BranchLevel::ChangeSet)
                } else {
                    None
                }
            }
            BranchLevel::EditSession => {
                if self.edit_session_id.is_some()
                    && visibility.edit_session_id == self.edit_session_id
                    && visibility.change_set_id == self.change_set_id
                {
                    Some(BranchLevel::EditSession)
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        let cs = ChangeSetId::new();
        let es = EditSessionId::new();
        assert_eq!(Visibility::head().level(), BranchLevel::Head);
        assert_eq!(
            Visibility::from_context(&VisibilityContext::change_set(cs)).level(),
            BranchLevel::ChangeSet
        );
        assert_eq!(
            Visibility::from_context(&VisibilityContext::edit_session(cs, es)).level(),
            BranchLevel::EditSession
        );
    }

    #[test]
    fn test_precedence_order() {
        assert!(BranchLevel::EditSession > BranchLevel::ChangeSet);
        assert!(BranchLevel::ChangeSet > BranchLevel::Head);
    }

    #[test]
    fn test_rank_ignores_foreign_branches() {
        let cs = ChangeSetId::new();
        let ctx = VisibilityContext::change_set(cs);
        let foreign = Visibility::from_context(&VisibilityContext::change_set(ChangeSetId::new()));
        assert_eq!(ctx.rank(&foreign), None);

        let head_ctx = VisibilityContext::head();
        let own = Visibility::from_context(&ctx);
        assert_eq!(head_ctx.rank(&own), None);
        assert_eq!(head_ctx.rank(&Visibility::head()), Some(BranchLevel::Head));
    }

    #[test]
    fn test_edit_session_without_change_set_is_malformed() {
        let ctx = VisibilityContext {
            change_set_id: None,
            edit_session_id: Some(EditSessionId::new()),
        };
        assert!(ctx.check().is_err());
    }
}
