//! Visibility Resolver - deterministic current-version selection
//!
//! Given all versions of one logical entity, a caller tenancy context and a
//! visibility context, the current version is:
//!
//! 1. Drop versions outside the caller's tenancy
//! 2. Drop versions whose branch is inert (canceled, applied, saved)
//! 3. Rank the rest: edit session > change set > head; versions of any other
//!    branch are ignored
//! 4. Take the highest rank; ties go to the highest `version_id`
//! 5. If that version is a tombstone and tombstones were not requested, the
//!    entity is invisible
//!
//! The deleted filter is applied last: a tombstone in a change set hides the
//! head version beneath it.
//!
//! This is a pure module with no state and no side effects.

use std::collections::{BTreeMap, HashSet};

use super::errors::TenancyResult;
use super::tenancy::{Tenancy, TenancyContext};
use super::visibility::{BranchLevel, Visibility, VisibilityContext};
use crate::ids::{ChangeSetId, EditSessionId, LogicalId, VersionId};

/// Anything stored as a versioned row.
pub trait Versioned {
    fn version_id(&self) -> VersionId;
    fn logical_id(&self) -> LogicalId;
    fn tenancy(&self) -> &Tenancy;
    fn visibility(&self) -> &Visibility;
}

impl<T: Versioned + ?Sized> Versioned for std::sync::Arc<T> {
    fn version_id(&self) -> VersionId {
        (**self).version_id()
    }

    fn logical_id(&self) -> LogicalId {
        (**self).logical_id()
    }

    fn tenancy(&self) -> &Tenancy {
        (**self).tenancy()
    }

    fn visibility(&self) -> &Visibility {
        (**self).visibility()
    }
}

/// Branches whose rows are permanently excluded from resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InertBranches {
    pub change_sets: HashSet<ChangeSetId>,
    pub edit_sessions: HashSet<EditSessionId>,
}

impl InertBranches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_inert(&self, visibility: &Visibility) -> bool {
        visibility
            .change_set_id
            .is_some_and(|id| self.change_sets.contains(&id))
            || visibility
                .edit_session_id
                .is_some_and(|id| self.edit_sessions.contains(&id))
    }
}

/// `in_tenancy(tenancy_ctx, row)`
pub fn in_tenancy<R: Versioned + ?Sized>(ctx: &TenancyContext, row: &R) -> bool {
    ctx.admits(row.tenancy())
}

/// `in_tenancy_and_visible(tenancy_ctx, visibility_ctx, row)`
///
/// Per-row candidate filter: in tenancy, on a branch the request can see,
/// not on an inert branch, not a tombstone. Precedence among candidates is
/// decided by [`VisibilityResolver::resolve`].
pub fn in_tenancy_and_visible<R: Versioned + ?Sized>(
    ctx: &TenancyContext,
    visibility: &VisibilityContext,
    inert: &InertBranches,
    row: &R,
) -> bool {
    in_tenancy(ctx, row)
        && !inert.is_inert(row.visibility())
        && visibility.rank(row.visibility()).is_some()
        && !row.visibility().deleted
}

/// Stateless resolver bound to the set of inert branches.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityResolver<'a> {
    inert: &'a InertBranches,
}

impl<'a> VisibilityResolver<'a> {
    pub fn new(inert: &'a InertBranches) -> Self {
        Self { inert }
    }

    /// Selects the current version among `rows`, which must all share one
    /// logical id.
    ///
    /// Fails only with `TenancyViolation` for an empty tenancy context, or
    /// `VisibilityConflict` for a malformed visibility context.
    pub fn resolve<'r, R: Versioned + 'r>(
        &self,
        rows: impl IntoIterator<Item = &'r R>,
        tenancy: &TenancyContext,
        visibility: &VisibilityContext,
        include_deleted: bool,
    ) -> TenancyResult<Option<&'r R>> {
        tenancy.check()?;
        visibility.check()?;

        let best = rows
            .into_iter()
            .filter(|row| tenancy.admits(row.tenancy()))
            .filter(|row| !self.inert.is_inert(row.visibility()))
            .filter_map(|row| {
                visibility
                    .rank(row.visibility())
                    .map(|rank| (rank, row.version_id(), row))
            })
            .max_by_key(|(rank, version_id, _)| (*rank, *version_id))
            .map(|(_, _, row)| row);

        Ok(match best {
            Some(row) if row.visibility().deleted && !include_deleted => None,
            other => other,
        })
    }

    /// Resolves every logical id present in `rows`.
    pub fn resolve_all<'r, R: Versioned + 'r>(
        &self,
        rows: impl IntoIterator<Item = &'r R>,
        tenancy: &TenancyContext,
        visibility: &VisibilityContext,
        include_deleted: bool,
    ) -> TenancyResult<BTreeMap<LogicalId, &'r R>> {
        let mut grouped: BTreeMap<LogicalId, Vec<&'r R>> = BTreeMap::new();
        for row in rows {
            grouped.entry(row.logical_id()).or_default().push(row);
        }

        let mut resolved = BTreeMap::new();
        for (logical_id, chain) in grouped {
            if let Some(row) =
                self.resolve(chain.into_iter(), tenancy, visibility, include_deleted)?
            {
                resolved.insert(logical_id, row);
            }
        }
        Ok(resolved)
    }

    /// Precedence of a single row under a request (`None` = not a candidate).
    pub fn rank_of<R: Versioned>(
        &self,
        row: &R,
        tenancy: &TenancyContext,
        visibility: &VisibilityContext,
    ) -> Option<BranchLevel> {
        if !tenancy.admits(row.tenancy()) || self.inert.is_inert(row.visibility()) {
            return None;
        }
        visibility.rank(row.visibility())
    }
}
