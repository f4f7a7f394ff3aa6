//! Write transactions
//!
//! A `WriteTxn` is only ever created under the store's write lock. Rows and
//! branch changes are staged in the transaction and become visible together
//! when the closure returns `Ok`. Reads inside the transaction see committed
//! rows plus everything staged so far.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::branch::BranchRegistry;
use super::errors::{StoreError, StoreResult};
use super::row::{RequestContext, VersionedRow};
use super::store::StoreState;
use crate::ids::{ChangeSetId, EditSessionId, LogicalId, VersionId};
use crate::model::EntityPayload;
use crate::tenancy::{Tenancy, TenancyError, Visibility, VisibilityResolver};

/// Everything a transaction staged, in version order.
pub(super) struct WriteSet {
    pub(super) rows: Vec<VersionedRow>,
    pub(super) branches: BranchRegistry,
}

pub struct WriteTxn<'a> {
    committed: &'a StoreState,
    staged: Vec<VersionedRow>,
    branches: BranchRegistry,
}

impl<'a> WriteTxn<'a> {
    pub(super) fn begin(committed: &'a StoreState) -> Self {
        Self {
            committed,
            staged: Vec::new(),
            branches: committed.branches.clone(),
        }
    }

    pub(super) fn finish(self) -> WriteSet {
        WriteSet {
            rows: self.staged,
            branches: self.branches,
        }
    }

    /// Highest version id committed or staged so far.
    pub fn watermark(&self) -> VersionId {
        VersionId::new(self.committed.authority.watermark().value() + self.staged.len() as u64)
    }

    fn next_version_id(&self) -> VersionId {
        VersionId::new(self.watermark().value() + 1)
    }

    pub fn branches(&self) -> &BranchRegistry {
        &self.branches
    }

    pub fn branches_mut(&mut self) -> &mut BranchRegistry {
        &mut self.branches
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Every version of `logical_id`, committed first, then staged.
    fn versions_of(&self, logical_id: LogicalId) -> Vec<&VersionedRow> {
        let mut versions: Vec<&VersionedRow> = self
            .committed
            .chain_rows(logical_id)
            .map(|row| row.as_ref())
            .collect();
        versions.extend(self.staged.iter().filter(|row| row.logical_id == logical_id));
        versions
    }

    fn all_rows(&self) -> impl Iterator<Item = &VersionedRow> {
        self.committed
            .rows
            .iter()
            .map(|row| row.as_ref())
            .chain(self.staged.iter())
    }

    pub fn exists(&self, logical_id: LogicalId) -> bool {
        !self.versions_of(logical_id).is_empty()
    }

    /// Current version of `logical_id` for `ctx`, including staged rows.
    pub fn resolve(
        &self,
        ctx: &RequestContext,
        logical_id: LogicalId,
        include_deleted: bool,
    ) -> StoreResult<Option<VersionedRow>> {
        let versions = self.versions_of(logical_id);
        let resolver = VisibilityResolver::new(self.branches.inert());
        let found = resolver.resolve(
            versions.into_iter(),
            &ctx.tenancy,
            &ctx.visibility,
            include_deleted,
        )?;
        Ok(found.cloned())
    }

    /// Creates a new entity owned by the caller's tenancy.
    pub fn create(
        &mut self,
        ctx: &RequestContext,
        payload: EntityPayload,
    ) -> StoreResult<VersionedRow> {
        ctx.tenancy.check()?;
        let tenancy = Tenancy::from_context(&ctx.tenancy);
        self.create_with_tenancy(ctx, tenancy, payload)
    }

    /// Creates a new entity with an explicit tenancy the caller can see.
    pub fn create_with_tenancy(
        &mut self,
        ctx: &RequestContext,
        tenancy: Tenancy,
        payload: EntityPayload,
    ) -> StoreResult<VersionedRow> {
        tenancy.check()?;
        if !ctx.tenancy.admits(&tenancy) {
            return Err(TenancyError::TenancyViolation(
                "row tenancy is outside the caller's tenancy".to_string(),
            )
            .into());
        }
        self.branches.check_writable(&ctx.tenancy, &ctx.visibility)?;
        self.append(
            LogicalId::new(),
            tenancy,
            Visibility::from_context(&ctx.visibility),
            payload,
        )
    }

    /// Writes a new version on the caller's branch. Last write wins.
    pub fn update(
        &mut self,
        ctx: &RequestContext,
        logical_id: LogicalId,
        payload: EntityPayload,
    ) -> StoreResult<VersionedRow> {
        let current = self.current_for_write(ctx, logical_id)?;
        self.append(
            logical_id,
            current.tenancy,
            Visibility::from_context(&ctx.visibility),
            payload,
        )
    }

    /// Writes a new version only if `expected` is still the current one.
    pub fn update_if_current(
        &mut self,
        ctx: &RequestContext,
        logical_id: LogicalId,
        expected: VersionId,
        payload: EntityPayload,
    ) -> StoreResult<VersionedRow> {
        let current = self.current_for_write(ctx, logical_id)?;
        if current.version_id != expected {
            return Err(StoreError::ApplyConflict {
                logical_id,
                change_set_id: ctx.visibility.change_set_id,
                reason: format!(
                    "expected version {}, current version is {}",
                    expected, current.version_id
                ),
            });
        }
        self.append(
            logical_id,
            current.tenancy,
            Visibility::from_context(&ctx.visibility),
            payload,
        )
    }

    /// Writes a tombstone carrying the current payload.
    pub fn mark_deleted(
        &mut self,
        ctx: &RequestContext,
        logical_id: LogicalId,
    ) -> StoreResult<VersionedRow> {
        let current = self.current_for_write(ctx, logical_id)?;
        self.append(
            logical_id,
            current.tenancy,
            Visibility::from_context(&ctx.visibility).tombstone(),
            current.payload,
        )
    }

    fn current_for_write(
        &self,
        ctx: &RequestContext,
        logical_id: LogicalId,
    ) -> StoreResult<VersionedRow> {
        ctx.tenancy.check()?;
        self.branches.check_writable(&ctx.tenancy, &ctx.visibility)?;

        match self.resolve(ctx, logical_id, true)? {
            Some(row) if row.is_deleted() => Err(StoreError::VisibilityConflict {
                logical_id: Some(logical_id),
                change_set_id: ctx.visibility.change_set_id,
                reason: format!("{} is deleted", logical_id),
            }),
            Some(row) => Ok(row),
            None => {
                let versions = self.versions_of(logical_id);
                if versions.is_empty() {
                    Err(StoreError::NotFound(logical_id))
                } else if !versions.iter().any(|row| ctx.tenancy.admits(&row.tenancy)) {
                    Err(TenancyError::TenancyViolation(format!(
                        "{} is outside the caller's tenancy",
                        logical_id
                    ))
                    .into())
                } else {
                    Err(StoreError::VisibilityConflict {
                        logical_id: Some(logical_id),
                        change_set_id: ctx.visibility.change_set_id,
                        reason: format!("{} is not visible on this branch", logical_id),
                    })
                }
            }
        }
    }

    /// Latest row of every logical id written exactly on the given branch,
    /// tombstones included.
    pub fn branch_rows(
        &self,
        change_set_id: Option<ChangeSetId>,
        edit_session_id: Option<EditSessionId>,
    ) -> BTreeMap<LogicalId, VersionedRow> {
        let mut latest: BTreeMap<LogicalId, &VersionedRow> = BTreeMap::new();
        for row in self.all_rows().filter(|row| {
            row.visibility.change_set_id == change_set_id
                && row.visibility.edit_session_id == edit_session_id
        }) {
            let slot = latest.entry(row.logical_id).or_insert(row);
            if row.version_id > slot.version_id {
                *slot = row;
            }
        }
        latest
            .into_iter()
            .map(|(id, row)| (id, row.clone()))
            .collect()
    }

    /// Highest version of `logical_id` written exactly on the given branch.
    pub fn latest_on_branch(
        &self,
        logical_id: LogicalId,
        change_set_id: Option<ChangeSetId>,
        edit_session_id: Option<EditSessionId>,
    ) -> Option<VersionId> {
        self.versions_of(logical_id)
            .into_iter()
            .filter(|row| {
                row.visibility.change_set_id == change_set_id
                    && row.visibility.edit_session_id == edit_session_id
            })
            .map(|row| row.version_id)
            .max()
    }

    /// Copies `source` onto another branch as a new version.
    pub fn rewrite(
        &mut self,
        source: &VersionedRow,
        visibility: Visibility,
    ) -> StoreResult<VersionedRow> {
        self.append(
            source.logical_id,
            source.tenancy.clone(),
            visibility,
            source.payload.clone(),
        )
    }

    /// Appends a version of an explicit logical id without branch checks.
    ///
    /// Used by bulk loaders that replay rows with known identities.
    pub fn write_version(
        &mut self,
        logical_id: LogicalId,
        tenancy: Tenancy,
        visibility: Visibility,
        payload: EntityPayload,
    ) -> StoreResult<VersionedRow> {
        tenancy.check()?;
        self.append(logical_id, tenancy, visibility, payload)
    }

    fn append(
        &mut self,
        logical_id: LogicalId,
        tenancy: Tenancy,
        visibility: Visibility,
        payload: EntityPayload,
    ) -> StoreResult<VersionedRow> {
        payload.validate().map_err(StoreError::ConstraintError)?;

        let mut created_at: Option<DateTime<Utc>> = None;
        if let Some(first) = self.versions_of(logical_id).first() {
            if first.kind() != payload.kind() {
                return Err(StoreError::ConstraintError(format!(
                    "{} is a {}, cannot write a {}",
                    logical_id,
                    first.kind(),
                    payload.kind()
                )));
            }
            created_at = Some(first.created_at);
        }

        let now = Utc::now();
        let row = VersionedRow {
            version_id: self.next_version_id(),
            logical_id,
            tenancy,
            visibility,
            created_at: created_at.unwrap_or(now),
            updated_at: now,
            payload,
        };
        self.staged.push(row.clone());
        Ok(row)
    }
}
