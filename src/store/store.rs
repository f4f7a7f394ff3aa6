//! Store - append-only arena of versioned rows
//!
//! Rows are immutable once committed and are never removed. Each logical id
//! maps to its `VersionChain`; the current version for a request is always
//! computed through the visibility resolver.
//!
//! The single `RwLock` is the only serialization point in the system.
//! Readers take an `Arc` snapshot and release the lock immediately.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use tracing::debug;

use super::authority::VersionAuthority;
use super::branch::{BranchRegistry, ChangeSet, EditSession};
use super::chain::VersionChain;
use super::errors::{StoreError, StoreResult};
use super::row::{RequestContext, VersionedRow};
use super::txn::{WriteSet, WriteTxn};
use crate::ids::{ChangeSetId, EditSessionId, LogicalId, VersionId};
use crate::model::{EntityKind, EntityPayload};
use crate::tenancy::{InertBranches, Tenancy, VisibilityResolver};

#[derive(Debug, Default)]
pub(super) struct StoreState {
    pub(super) authority: VersionAuthority,
    /// Indexed by `version_id - 1`
    pub(super) rows: Arc<Vec<Arc<VersionedRow>>>,
    pub(super) chains: Arc<BTreeMap<LogicalId, VersionChain>>,
    pub(super) branches: BranchRegistry,
}

fn row_at(rows: &[Arc<VersionedRow>], version_id: VersionId) -> Option<&Arc<VersionedRow>> {
    let index = usize::try_from(version_id.value()).ok()?.checked_sub(1)?;
    rows.get(index)
}

impl StoreState {
    pub(super) fn chain_rows(
        &self,
        logical_id: LogicalId,
    ) -> impl Iterator<Item = &Arc<VersionedRow>> + '_ {
        self.chains
            .get(&logical_id)
            .map(|chain| chain.versions())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |version_id| row_at(&self.rows, *version_id))
    }

    fn commit(&mut self, write_set: WriteSet) -> StoreResult<usize> {
        let WriteSet { rows, branches } = write_set;

        let mut expected = self.authority.next_version_id();
        for row in &rows {
            if row.version_id != expected {
                return Err(StoreError::OutOfOrder {
                    attempted: row.version_id,
                    expected,
                });
            }
            expected = VersionId::new(expected.value() + 1);
        }

        let count = rows.len();
        let arena = Arc::make_mut(&mut self.rows);
        let chains = Arc::make_mut(&mut self.chains);
        for row in rows {
            self.authority.mark_committed(row.version_id)?;
            chains
                .entry(row.logical_id)
                .or_insert_with(|| VersionChain::new(row.logical_id))
                .push(row.version_id);
            arena.push(Arc::new(row));
        }
        self.branches = branches;
        Ok(count)
    }

    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            rows: Arc::clone(&self.rows),
            chains: Arc::clone(&self.chains),
            inert: Arc::clone(self.branches.inert()),
            watermark: self.authority.watermark(),
        }
    }
}

/// Immutable view of the store at one watermark.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    rows: Arc<Vec<Arc<VersionedRow>>>,
    chains: Arc<BTreeMap<LogicalId, VersionChain>>,
    inert: Arc<InertBranches>,
    watermark: VersionId,
}

impl StoreSnapshot {
    pub fn watermark(&self) -> VersionId {
        self.watermark
    }

    pub fn inert(&self) -> &InertBranches {
        &self.inert
    }

    pub fn row(&self, version_id: VersionId) -> Option<&Arc<VersionedRow>> {
        row_at(&self.rows, version_id)
    }

    pub fn chain(&self, logical_id: LogicalId) -> Option<&VersionChain> {
        self.chains.get(&logical_id)
    }

    /// Raw arena access in version order. No visibility filtering.
    pub fn rows(&self) -> &[Arc<VersionedRow>] {
        &self.rows
    }

    pub fn logical_ids(&self) -> impl Iterator<Item = LogicalId> + '_ {
        self.chains.keys().copied()
    }

    fn chain_rows(&self, logical_id: LogicalId) -> impl Iterator<Item = &Arc<VersionedRow>> + '_ {
        self.chains
            .get(&logical_id)
            .map(|chain| chain.versions())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |version_id| row_at(&self.rows, *version_id))
    }

    pub fn resolve(
        &self,
        ctx: &RequestContext,
        logical_id: LogicalId,
        include_deleted: bool,
    ) -> StoreResult<Option<Arc<VersionedRow>>> {
        let resolver = VisibilityResolver::new(&self.inert);
        let found = resolver.resolve(
            self.chain_rows(logical_id),
            &ctx.tenancy,
            &ctx.visibility,
            include_deleted,
        )?;
        Ok(found.cloned())
    }

    /// Current version of every logical id, ordered by logical id.
    pub fn resolve_all(
        &self,
        ctx: &RequestContext,
        include_deleted: bool,
    ) -> StoreResult<Vec<Arc<VersionedRow>>> {
        let mut resolved = Vec::new();
        for logical_id in self.chains.keys() {
            if let Some(row) = self.resolve(ctx, *logical_id, include_deleted)? {
                resolved.push(row);
            }
        }
        Ok(resolved)
    }

    /// Current rows of one kind.
    pub fn resolve_kind(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
    ) -> StoreResult<Vec<Arc<VersionedRow>>> {
        Ok(self
            .resolve_all(ctx, false)?
            .into_iter()
            .filter(|row| row.kind() == kind)
            .collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub include_deleted: bool,

    pub kind: Option<EntityKind>,
}

impl ListOptions {
    pub fn of_kind(kind: EntityKind) -> Self {
        Self {
            include_deleted: false,
            kind: Some(kind),
        }
    }
}

type RowPredicate = Arc<dyn Fn(&VersionedRow) -> bool + Send + Sync>;

/// Lazy listing over one snapshot. Each call to [`RowListing::iter`]
/// starts over and yields the same rows.
#[derive(Clone)]
pub struct RowListing {
    snapshot: StoreSnapshot,
    ctx: RequestContext,
    options: ListOptions,
    predicate: RowPredicate,
}

impl std::fmt::Debug for RowListing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowListing")
            .field("watermark", &self.snapshot.watermark)
            .field("ctx", &self.ctx)
            .field("options", &self.options)
            .finish()
    }
}

impl RowListing {
    pub fn iter(&self) -> impl Iterator<Item = Arc<VersionedRow>> + '_ {
        self.snapshot.logical_ids().filter_map(move |logical_id| {
            // The context was checked when the listing was built.
            let row = self
                .snapshot
                .resolve(&self.ctx, logical_id, self.options.include_deleted)
                .ok()
                .flatten()?;
            let kind_matches = self.options.kind.map_or(true, |kind| row.kind() == kind);
            (kind_matches && (self.predicate)(row.as_ref())).then_some(row)
        })
    }

    pub fn to_vec(&self) -> Vec<Arc<VersionedRow>> {
        self.iter().collect()
    }

    pub fn watermark(&self) -> VersionId {
        self.snapshot.watermark
    }
}

/// The versioned record store.
#[derive(Debug, Default)]
pub struct Store {
    state: RwLock<StoreState>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| StoreError::Internal("Lock poisoned".into()))
    }

    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        Ok(self.read()?.snapshot())
    }

    pub fn watermark(&self) -> StoreResult<VersionId> {
        Ok(self.read()?.authority.watermark())
    }

    pub fn change_set(&self, id: ChangeSetId) -> StoreResult<Option<ChangeSet>> {
        Ok(self.read()?.branches.change_set(id).cloned())
    }

    pub fn edit_session(&self, id: EditSessionId) -> StoreResult<Option<EditSession>> {
        Ok(self.read()?.branches.edit_session(id).cloned())
    }

    pub fn edit_sessions_of(&self, change_set_id: ChangeSetId) -> StoreResult<Vec<EditSession>> {
        Ok(self
            .read()?
            .branches
            .edit_sessions_of(change_set_id)
            .cloned()
            .collect())
    }

    /// Runs `f` under the write lock. Everything it staged commits together
    /// when it returns `Ok`; an `Err` discards all of it.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteTxn<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Internal("Lock poisoned".into()))?;

        let mut txn = WriteTxn::begin(&state);
        let value = f(&mut txn)?;
        let write_set = txn.finish();

        let count = state.commit(write_set)?;
        if count > 0 {
            debug!(
                event = "STORE_COMMIT",
                rows = count,
                watermark = state.authority.watermark().value(),
            );
        }
        Ok(value)
    }

    pub fn create(&self, ctx: &RequestContext, payload: EntityPayload) -> StoreResult<VersionedRow> {
        self.transaction(|tx| tx.create(ctx, payload))
    }

    pub fn create_with_tenancy(
        &self,
        ctx: &RequestContext,
        tenancy: Tenancy,
        payload: EntityPayload,
    ) -> StoreResult<VersionedRow> {
        self.transaction(|tx| tx.create_with_tenancy(ctx, tenancy, payload))
    }

    pub fn update(
        &self,
        ctx: &RequestContext,
        logical_id: LogicalId,
        payload: EntityPayload,
    ) -> StoreResult<VersionedRow> {
        self.transaction(|tx| tx.update(ctx, logical_id, payload))
    }

    pub fn update_if_current(
        &self,
        ctx: &RequestContext,
        logical_id: LogicalId,
        expected: VersionId,
        payload: EntityPayload,
    ) -> StoreResult<VersionedRow> {
        self.transaction(|tx| tx.update_if_current(ctx, logical_id, expected, payload))
    }

    pub fn mark_deleted(&self, ctx: &RequestContext, logical_id: LogicalId) -> StoreResult<VersionedRow> {
        self.transaction(|tx| tx.mark_deleted(ctx, logical_id))
    }

    pub fn get(
        &self,
        ctx: &RequestContext,
        logical_id: LogicalId,
        include_deleted: bool,
    ) -> StoreResult<Option<Arc<VersionedRow>>> {
        self.snapshot()?.resolve(ctx, logical_id, include_deleted)
    }

    /// Lists the current rows matching `predicate`.
    pub fn list<P>(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
        predicate: P,
    ) -> StoreResult<RowListing>
    where
        P: Fn(&VersionedRow) -> bool + Send + Sync + 'static,
    {
        ctx.tenancy.check()?;
        ctx.visibility.check()?;
        Ok(RowListing {
            snapshot: self.snapshot()?,
            ctx: ctx.clone(),
            options,
            predicate: Arc::new(predicate),
        })
    }
}
