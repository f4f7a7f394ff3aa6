//! Per-scope attribute snapshots.
//!
//! Every `(tenant, change set, edit session)` scope owns one
//! `Arc<AttributeSet>`. Readers clone the `Arc`; a recompute pass builds a
//! new set and swaps it in only when the pass succeeds. Passes on the same
//! scope are serialized by a per-scope async lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::ids::{ChangeSetId, EditSessionId};
use crate::store::RequestContext;

use super::attribute::AttributeSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    pub tenancy_key: String,
    pub change_set_id: Option<ChangeSetId>,
    pub edit_session_id: Option<EditSessionId>,
}

impl ScopeKey {
    pub fn for_request(ctx: &RequestContext) -> Self {
        Self {
            tenancy_key: ctx.tenancy.scope_key(),
            change_set_id: ctx.visibility.change_set_id,
            edit_session_id: ctx.visibility.edit_session_id,
        }
    }
}

#[derive(Debug, Default)]
pub struct AttributeStore {
    sets: RwLock<HashMap<ScopeKey, Arc<AttributeSet>>>,
    locks: Mutex<HashMap<ScopeKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current set of a scope, if it was ever computed.
    pub fn get(&self, scope: &ScopeKey) -> Option<Arc<AttributeSet>> {
        self.sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scope)
            .cloned()
    }

    pub fn swap(&self, scope: ScopeKey, set: Arc<AttributeSet>) -> Option<Arc<AttributeSet>> {
        self.sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scope, set)
    }

    pub fn lock(&self, scope: &ScopeKey) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(scope.clone())
            .or_default()
            .clone()
    }

    pub fn scope_count(&self) -> usize {
        self.sets.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorkspaceId;
    use crate::tenancy::{TenancyContext, VisibilityContext};

    #[test]
    fn test_scopes_are_independent() {
        let store = AttributeStore::new();
        let head = RequestContext::head(TenancyContext::for_workspace(WorkspaceId::new()));
        let branch = head.with_visibility(VisibilityContext::change_set(ChangeSetId::new()));

        assert!(store.get(&ScopeKey::for_request(&head)).is_none());
        store.swap(ScopeKey::for_request(&head), Arc::new(AttributeSet::new()));
        assert!(store.get(&ScopeKey::for_request(&head)).is_some());
        assert!(store.get(&ScopeKey::for_request(&branch)).is_none());
        assert_eq!(store.scope_count(), 1);
    }

    #[test]
    fn test_lock_is_shared_per_scope() {
        let store = AttributeStore::new();
        let ctx = RequestContext::head(TenancyContext::for_workspace(WorkspaceId::new()));
        let scope = ScopeKey::for_request(&ctx);
        assert!(Arc::ptr_eq(&store.lock(&scope), &store.lock(&scope)));
    }
}
