//! Resolver cache
//!
//! Execution results keyed by `(func, func definition, binding hash,
//! context)`. A hit means the function is not invoked again. Editing a func
//! changes its definition hash, so earlier results stop matching.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use serde_json::Value;

use crate::ids::LogicalId;
use crate::model::{Resolver, ResolverContext};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    pub func_id: LogicalId,
    pub func_hash: String,
    pub binding_hash: String,
    pub context: ResolverContext,
}

impl CacheKey {
    pub fn of(resolver: &Resolver) -> Self {
        Self {
            func_id: resolver.func_id,
            func_hash: resolver.func_hash.clone(),
            binding_hash: resolver.binding_hash.clone(),
            context: resolver.context,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
pub struct ResolverCache {
    entries: RwLock<HashMap<CacheKey, Value>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let found = entries.get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, key: CacheKey, result: Value) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, result);
    }

    /// Loads persisted resolver rows. Returns how many were new.
    pub fn warm<'a>(&self, resolvers: impl IntoIterator<Item = &'a Resolver>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for resolver in resolvers {
            let key = CacheKey::of(resolver);
            if !entries.contains_key(&key) {
                entries.insert(key, resolver.result.clone());
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
