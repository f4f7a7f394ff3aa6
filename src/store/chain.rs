//! VersionChain - every version id of one logical entity
//!
//! A plain container in commit order. Which version is current depends on
//! the request and is decided by the visibility resolver, never cached here.

use crate::ids::{LogicalId, VersionId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionChain {
    logical_id: LogicalId,
    versions: Vec<VersionId>,
}

impl VersionChain {
    pub fn new(logical_id: LogicalId) -> Self {
        Self {
            logical_id,
            versions: Vec::new(),
        }
    }

    #[inline]
    pub fn logical_id(&self) -> LogicalId {
        self.logical_id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    #[inline]
    pub fn versions(&self) -> &[VersionId] {
        &self.versions
    }

    pub fn first(&self) -> Option<VersionId> {
        self.versions.first().copied()
    }

    pub fn push(&mut self, version_id: VersionId) {
        self.versions.push(version_id);
    }
}
