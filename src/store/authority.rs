//! Version Authority - row version assignment
//!
//! - Version ids are assigned exactly once, at commit
//! - The ordering is total and strict
//! - An aborted transaction consumes nothing; its ids were never visible

use super::errors::{StoreError, StoreResult};
use crate::ids::VersionId;

/// Tracks the highest committed version id.
#[derive(Debug, Default)]
pub struct VersionAuthority {
    highest: u64,
}

impl VersionAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next committed row will carry.
    pub fn next_version_id(&self) -> VersionId {
        VersionId::new(self.highest + 1)
    }

    /// Records `version_id` as committed. Ids must arrive in order.
    pub fn mark_committed(&mut self, version_id: VersionId) -> StoreResult<()> {
        let expected = self.next_version_id();
        if version_id != expected {
            return Err(StoreError::OutOfOrder {
                attempted: version_id,
                expected,
            });
        }
        self.highest = version_id.value();
        Ok(())
    }

    /// Highest committed version, `VersionId::ZERO` for an empty store.
    pub fn watermark(&self) -> VersionId {
        VersionId::new(self.highest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_commits() {
        let mut authority = VersionAuthority::new();
        assert_eq!(authority.watermark(), VersionId::ZERO);
        let first = authority.next_version_id();
        authority.mark_committed(first).unwrap();
        let second = authority.next_version_id();
        authority.mark_committed(second).unwrap();
        assert!(second > first);
        assert_eq!(authority.watermark(), second);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut authority = VersionAuthority::new();
        let err = authority.mark_committed(VersionId::new(5)).unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrder { .. }));
        assert_eq!(authority.watermark(), VersionId::ZERO);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let authority = VersionAuthority::new();
        assert_eq!(authority.next_version_id(), authority.next_version_id());
    }
}
