//! Identity types
//!
//! Every identifier is a distinct newtype so an organization id can never be
//! passed where a change set id is expected.
//!
//! - `VersionId` - physically unique, monotonic row version
//! - `LogicalId` - stable identity shared by all versions of one entity
//! - `SystemId` - environment selector, with a reserved baseline

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[inline]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[inline]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Organization a row or caller belongs to.
    OrganizationId
);
uuid_id!(
    /// Workspace a row or caller belongs to.
    WorkspaceId
);
uuid_id!(
    /// A branch of speculative edits.
    ChangeSetId
);
uuid_id!(
    /// A nested branch inside a change set.
    EditSessionId
);
uuid_id!(
    /// Stable identity of an entity across all of its versions.
    LogicalId
);

/// Environment selector (target cluster, account, region).
///
/// The nil UUID is reserved for the baseline system, which supplies the
/// default value whenever no per-system override exists.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemId(Uuid);

impl SystemId {
    /// The reserved baseline system.
    pub const BASELINE: SystemId = SystemId(Uuid::nil());

    /// Wraps an existing UUID.
    #[inline]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The system id of a `System` entity.
    #[inline]
    pub fn from_logical(id: LogicalId) -> Self {
        Self(id.as_uuid())
    }

    #[inline]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    #[inline]
    pub fn is_baseline(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_baseline() {
            write!(f, "baseline")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Physically unique row version.
///
/// Assigned once at commit time by the store's `VersionAuthority`, strictly
/// increasing, never reused. Higher means written later.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(u64);

impl VersionId {
    /// The watermark of an empty store. No row ever carries it.
    pub const ZERO: VersionId = VersionId(0);

    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
