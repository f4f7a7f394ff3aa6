//! # Versioned Rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{LogicalId, VersionId};
use crate::model::{EntityKind, EntityPayload};
use crate::tenancy::{Tenancy, TenancyContext, Versioned, Visibility, VisibilityContext};

/// One immutable version of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRow {
    pub version_id: VersionId,

    pub logical_id: LogicalId,

    pub tenancy: Tenancy,

    pub visibility: Visibility,

    /// Write time of the first version of this logical entity
    pub created_at: DateTime<Utc>,

    /// Write time of this version
    pub updated_at: DateTime<Utc>,

    pub payload: EntityPayload,
}

impl VersionedRow {
    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    pub fn is_deleted(&self) -> bool {
        self.visibility.deleted
    }
}

impl Versioned for VersionedRow {
    fn version_id(&self) -> VersionId {
        self.version_id
    }

    fn logical_id(&self) -> LogicalId {
        self.logical_id
    }

    fn tenancy(&self) -> &Tenancy {
        &self.tenancy
    }

    fn visibility(&self) -> &Visibility {
        &self.visibility
    }
}

/// Who is asking, and on which branch.
///
/// Passed explicitly into every store, graph and reconcile operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenancy: TenancyContext,

    #[serde(default)]
    pub visibility: VisibilityContext,
}

impl RequestContext {
    pub fn new(tenancy: TenancyContext, visibility: VisibilityContext) -> Self {
        Self {
            tenancy,
            visibility,
        }
    }

    pub fn head(tenancy: TenancyContext) -> Self {
        Self::new(tenancy, VisibilityContext::head())
    }

    /// The same caller on another branch.
    pub fn with_visibility(&self, visibility: VisibilityContext) -> Self {
        Self::new(self.tenancy.clone(), visibility)
    }

    /// The same caller on head.
    pub fn at_head(&self) -> Self {
        self.with_visibility(VisibilityContext::head())
    }
}
