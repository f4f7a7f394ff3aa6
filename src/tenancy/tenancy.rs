//! Tenancy - organization/workspace scoping of rows
//!
//! A row is in tenancy for a caller when the row is universal or when any
//! of its organization/workspace ids is one of the caller's own.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::errors::{TenancyError, TenancyResult};
use crate::ids::{OrganizationId, WorkspaceId};

/// The tenancy recorded on a stored row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tenancy {
    /// Visible to every caller
    #[serde(default)]
    pub universal: bool,

    #[serde(default)]
    pub organization_ids: BTreeSet<OrganizationId>,

    #[serde(default)]
    pub workspace_ids: BTreeSet<WorkspaceId>,
}

impl Tenancy {
    /// A row visible to all tenants (builtin schemas and funcs).
    pub fn universal() -> Self {
        Self {
            universal: true,
            ..Self::default()
        }
    }

    pub fn for_workspace(workspace_id: WorkspaceId) -> Self {
        Self {
            workspace_ids: BTreeSet::from([workspace_id]),
            ..Self::default()
        }
    }

    pub fn for_organization(organization_id: OrganizationId) -> Self {
        Self {
            organization_ids: BTreeSet::from([organization_id]),
            ..Self::default()
        }
    }

    /// Tenancy given to rows a caller creates.
    ///
    /// Workspace scoping is preferred; organization scoping is used only when
    /// the caller has no workspace.
    pub fn from_context(ctx: &TenancyContext) -> Self {
        if ctx.workspace_ids.is_empty() {
            Self {
                universal: false,
                organization_ids: ctx.organization_ids.clone(),
                workspace_ids: BTreeSet::new(),
            }
        } else {
            Self {
                universal: false,
                organization_ids: BTreeSet::new(),
                workspace_ids: ctx.workspace_ids.clone(),
            }
        }
    }

    /// Deterministic key naming the owners of this tenancy.
    pub fn scope_key(&self) -> String {
        if self.universal {
            return "universal".to_string();
        }
        format_key(&self.organization_ids, &self.workspace_ids)
    }

    /// Not universal and without any scope id.
    pub fn is_empty(&self) -> bool {
        !self.universal && self.organization_ids.is_empty() && self.workspace_ids.is_empty()
    }

    /// Rejects an empty tenancy.
    pub fn check(&self) -> TenancyResult<()> {
        if self.is_empty() {
            return Err(TenancyError::TenancyViolation(
                "row tenancy is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The caller's own organizations and workspaces.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenancyContext {
    #[serde(default)]
    pub organization_ids: BTreeSet<OrganizationId>,

    #[serde(default)]
    pub workspace_ids: BTreeSet<WorkspaceId>,
}

impl TenancyContext {
    pub fn new(
        organization_ids: impl IntoIterator<Item = OrganizationId>,
        workspace_ids: impl IntoIterator<Item = WorkspaceId>,
    ) -> Self {
        Self {
            organization_ids: organization_ids.into_iter().collect(),
            workspace_ids: workspace_ids.into_iter().collect(),
        }
    }

    pub fn for_workspace(workspace_id: WorkspaceId) -> Self {
        Self::new([], [workspace_id])
    }

    pub fn with_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_ids.insert(organization_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.organization_ids.is_empty() && self.workspace_ids.is_empty()
    }

    /// Rejects an empty caller context.
    pub fn check(&self) -> TenancyResult<()> {
        if self.is_empty() {
            return Err(TenancyError::TenancyViolation(
                "caller tenancy context is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a row with the given tenancy is in scope for this caller.
    pub fn admits(&self, tenancy: &Tenancy) -> bool {
        tenancy.universal
            || tenancy
                .organization_ids
                .iter()
                .any(|id| self.organization_ids.contains(id))
            || tenancy
                .workspace_ids
                .iter()
                .any(|id| self.workspace_ids.contains(id))
    }

    /// Deterministic key of this exact context. Partitions derived state,
    /// since two contexts that differ in any id can see different rows.
    pub fn scope_key(&self) -> String {
        format_key(&self.organization_ids, &self.workspace_ids)
    }

    /// Key of the tenancy this caller's rows are owned by. Event channels use
    /// it, so callers writing the same rows share one channel.
    pub fn owner_key(&self) -> String {
        Tenancy::from_context(self).scope_key()
    }
}

fn format_key(organization_ids: &BTreeSet<OrganizationId>, workspace_ids: &BTreeSet<WorkspaceId>) -> String {
    let orgs: Vec<String> = organization_ids.iter().map(|id| id.to_string()).collect();
    let workspaces: Vec<String> = workspace_ids.iter().map(|id| id.to_string()).collect();
    format!("o[{}]w[{}]", orgs.join(","), workspaces.join(","))
}
