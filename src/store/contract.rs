//! Row creation contract
//!
//! JSON in, JSON out: the entry point for collaborators that do not link
//! against the typed API.

use super::errors::{StoreError, StoreResult};
use super::row::{RequestContext, VersionedRow};
use super::store::Store;
use crate::ids::LogicalId;
use crate::model::EntityPayload;
use crate::tenancy::{Tenancy, TenancyContext, Visibility, VisibilityContext};

/// `create_row(tenancy_json, visibility_json, payload_json) -> row_json`
///
/// Writes a new entity and returns the full row, including the assigned
/// logical id, version id and timestamps. The row is created on the branch
/// named by the visibility; `deleted` must be false.
pub fn create_row(
    store: &Store,
    tenancy_json: &str,
    visibility_json: &str,
    payload_json: &str,
) -> StoreResult<String> {
    let tenancy: Tenancy = serde_json::from_str(tenancy_json)?;
    let visibility: Visibility = serde_json::from_str(visibility_json)?;
    let payload: EntityPayload = serde_json::from_str(payload_json)?;

    if visibility.deleted {
        return Err(StoreError::ConstraintError(
            "cannot create a row as a tombstone".to_string(),
        ));
    }

    let ctx = RequestContext::new(
        TenancyContext::new(
            tenancy.organization_ids.iter().copied(),
            tenancy.workspace_ids.iter().copied(),
        ),
        VisibilityContext {
            change_set_id: visibility.change_set_id,
            edit_session_id: visibility.edit_session_id,
        },
    );
    let row = store.create_with_tenancy(&ctx, tenancy, payload)?;
    Ok(serde_json::to_string(&row)?)
}

/// Appends one version of a known logical id, as exported by a previous
/// [`create_row`] or a fixture file. Branches must already be registered.
pub fn import_row(store: &Store, row_json: &str) -> StoreResult<VersionedRow> {
    #[derive(serde::Deserialize)]
    struct ImportedRow {
        logical_id: LogicalId,
        tenancy: Tenancy,
        #[serde(default)]
        visibility: Visibility,
        payload: EntityPayload,
    }

    let imported: ImportedRow = serde_json::from_str(row_json)?;
    store.transaction(|tx| {
        let branch = VisibilityContext {
            change_set_id: imported.visibility.change_set_id,
            edit_session_id: imported.visibility.edit_session_id,
        };
        if branch.change_set_id.is_some() {
            let owner = TenancyContext::new(
                imported.tenancy.organization_ids.iter().copied(),
                imported.tenancy.workspace_ids.iter().copied(),
            );
            tx.branches().check_writable(&owner, &branch)?;
        }
        tx.write_version(
            imported.logical_id,
            imported.tenancy,
            imported.visibility,
            imported.payload,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorkspaceId;
    use serde_json::{json, Value};

    #[test]
    fn test_create_row_returns_full_row() {
        let store = Store::new();
        let ws = WorkspaceId::new();
        let tenancy = json!({"workspace_ids": [ws]}).to_string();
        let visibility = json!({}).to_string();
        let payload = json!({"kind": "system", "data": {"name": "prod"}}).to_string();

        let row_json = create_row(&store, &tenancy, &visibility, &payload).unwrap();
        let row: Value = serde_json::from_str(&row_json).unwrap();
        assert_eq!(row["version_id"], 1);
        assert!(row["logical_id"].is_string());
        assert!(row["created_at"].is_string());
        assert_eq!(row["payload"]["data"]["name"], "prod");
        assert_eq!(row["visibility"]["deleted"], false);
    }

    #[test]
    fn test_create_row_rejects_empty_tenancy() {
        let store = Store::new();
        let payload = json!({"kind": "system", "data": {"name": "prod"}}).to_string();
        let err = create_row(&store, "{}", "{}", &payload).unwrap_err();
        assert_eq!(err.code(), "HALYARD_TENANCY_VIOLATION");
    }

    #[test]
    fn test_create_row_rejects_tombstone() {
        let store = Store::new();
        let tenancy = json!({"universal": true}).to_string();
        let payload = json!({"kind": "system", "data": {"name": "prod"}}).to_string();
        let err = create_row(&store, &tenancy, r#"{"deleted":true}"#, &payload).unwrap_err();
        assert_eq!(err.code(), "HALYARD_CONSTRAINT_ERROR");
    }

    #[test]
    fn test_create_row_rejects_malformed_json() {
        let store = Store::new();
        let err = create_row(&store, "not json", "{}", "{}").unwrap_err();
        assert_eq!(err.code(), "HALYARD_SERIALIZATION");
    }

    #[test]
    fn test_import_keeps_logical_id() {
        let store = Store::new();
        let ws = WorkspaceId::new();
        let id = LogicalId::new();
        let row = json!({
            "logical_id": id,
            "tenancy": {"workspace_ids": [ws]},
            "payload": {"kind": "system", "data": {"name": "prod"}}
        });
        let first = import_row(&store, &row.to_string()).unwrap();
        let second = import_row(&store, &row.to_string()).unwrap();
        assert_eq!(first.logical_id, id);
        assert_eq!(second.logical_id, id);
        assert!(second.version_id > first.version_id);
    }
}
