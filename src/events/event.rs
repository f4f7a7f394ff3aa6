//! # Event Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::EventResult;
use crate::ids::{ChangeSetId, EditSessionId, LogicalId, SystemId};
use crate::model::{Health, PropPath};
use crate::store::RequestContext;
use crate::tenancy::TenancyContext;

/// Where an event is delivered: one tenant, optionally narrowed to one
/// change set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventScope {
    pub tenancy_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_set_id: Option<ChangeSetId>,
}

impl EventScope {
    /// Tenant-wide scope.
    pub fn tenant(tenancy: &TenancyContext) -> Self {
        Self {
            tenancy_key: tenancy.owner_key(),
            change_set_id: None,
        }
    }

    pub fn change_set(tenancy: &TenancyContext, change_set_id: ChangeSetId) -> Self {
        Self {
            tenancy_key: tenancy.owner_key(),
            change_set_id: Some(change_set_id),
        }
    }

    /// The scope a request's own writes are reported on.
    pub fn for_request(ctx: &RequestContext) -> Self {
        Self {
            tenancy_key: ctx.tenancy.owner_key(),
            change_set_id: ctx.visibility.change_set_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

/// Tagged event payload, serialized as `{"kind": .., "data": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum EventPayload {
    ChangeSetCreated {
        change_set_id: ChangeSetId,
    },
    ChangeSetApplied {
        change_set_id: ChangeSetId,
        applied: Vec<LogicalId>,
    },
    ChangeSetCanceled {
        change_set_id: ChangeSetId,
    },
    ChangeSetWritten {
        change_set_id: ChangeSetId,
        edit_session_id: EditSessionId,
        written: Vec<LogicalId>,
    },
    ResourceSynced {
        component_id: LogicalId,
        health: Health,
        system_ids: Vec<SystemId>,
    },
    CheckedQualifications {
        component_id: LogicalId,
        system_id: SystemId,
        qualified: bool,
    },
    CodeGenerated {
        component_id: LogicalId,
        system_id: SystemId,
        path: PropPath,
    },
    DependentValuesUpdated {
        component_ids: Vec<LogicalId>,
    },
    SecretCreated {
        secret_id: LogicalId,
    },
    CommandOutput {
        component_id: LogicalId,
        system_id: SystemId,
        output: String,
    },
}

impl EventPayload {
    /// Stable name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::ChangeSetCreated { .. } => "CHANGE_SET_CREATED",
            EventPayload::ChangeSetApplied { .. } => "CHANGE_SET_APPLIED",
            EventPayload::ChangeSetCanceled { .. } => "CHANGE_SET_CANCELED",
            EventPayload::ChangeSetWritten { .. } => "CHANGE_SET_WRITTEN",
            EventPayload::ResourceSynced { .. } => "RESOURCE_SYNCED",
            EventPayload::CheckedQualifications { .. } => "CHECKED_QUALIFICATIONS",
            EventPayload::CodeGenerated { .. } => "CODE_GENERATED",
            EventPayload::DependentValuesUpdated { .. } => "DEPENDENT_VALUES_UPDATED",
            EventPayload::SecretCreated { .. } => "SECRET_CREATED",
            EventPayload::CommandOutput { .. } => "COMMAND_OUTPUT",
        }
    }

    pub fn level(&self) -> EventLevel {
        match self {
            EventPayload::ResourceSynced {
                health: Health::Error,
                ..
            } => EventLevel::Error,
            EventPayload::ResourceSynced {
                health: Health::Warning,
                ..
            }
            | EventPayload::CheckedQualifications {
                qualified: false, ..
            } => EventLevel::Warning,
            _ => EventLevel::Info,
        }
    }
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic across the whole emitter
    pub sequence: u64,

    pub scope: EventScope,

    pub level: EventLevel,

    pub timestamp: DateTime<Utc>,

    pub payload: EventPayload,
}

impl Event {
    pub fn new(sequence: u64, scope: EventScope, payload: EventPayload) -> Self {
        Self {
            sequence,
            scope,
            level: payload.level(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn to_json(&self) -> EventResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{OrganizationId, WorkspaceId};

    #[test]
    fn test_payload_serialization_is_tagged() {
        let payload = EventPayload::CommandOutput {
            component_id: LogicalId::new(),
            system_id: SystemId::BASELINE,
            output: "line".into(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "commandOutput");
        assert_eq!(json["data"]["output"], "line");
    }

    #[test]
    fn test_levels() {
        let synced = EventPayload::ResourceSynced {
            component_id: LogicalId::new(),
            health: Health::Error,
            system_ids: vec![],
        };
        assert_eq!(synced.level(), EventLevel::Error);
        let created = EventPayload::SecretCreated {
            secret_id: LogicalId::new(),
        };
        assert_eq!(created.level(), EventLevel::Info);
    }

    #[test]
    fn test_scope_keys_match_for_same_tenant() {
        let ws = WorkspaceId::new();
        let a = EventScope::tenant(&TenancyContext::for_workspace(ws));
        let b = EventScope::tenant(&TenancyContext::for_workspace(ws));
        assert_eq!(a, b);
        let cs = EventScope::change_set(&TenancyContext::for_workspace(ws), ChangeSetId::new());
        assert_ne!(a, cs);
    }

    #[test]
    fn test_scope_shared_by_callers_with_extra_organizations() {
        let ws = WorkspaceId::new();
        let subscriber = EventScope::tenant(&TenancyContext::for_workspace(ws));
        let publisher = EventScope::tenant(
            &TenancyContext::for_workspace(ws).with_organization(OrganizationId::new()),
        );
        assert_eq!(subscriber, publisher);
    }

    #[test]
    fn test_event_to_json() {
        let scope = EventScope::tenant(&TenancyContext::for_workspace(WorkspaceId::new()));
        let event = Event::new(
            7,
            scope,
            EventPayload::ChangeSetCreated {
                change_set_id: ChangeSetId::new(),
            },
        );
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["payload"]["kind"], "changeSetCreated");
    }
}
