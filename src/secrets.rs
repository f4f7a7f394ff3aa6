//! # Secrets
//!
//! Secrets are sealed by the client against a workspace public key; the core
//! only stores the ciphertext and never returns it from `list`.

use std::sync::Arc;

use tracing::info;

use crate::events::{EventEmitter, EventPayload, EventScope};
use crate::model::{EntityKind, EntityPayload, RedactedSecret, Secret};
use crate::store::{RequestContext, Store, StoreResult};
use crate::tenancy::{Tenancy, TenancyError};

#[derive(Debug, Clone)]
pub struct SecretService {
    store: Arc<Store>,
    events: Arc<EventEmitter>,
}

impl SecretService {
    pub fn new(store: Arc<Store>, events: Arc<EventEmitter>) -> Self {
        Self { store, events }
    }

    /// Stores a secret owned by the caller's workspaces.
    pub fn create(&self, ctx: &RequestContext, secret: Secret) -> StoreResult<RedactedSecret> {
        if ctx.tenancy.workspace_ids.is_empty() {
            return Err(TenancyError::TenancyViolation(
                "secrets require a workspace tenancy".to_string(),
            )
            .into());
        }
        let tenancy = Tenancy {
            universal: false,
            organization_ids: Default::default(),
            workspace_ids: ctx.tenancy.workspace_ids.clone(),
        };
        let row = self
            .store
            .create_with_tenancy(ctx, tenancy, EntityPayload::Secret(secret.clone()))?;
        let redacted = secret.redacted(row.logical_id);

        info!(
            event = "SECRET_CREATED",
            secret_id = %row.logical_id,
            kind = ?redacted.kind,
        );
        self.events.publish(
            EventScope::for_request(ctx),
            EventPayload::SecretCreated {
                secret_id: row.logical_id,
            },
        );
        Ok(redacted)
    }

    /// Every visible secret, without ciphertext, ordered by id.
    pub fn list(&self, ctx: &RequestContext) -> StoreResult<Vec<RedactedSecret>> {
        let rows = self.store.snapshot()?.resolve_kind(ctx, EntityKind::Secret)?;
        Ok(rows
            .iter()
            .filter_map(|row| row.payload.as_secret().map(|s| s.redacted(row.logical_id)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventsConfig;
    use crate::ids::{LogicalId, OrganizationId, WorkspaceId};
    use crate::model::{SecretAlgorithm, SecretKind, SecretObjectType, SecretVersion};
    use crate::tenancy::TenancyContext;

    fn secret(crypted: &str) -> Secret {
        Secret {
            name: "docker".into(),
            object_type: SecretObjectType::Credential,
            kind: SecretKind::DockerHub,
            key_pair_id: LogicalId::new(),
            crypted: crypted.into(),
            version: SecretVersion::V1,
            algorithm: SecretAlgorithm::Sealedbox,
        }
    }

    fn service() -> (SecretService, Arc<EventEmitter>) {
        let events = Arc::new(EventEmitter::new(&EventsConfig::default()));
        (SecretService::new(Arc::new(Store::new()), events.clone()), events)
    }

    #[test]
    fn test_create_and_list_redacted() {
        let (service, events) = service();
        let ctx = RequestContext::head(TenancyContext::for_workspace(WorkspaceId::new()));
        let created = service.create(&ctx, secret("c2VhbGVk")).unwrap();

        let listed = service.list(&ctx).unwrap();
        assert_eq!(listed, vec![created.clone()]);
        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains("c2VhbGVk"));
        assert_eq!(events.recent(1)[0].payload.name(), "SECRET_CREATED");
    }

    #[test]
    fn test_requires_workspace() {
        let (service, _) = service();
        let ctx = RequestContext::head(TenancyContext::new([OrganizationId::new()], []));
        let err = service.create(&ctx, secret("c2VhbGVk")).unwrap_err();
        assert_eq!(err.code(), "HALYARD_TENANCY_VIOLATION");
    }

    #[test]
    fn test_rejects_invalid_ciphertext() {
        let (service, _) = service();
        let ctx = RequestContext::head(TenancyContext::for_workspace(WorkspaceId::new()));
        let err = service.create(&ctx, secret("not base64!")).unwrap_err();
        assert_eq!(err.code(), "HALYARD_CONSTRAINT_ERROR");
    }
}
