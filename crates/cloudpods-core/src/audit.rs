//! Convenience layer over the audit chain.
//!
//! The provider seals and chains records; this recorder shapes the content:
//! actor conventions, JSON metadata, scope helpers.

use crate::error::Result;
use cloudpods_commons::models::{AuditEvent, AuditScope, NewAuditEvent};
use cloudpods_commons::{now_millis, TenantId};
use cloudpods_system::AuditProvider;
use std::sync::Arc;

/// Actor recorded for actions the orchestrator takes on its own.
pub const SYSTEM_ACTOR: &str = "system";

pub struct AuditRecorder {
    provider: Arc<AuditProvider>,
}

impl AuditRecorder {
    pub fn new(provider: Arc<AuditProvider>) -> Self {
        Self { provider }
    }

    /// Append one record to `scope`'s chain.
    pub fn record(
        &self,
        scope: AuditScope,
        actor: &str,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<AuditEvent> {
        let event = self.provider.append(
            NewAuditEvent {
                scope,
                actor: actor.to_string(),
                action: action.to_string(),
                resource_type: resource_type.to_string(),
                resource_id: resource_id.to_string(),
                metadata: metadata.map(|m| m.to_string()),
            },
            now_millis(),
        )?;
        Ok(event)
    }

    /// Record under a tenant's chain as the system actor.
    pub fn record_system(
        &self,
        tenant_id: &TenantId,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<AuditEvent> {
        self.record(
            AuditScope::Tenant(tenant_id.clone()),
            SYSTEM_ACTOR,
            action,
            resource_type,
            resource_id,
            metadata,
        )
    }

    /// Record under the global chain as the system actor.
    pub fn record_global(
        &self,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<AuditEvent> {
        self.record(
            AuditScope::Global,
            SYSTEM_ACTOR,
            action,
            resource_type,
            resource_id,
            metadata,
        )
    }
}
