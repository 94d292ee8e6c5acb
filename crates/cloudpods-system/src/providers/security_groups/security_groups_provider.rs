//! Security groups provider.
//!
//! Groups are tenant-owned rule lists. Pod membership lives in the
//! assignments table; deleting a group must cascade assignments there first.

use crate::error::SystemError;
use cloudpods_commons::models::{SecurityGroup, SecurityGroupRule};
use cloudpods_commons::{encode_key, encode_prefix, SecurityGroupId, StoragePartition, TenantId};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexDefinition, IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Index position for `SecurityGroupTenantIndex`.
pub const TENANT_INDEX: usize = 0;

/// Index: groups by owning tenant. Key: `(tenant_id, group_id)`.
pub struct SecurityGroupTenantIndex;

impl IndexDefinition<SecurityGroupId, SecurityGroup> for SecurityGroupTenantIndex {
    fn partition(&self) -> &str {
        StoragePartition::SecurityGroupsTenantIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["tenant_id", "group_id"]
    }

    fn extract_key(&self, _pk: &SecurityGroupId, group: &SecurityGroup) -> Option<Vec<u8>> {
        Some(encode_key(&(
            group.tenant_id.as_str(),
            group.group_id.as_str(),
        )))
    }
}

/// Type alias for the indexed security groups store
pub type SecurityGroupsStore = IndexedEntityStore<SecurityGroupId, SecurityGroup>;

pub struct SecurityGroupsProvider {
    store: SecurityGroupsStore,
}

impl std::fmt::Debug for SecurityGroupsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityGroupsProvider").finish()
    }
}

impl SecurityGroupsProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store = IndexedEntityStore::new(
            backend,
            StoragePartition::SecurityGroups.name(),
            vec![Arc::new(SecurityGroupTenantIndex)
                as Arc<dyn IndexDefinition<SecurityGroupId, SecurityGroup>>],
        );
        Self { store }
    }

    /// Create a group. A second default group for the same tenant is rejected.
    pub fn create_group(&self, group: SecurityGroup) -> Result<SecurityGroup, SystemError> {
        if self.store.get(&group.group_id)?.is_some() {
            return Err(SystemError::AlreadyExists(format!(
                "Security group already exists: {}",
                group.group_id
            )));
        }
        if group.is_default {
            if let Some(existing) = self.find_default(&group.tenant_id)? {
                return Err(SystemError::InvalidOperation(format!(
                    "Tenant {} already has default security group {}",
                    group.tenant_id, existing.group_id
                )));
            }
        }
        self.store.insert(&group.group_id, &group)?;
        log::info!(
            "Created security group {} for tenant {} (default={})",
            group.group_id,
            group.tenant_id,
            group.is_default
        );
        Ok(group)
    }

    pub fn get_group(&self, group_id: &SecurityGroupId) -> Result<Option<SecurityGroup>, SystemError> {
        Ok(self.store.get(group_id)?)
    }

    /// Replace a group's rule list.
    pub fn update_rules(
        &self,
        group_id: &SecurityGroupId,
        rules: Vec<SecurityGroupRule>,
        now: i64,
    ) -> Result<SecurityGroup, SystemError> {
        let group = self.store.get(group_id)?.ok_or_else(|| {
            SystemError::NotFound(format!("Security group not found: {}", group_id))
        })?;
        let mut updated = group.clone();
        updated.rules = rules;
        updated.updated_at = now;
        self.store.update_with_old(group_id, Some(&group), &updated)?;
        Ok(updated)
    }

    pub fn list_by_tenant(&self, tenant_id: &TenantId) -> Result<Vec<SecurityGroup>, SystemError> {
        let prefix = encode_prefix(&(tenant_id.as_str(),));
        let entries = self.store.scan_by_index(TENANT_INDEX, Some(&prefix), None)?;
        Ok(entries.into_iter().map(|(_, g)| g).collect())
    }

    /// The tenant's default group, assigned to every newly provisioned pod.
    pub fn find_default(&self, tenant_id: &TenantId) -> Result<Option<SecurityGroup>, SystemError> {
        let groups = self.list_by_tenant(tenant_id)?;
        Ok(groups.into_iter().find(|g| g.is_default))
    }

    /// Remove the group row.
    ///
    /// Callers cascade assignment rows through
    /// `AssignmentsProvider::delete_all_for_group` before calling this, so
    /// membership never outlives the group. Pods themselves are never touched.
    pub fn delete_group(&self, group_id: &SecurityGroupId) -> Result<(), SystemError> {
        self.store.delete(group_id)?;
        log::info!("Deleted security group {}", group_id);
        Ok(())
    }
}
