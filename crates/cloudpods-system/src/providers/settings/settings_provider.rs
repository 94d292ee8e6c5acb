//! Runtime setting overrides.
//!
//! Two override levels live here: tenant and global. `resolve` checks the
//! tenant scope first and falls back to global; the compiled-in default from
//! the config file is applied by the settings service in the core, not by
//! this provider.

use crate::error::SystemError;
use cloudpods_commons::models::{Setting, SettingKey, SettingScope};
use cloudpods_commons::{StoragePartition, TenantId};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Type alias for the settings store
pub type SettingsStore = IndexedEntityStore<SettingKey, Setting>;

pub struct SettingsProvider {
    store: SettingsStore,
}

impl std::fmt::Debug for SettingsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsProvider").finish()
    }
}

impl SettingsProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store =
            IndexedEntityStore::new(backend, StoragePartition::Settings.name(), Vec::new());
        Self { store }
    }

    /// Writes an override, replacing any previous value at the same scope.
    pub fn set(&self, setting: Setting) -> Result<(), SystemError> {
        let key = SettingKey::new(setting.scope.clone(), setting.name.clone());
        self.store.put(&key, &setting)?;
        log::debug!(
            "Setting {} = {} at scope {}",
            setting.name,
            setting.value,
            setting.scope
        );
        Ok(())
    }

    /// Reads the override at exactly `scope`, without fallback.
    pub fn get(&self, scope: &SettingScope, name: &str) -> Result<Option<Setting>, SystemError> {
        let key = SettingKey::new(scope.clone(), name);
        Ok(self.store.get(&key)?)
    }

    /// Removes an override. Removing a missing override is a no-op.
    pub fn delete(&self, scope: &SettingScope, name: &str) -> Result<(), SystemError> {
        let key = SettingKey::new(scope.clone(), name);
        self.store.delete(&key)?;
        Ok(())
    }

    /// Resolves `name` for a tenant: tenant override first, then global.
    ///
    /// Returns `None` when neither scope has an override, in which case the
    /// caller falls back to the config-file default.
    pub fn resolve(
        &self,
        name: &str,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<Setting>, SystemError> {
        if let Some(tenant_id) = tenant_id {
            let scope = SettingScope::Tenant(tenant_id.clone());
            if let Some(setting) = self.get(&scope, name)? {
                return Ok(Some(setting));
            }
        }
        self.get(&SettingScope::Global, name)
    }

    /// Lists every override stored at `scope`.
    pub fn list_scope(&self, scope: &SettingScope) -> Result<Vec<Setting>, SystemError> {
        let prefix = SettingKey::scope_prefix(scope);
        Ok(self.store.scan_prefix_bytes(&prefix, None)?)
    }

    /// Drops every override for a tenant. Called when the tenant is removed.
    pub fn delete_all_for_tenant(&self, tenant_id: &TenantId) -> Result<usize, SystemError> {
        let scope = SettingScope::Tenant(tenant_id.clone());
        let settings = self.list_scope(&scope)?;
        for setting in &settings {
            let key = SettingKey::new(setting.scope.clone(), setting.name.clone());
            self.store.delete(&key)?;
        }
        Ok(settings.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudpods_store::test_utils::InMemoryBackend;

    fn create_test_provider() -> SettingsProvider {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        SettingsProvider::new(backend)
    }

    fn setting(scope: SettingScope, name: &str, value: &str) -> Setting {
        Setting {
            scope,
            name: name.to_string(),
            value: value.to_string(),
            updated_at: 1_000,
        }
    }

    #[test]
    fn test_resolve_prefers_tenant_over_global() {
        let provider = create_test_provider();
        let tenant = TenantId::new("t1");

        provider
            .set(setting(
                SettingScope::Global,
                "cloudpods.webhooks.max_attempts",
                "5",
            ))
            .unwrap();
        provider
            .set(setting(
                SettingScope::Tenant(tenant.clone()),
                "cloudpods.webhooks.max_attempts",
                "8",
            ))
            .unwrap();

        let resolved = provider
            .resolve("cloudpods.webhooks.max_attempts", Some(&tenant))
            .unwrap()
            .unwrap();
        assert_eq!(resolved.value, "8");

        // Other tenants fall through to the global value.
        let other = TenantId::new("t2");
        let resolved = provider
            .resolve("cloudpods.webhooks.max_attempts", Some(&other))
            .unwrap()
            .unwrap();
        assert_eq!(resolved.value, "5");

        // No tenant context reads the global value directly.
        let resolved = provider
            .resolve("cloudpods.webhooks.max_attempts", None)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.value, "5");
    }

    #[test]
    fn test_resolve_returns_none_without_overrides() {
        let provider = create_test_provider();
        let tenant = TenantId::new("t1");
        let resolved = provider
            .resolve("cloudpods.audit.retention_days", Some(&tenant))
            .unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn test_delete_restores_fallback() {
        let provider = create_test_provider();
        let tenant = TenantId::new("t1");
        let scope = SettingScope::Tenant(tenant.clone());

        provider
            .set(setting(SettingScope::Global, "cloudpods.auto_heal.enabled", "true"))
            .unwrap();
        provider
            .set(setting(scope.clone(), "cloudpods.auto_heal.enabled", "false"))
            .unwrap();

        provider.delete(&scope, "cloudpods.auto_heal.enabled").unwrap();
        let resolved = provider
            .resolve("cloudpods.auto_heal.enabled", Some(&tenant))
            .unwrap()
            .unwrap();
        assert_eq!(resolved.value, "true");
        assert_eq!(resolved.scope, SettingScope::Global);
    }

    #[test]
    fn test_list_scope_and_tenant_cleanup() {
        let provider = create_test_provider();
        let tenant = TenantId::new("t1");
        let scope = SettingScope::Tenant(tenant.clone());

        provider
            .set(setting(scope.clone(), "cloudpods.backup.default_retention_count", "7"))
            .unwrap();
        provider
            .set(setting(scope.clone(), "cloudpods.metrics.sample_interval_seconds", "30"))
            .unwrap();
        provider
            .set(setting(SettingScope::Global, "cloudpods.metrics.sample_interval_seconds", "60"))
            .unwrap();

        let listed = provider.list_scope(&scope).unwrap();
        assert_eq!(listed.len(), 2);

        let removed = provider.delete_all_for_tenant(&tenant).unwrap();
        assert_eq!(removed, 2);
        assert!(provider.list_scope(&scope).unwrap().is_empty());
        assert_eq!(provider.list_scope(&SettingScope::Global).unwrap().len(), 1);
    }
}
