//! Typed access to runtime settings.
//!
//! Resolution order per key: tenant override, then global override, then
//! the config-file default. Overrides are stored as strings; a value that
//! fails to parse is logged and ignored so one bad override cannot take the
//! coordinator or scheduler down.

use crate::error::{CoreError, Result};
use cloudpods_commons::models::{Setting, SettingScope};
use cloudpods_commons::{now_millis, TenantId};
use cloudpods_configs::OrchestratorConfig;
use cloudpods_system::SettingsProvider;
use std::str::FromStr;
use std::sync::Arc;

/// Names of the overridable settings.
pub mod keys {
    pub const JOB_MAX_ATTEMPTS: &str = "cloudpods.jobs.default_max_attempts";
    pub const JOB_RETRY_BASE_DELAY_SECONDS: &str = "cloudpods.jobs.retry_base_delay_seconds";
    pub const JOB_MAX_RETRY_DELAY_SECONDS: &str = "cloudpods.jobs.max_retry_delay_seconds";
    pub const JOB_RETENTION_DAYS: &str = "cloudpods.jobs.retention_days";
    pub const AUTO_HEAL_ENABLED: &str = "cloudpods.auto_heal.enabled";
    pub const AUTO_HEAL_FAILURE_THRESHOLD: &str = "cloudpods.auto_heal.failure_threshold";
    pub const BACKUP_RETENTION_COUNT: &str = "cloudpods.backup.default_retention_count";
    pub const WEBHOOK_MAX_ATTEMPTS: &str = "cloudpods.webhooks.max_attempts";
    pub const WEBHOOK_INITIAL_RETRY_DELAY_SECONDS: &str =
        "cloudpods.webhooks.initial_retry_delay_seconds";
    pub const WEBHOOK_MAX_RETRY_DELAY_SECONDS: &str = "cloudpods.webhooks.max_retry_delay_seconds";
    pub const SAMPLE_RETENTION_DAYS: &str = "cloudpods.metrics.sample_retention_days";
    pub const AUDIT_RETENTION_DAYS: &str = "cloudpods.audit.retention_days";
}

const KNOWN_KEYS: &[&str] = &[
    keys::JOB_MAX_ATTEMPTS,
    keys::JOB_RETRY_BASE_DELAY_SECONDS,
    keys::JOB_MAX_RETRY_DELAY_SECONDS,
    keys::JOB_RETENTION_DAYS,
    keys::AUTO_HEAL_ENABLED,
    keys::AUTO_HEAL_FAILURE_THRESHOLD,
    keys::BACKUP_RETENTION_COUNT,
    keys::WEBHOOK_MAX_ATTEMPTS,
    keys::WEBHOOK_INITIAL_RETRY_DELAY_SECONDS,
    keys::WEBHOOK_MAX_RETRY_DELAY_SECONDS,
    keys::SAMPLE_RETENTION_DAYS,
    keys::AUDIT_RETENTION_DAYS,
];

pub struct SettingsService {
    provider: Arc<SettingsProvider>,
    config: Arc<OrchestratorConfig>,
}

impl SettingsService {
    pub fn new(provider: Arc<SettingsProvider>, config: Arc<OrchestratorConfig>) -> Self {
        Self { provider, config }
    }

    pub fn known_keys() -> &'static [&'static str] {
        KNOWN_KEYS
    }

    /// Write an override at the given scope.
    pub fn set_override(&self, scope: SettingScope, name: &str, value: &str) -> Result<()> {
        if !KNOWN_KEYS.contains(&name) {
            return Err(CoreError::InvalidOperation(format!(
                "Unknown setting '{}'",
                name
            )));
        }
        self.provider.set(Setting {
            scope,
            name: name.to_string(),
            value: value.to_string(),
            updated_at: now_millis(),
        })?;
        Ok(())
    }

    /// Remove an override, restoring the next fallback level.
    pub fn clear_override(&self, scope: &SettingScope, name: &str) -> Result<()> {
        self.provider.delete(scope, name)?;
        Ok(())
    }

    /// Resolve one key through the override chain and parse it; lookup
    /// failures and unparsable values fall back to `default`.
    fn resolved<T: FromStr>(&self, name: &str, tenant_id: Option<&TenantId>, default: T) -> T {
        let setting = match self.provider.resolve(name, tenant_id) {
            Ok(setting) => setting,
            Err(e) => {
                log::warn!("Failed to resolve setting {}: {}", name, e);
                return default;
            }
        };
        match setting {
            Some(setting) => match setting.value.parse::<T>() {
                Ok(value) => value,
                Err(_) => {
                    log::warn!(
                        "Setting {} at scope {} has unparsable value '{}'; using default",
                        name,
                        setting.scope,
                        setting.value
                    );
                    default
                }
            },
            None => default,
        }
    }

    pub fn job_max_attempts(&self, tenant_id: Option<&TenantId>) -> u32 {
        self.resolved(
            keys::JOB_MAX_ATTEMPTS,
            tenant_id,
            self.config.jobs.default_max_attempts,
        )
    }

    pub fn retry_base_delay_seconds(&self, tenant_id: Option<&TenantId>) -> u64 {
        self.resolved(
            keys::JOB_RETRY_BASE_DELAY_SECONDS,
            tenant_id,
            self.config.jobs.retry_base_delay_seconds,
        )
    }

    pub fn max_retry_delay_seconds(&self, tenant_id: Option<&TenantId>) -> u64 {
        self.resolved(
            keys::JOB_MAX_RETRY_DELAY_SECONDS,
            tenant_id,
            self.config.jobs.max_retry_delay_seconds,
        )
    }

    pub fn job_retention_days(&self) -> u32 {
        self.resolved(keys::JOB_RETENTION_DAYS, None, self.config.jobs.retention_days)
    }

    pub fn auto_heal_enabled(&self, tenant_id: Option<&TenantId>) -> bool {
        self.resolved(
            keys::AUTO_HEAL_ENABLED,
            tenant_id,
            self.config.auto_heal.enabled,
        )
    }

    pub fn auto_heal_failure_threshold(&self, tenant_id: Option<&TenantId>) -> u32 {
        self.resolved(
            keys::AUTO_HEAL_FAILURE_THRESHOLD,
            tenant_id,
            self.config.auto_heal.failure_threshold,
        )
    }

    pub fn backup_retention_count(&self, tenant_id: Option<&TenantId>) -> u32 {
        self.resolved(
            keys::BACKUP_RETENTION_COUNT,
            tenant_id,
            self.config.backup.default_retention_count,
        )
    }

    pub fn webhook_max_attempts(&self, tenant_id: Option<&TenantId>) -> u32 {
        self.resolved(
            keys::WEBHOOK_MAX_ATTEMPTS,
            tenant_id,
            self.config.webhooks.max_attempts,
        )
    }

    pub fn webhook_initial_retry_delay_seconds(&self, tenant_id: Option<&TenantId>) -> u64 {
        self.resolved(
            keys::WEBHOOK_INITIAL_RETRY_DELAY_SECONDS,
            tenant_id,
            self.config.webhooks.initial_retry_delay_seconds,
        )
    }

    pub fn webhook_max_retry_delay_seconds(&self, tenant_id: Option<&TenantId>) -> u64 {
        self.resolved(
            keys::WEBHOOK_MAX_RETRY_DELAY_SECONDS,
            tenant_id,
            self.config.webhooks.max_retry_delay_seconds,
        )
    }

    pub fn sample_retention_days(&self) -> u32 {
        self.resolved(
            keys::SAMPLE_RETENTION_DAYS,
            None,
            self.config.metrics.sample_retention_days,
        )
    }

    pub fn audit_retention_days(&self) -> u32 {
        self.resolved(
            keys::AUDIT_RETENTION_DAYS,
            None,
            self.config.audit.retention_days,
        )
    }
}
