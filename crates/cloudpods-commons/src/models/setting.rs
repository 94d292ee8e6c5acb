//! Runtime setting overrides.
//!
//! Settings resolve tenant override first, then global override, then the
//! compiled-in default from the config file. Only the first two live here;
//! the file default belongs to the config layer.

use crate::ids::TenantId;
use crate::serialization::Storable;
use crate::storage_key::{decode_key, encode_key, encode_prefix, StorageKey};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which level a setting override applies at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum SettingScope {
    Global,
    Tenant(TenantId),
}

impl SettingScope {
    /// Stable key segment, shared with the storage key encoding.
    pub fn key_segment(&self) -> String {
        match self {
            SettingScope::Global => "global".to_string(),
            SettingScope::Tenant(tenant_id) => format!("tenant:{}", tenant_id.as_str()),
        }
    }

    pub fn from_key_segment(segment: &str) -> Result<Self, String> {
        if segment == "global" {
            return Ok(SettingScope::Global);
        }
        match segment.strip_prefix("tenant:") {
            Some(id) if !id.is_empty() => Ok(SettingScope::Tenant(TenantId::new(id))),
            _ => Err(format!("Invalid setting scope segment: {}", segment)),
        }
    }
}

impl fmt::Display for SettingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_segment())
    }
}

/// Primary key of a setting row: `(scope, name)`.
///
/// One scope's settings are contiguous, so listing all overrides for a
/// tenant is a single prefix scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingKey {
    pub scope: SettingScope,
    pub name: String,
}

impl SettingKey {
    pub fn new(scope: SettingScope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    /// Prefix matching every setting in `scope`.
    pub fn scope_prefix(scope: &SettingScope) -> Vec<u8> {
        encode_prefix(&(scope.key_segment(),))
    }
}

impl StorageKey for SettingKey {
    fn storage_key(&self) -> Vec<u8> {
        encode_key(&(self.scope.key_segment(), self.name.as_str()))
    }

    fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
        let (segment, name): (String, String) = decode_key(bytes)?;
        Ok(Self {
            scope: SettingScope::from_key_segment(&segment)?,
            name,
        })
    }
}

/// One persisted setting override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Setting {
    pub scope: SettingScope,
    /// Dotted setting path, e.g. `cloudpods.webhooks.max_attempts`.
    pub name: String,
    pub value: String,
    pub updated_at: i64,
}

// Storable implementations for EntityStore support
impl Storable for Setting {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        let key = SettingKey::new(
            SettingScope::Tenant(TenantId::new("t1")),
            "cloudpods.webhooks.max_attempts",
        );
        let back = SettingKey::from_storage_key(&key.storage_key()).unwrap();
        assert_eq!(key, back);
    }

    #[test]
    fn test_scope_prefix_groups_settings() {
        let scope = SettingScope::Tenant(TenantId::new("t1"));
        let a = SettingKey::new(scope.clone(), "cloudpods.a").storage_key();
        let b = SettingKey::new(scope.clone(), "cloudpods.b").storage_key();
        let other = SettingKey::new(SettingScope::Global, "cloudpods.a").storage_key();

        let prefix = SettingKey::scope_prefix(&scope);
        assert!(a.starts_with(&prefix));
        assert!(b.starts_with(&prefix));
        assert!(!other.starts_with(&prefix));
    }

    #[test]
    fn test_scope_segment_round_trip() {
        for scope in [
            SettingScope::Global,
            SettingScope::Tenant(TenantId::new("t7")),
        ] {
            let parsed = SettingScope::from_key_segment(&scope.key_segment()).unwrap();
            assert_eq!(parsed, scope);
        }
        assert!(SettingScope::from_key_segment("tenant:").is_err());
    }
}
