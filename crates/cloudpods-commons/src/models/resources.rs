//! Pod sub-resources: volumes, DNS records, security groups.
//!
//! Each sub-resource carries its own status so a partial provisioning
//! failure is attributable to one resource instead of the whole pod.

use crate::ids::{DnsRecordId, PodId, SecurityGroupId, TenantId, VolumeId};
use crate::serialization::Storable;
use crate::storage_key::{decode_key, encode_key};
use crate::StorageKey;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an independently provisioned sub-resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum ResourceStatus {
    Creating,
    Active,
    Failed,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Creating => "creating",
            ResourceStatus::Active => "active",
            ResourceStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Block volume attached to a pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Volume {
    pub volume_id: VolumeId,
    pub pod_id: PodId,
    pub size_gb: u32,
    pub status: ResourceStatus,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// DNS record owned by a pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct DnsRecord {
    pub record_id: DnsRecordId,
    pub pod_id: PodId,
    /// Fully qualified domain name, e.g. `app.tenant.example.com.`
    pub fqdn: String,
    pub record_type: String,
    pub value: String,
    pub ttl: u32,
    pub status: ResourceStatus,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum RuleDirection {
    Ingress,
    Egress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum RuleProtocol {
    Tcp,
    Udp,
    Icmp,
    Any,
}

/// One ordered firewall rule inside a security group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct SecurityGroupRule {
    pub direction: RuleDirection,
    pub protocol: RuleProtocol,
    pub port_min: u16,
    pub port_max: u16,
    pub cidr: String,
}

/// Security group owning an ordered rule list.
///
/// Pods reference groups only through assignment rows, never the other way
/// round; deleting a group cascades its assignments, never the pods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct SecurityGroup {
    pub group_id: SecurityGroupId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Exactly one default group exists per tenant; it is assigned to every
    /// newly provisioned pod.
    pub is_default: bool,
    pub rules: Vec<SecurityGroupRule>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Join row of the many-to-many pod ↔ security-group relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct SecurityGroupAssignment {
    pub pod_id: PodId,
    pub group_id: SecurityGroupId,
    pub assigned_at: i64,
}

/// Composite primary key of an assignment row: `(pod_id, group_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssignmentKey {
    pub pod_id: PodId,
    pub group_id: SecurityGroupId,
}

impl AssignmentKey {
    pub fn new(pod_id: PodId, group_id: SecurityGroupId) -> Self {
        Self { pod_id, group_id }
    }
}

impl StorageKey for AssignmentKey {
    fn storage_key(&self) -> Vec<u8> {
        encode_key(&(self.pod_id.as_str(), self.group_id.as_str()))
    }

    fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
        let (pod, group): (String, String) = decode_key(bytes)?;
        Ok(Self::new(PodId::new(pod), SecurityGroupId::new(group)))
    }
}

// Storable implementations for EntityStore support
impl Storable for Volume {}
impl Storable for DnsRecord {}
impl Storable for SecurityGroup {}
impl Storable for SecurityGroupAssignment {}
