//! Tamper-evident audit trail models.
//!
//! Every audited action appends one record to a hash chain. Each record's
//! `hash` covers its own content plus the `previous_hash` of its predecessor,
//! so editing or deleting any historical record breaks every hash after it.
//! Chains are kept per tenant, with one reserved global chain for
//! platform-level actions.

use crate::ids::{prefixed_id, TenantId};
use crate::serialization::Storable;
use crate::storage_key::{decode_key, encode_key, encode_prefix, StorageKey};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// `previous_hash` of the first record in a chain.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Which chain a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum AuditScope {
    /// Platform-level actions not attributable to a single tenant.
    Global,
    Tenant(TenantId),
}

impl AuditScope {
    /// Stable key segment used in chain-head keys and event-key prefixes.
    pub fn key_segment(&self) -> String {
        match self {
            AuditScope::Global => "global".to_string(),
            AuditScope::Tenant(tenant_id) => format!("tenant:{}", tenant_id.as_str()),
        }
    }

    pub fn from_key_segment(segment: &str) -> Result<Self, String> {
        if segment == "global" {
            return Ok(AuditScope::Global);
        }
        match segment.strip_prefix("tenant:") {
            Some(id) if !id.is_empty() => Ok(AuditScope::Tenant(TenantId::new(id))),
            _ => Err(format!("Invalid audit scope segment: {}", segment)),
        }
    }
}

impl fmt::Display for AuditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_segment())
    }
}

impl StorageKey for AuditScope {
    fn storage_key(&self) -> Vec<u8> {
        encode_key(&self.key_segment())
    }

    fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
        let segment: String = decode_key(bytes)?;
        AuditScope::from_key_segment(&segment)
    }
}

/// Ordered event key: events in one scope sort by sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditChainKey {
    pub scope: AuditScope,
    pub seq: u64,
}

impl AuditChainKey {
    pub fn new(scope: AuditScope, seq: u64) -> Self {
        Self { scope, seq }
    }

    /// Prefix matching every event key in `scope`.
    pub fn scope_prefix(scope: &AuditScope) -> Vec<u8> {
        encode_prefix(&(scope.key_segment(),))
    }
}

impl StorageKey for AuditChainKey {
    fn storage_key(&self) -> Vec<u8> {
        encode_key(&(self.scope.key_segment(), self.seq))
    }

    fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
        let (segment, seq): (String, u64) = decode_key(bytes)?;
        Ok(Self {
            scope: AuditScope::from_key_segment(&segment)?,
            seq,
        })
    }
}

/// Latest link of one scope's chain.
///
/// Read and replaced in the same atomic batch as the event insert it covers,
/// so head and chain can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ChainHead {
    pub scope: AuditScope,
    pub seq: u64,
    pub hash: String,
    pub updated_at: i64,
}

/// Event content prior to sealing: everything except chain position and hashes.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub scope: AuditScope,
    /// Who performed the action: `system`, a worker id, or an operator handle.
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    /// JSON payload with action-specific detail.
    pub metadata: Option<String>,
}

/// One sealed record in an audit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct AuditEvent {
    pub id: String,
    pub scope: AuditScope,
    pub seq: u64,
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub metadata: Option<String>,
    pub previous_hash: String,
    pub hash: String,
    pub created_at: i64,
}

impl AuditEvent {
    /// Seal `new` as the record following `previous_hash` at position `seq`.
    pub fn seal(new: NewAuditEvent, seq: u64, previous_hash: &str, now: i64) -> Self {
        let mut event = AuditEvent {
            id: prefixed_id("AU"),
            scope: new.scope,
            seq,
            actor: new.actor,
            action: new.action,
            resource_type: new.resource_type,
            resource_id: new.resource_id,
            metadata: new.metadata,
            previous_hash: previous_hash.to_string(),
            hash: String::new(),
            created_at: now,
        };
        event.hash = event.compute_hash();
        event
    }

    /// Length-prefixed concatenation of every hashed field.
    ///
    /// Length prefixes keep the input unambiguous: without them the field
    /// pairs ("ab", "c") and ("a", "bc") would hash identically.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut push = |bytes: &[u8]| {
            buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
            buf.extend_from_slice(bytes);
        };
        push(self.scope.key_segment().as_bytes());
        push(&self.seq.to_be_bytes());
        push(self.actor.as_bytes());
        push(self.action.as_bytes());
        push(self.resource_type.as_bytes());
        push(self.resource_id.as_bytes());
        push(self.metadata.as_deref().unwrap_or("").as_bytes());
        push(&self.created_at.to_be_bytes());
        buf
    }

    /// Recompute this record's hash from `previous_hash` and its content.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.previous_hash.as_bytes());
        hasher.update(self.canonical_bytes());
        hex::encode(hasher.finalize())
    }

    /// Whether the stored hash matches the recomputed one.
    pub fn hash_is_valid(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

// Storable implementations for EntityStore support
impl Storable for AuditEvent {}
impl Storable for ChainHead {}
