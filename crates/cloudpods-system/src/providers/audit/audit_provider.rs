//! Audit trail provider: append-only hash chains.
//!
//! Two partitions cooperate here. `audit_events` holds the sealed records,
//! keyed `(scope, seq)` so one scope's chain is a contiguous ordered range.
//! `audit_chain_heads` holds the latest link per scope.
//!
//! An append reads the head, seals the next record against it, and writes
//! record plus replacement head in ONE backend batch, all under a per-scope
//! lock. Two concurrent appends to the same scope therefore serialize and
//! can never fork the chain or skip a sequence number.

use crate::error::SystemError;
use cloudpods_commons::models::{
    AuditChainKey, AuditEvent, AuditScope, ChainHead, NewAuditEvent, GENESIS_HASH,
};
use cloudpods_commons::{Storable, StorageKey, StoragePartition};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexedEntityStore, Operation, Partition, StorageBackend};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};

/// Type alias for the audit events store
pub type AuditEventsStore = IndexedEntityStore<AuditChainKey, AuditEvent>;
/// Type alias for the chain heads store
pub type ChainHeadsStore = IndexedEntityStore<AuditScope, ChainHead>;

/// Outcome of a chain verification walk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainVerification {
    pub valid: bool,
    pub records_checked: u64,
    /// Sequence number of the first record that fails verification.
    pub first_invalid_seq: Option<u64>,
    pub reason: Option<String>,
}

impl ChainVerification {
    fn ok(records_checked: u64) -> Self {
        Self {
            valid: true,
            records_checked,
            first_invalid_seq: None,
            reason: None,
        }
    }

    fn broken(records_checked: u64, seq: Option<u64>, reason: String) -> Self {
        Self {
            valid: false,
            records_checked,
            first_invalid_seq: seq,
            reason: Some(reason),
        }
    }
}

pub struct AuditProvider {
    events: AuditEventsStore,
    heads: ChainHeadsStore,
    backend: Arc<dyn StorageBackend>,
    /// One append lock per scope; appends to different scopes run in parallel.
    scope_locks: DashMap<AuditScope, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for AuditProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditProvider").finish()
    }
}

impl AuditProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let events = IndexedEntityStore::new(
            backend.clone(),
            StoragePartition::AuditEvents.name(),
            Vec::new(),
        );
        let heads = IndexedEntityStore::new(
            backend.clone(),
            StoragePartition::AuditChainHeads.name(),
            Vec::new(),
        );
        Self {
            events,
            heads,
            backend,
            scope_locks: DashMap::new(),
        }
    }

    fn scope_lock(&self, scope: &AuditScope) -> Arc<Mutex<()>> {
        self.scope_locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append one record to its scope's chain.
    ///
    /// Head read and the record+head write happen under the scope lock, so
    /// the observed head is still the chain tip when the batch commits.
    pub fn append(&self, new: NewAuditEvent, now: i64) -> Result<AuditEvent, SystemError> {
        let scope = new.scope.clone();
        let lock = self.scope_lock(&scope);
        let _guard = lock
            .lock()
            .map_err(|e| SystemError::Other(format!("audit scope lock poisoned: {}", e)))?;

        let head = self.heads.get(&scope)?;
        let (seq, previous_hash) = match &head {
            Some(h) => (h.seq + 1, h.hash.clone()),
            None => (1, GENESIS_HASH.to_string()),
        };

        let event = AuditEvent::seal(new, seq, &previous_hash, now);
        let new_head = ChainHead {
            scope: scope.clone(),
            seq,
            hash: event.hash.clone(),
            updated_at: now,
        };

        let operations = vec![
            Operation::Put {
                partition: Partition::new(StoragePartition::AuditEvents.name()),
                key: AuditChainKey::new(scope.clone(), seq).storage_key(),
                value: event.encode()?,
            },
            Operation::Put {
                partition: Partition::new(StoragePartition::AuditChainHeads.name()),
                key: scope.storage_key(),
                value: new_head.encode()?,
            },
        ];
        self.backend.batch(operations)?;

        log::debug!(
            "Audit[{}] seq={} {} {} {}",
            event.scope,
            event.seq,
            event.actor,
            event.action,
            event.resource_id
        );
        Ok(event)
    }

    pub fn get_head(&self, scope: &AuditScope) -> Result<Option<ChainHead>, SystemError> {
        Ok(self.heads.get(scope)?)
    }

    /// Events of one scope in sequence order, optionally starting at
    /// `start_seq`.
    pub fn list_scope(
        &self,
        scope: &AuditScope,
        start_seq: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEvent>, SystemError> {
        let partition = Partition::new(StoragePartition::AuditEvents.name());
        let prefix = AuditChainKey::scope_prefix(scope);
        let start = start_seq.map(|s| AuditChainKey::new(scope.clone(), s).storage_key());

        let iter = self
            .backend
            .scan(&partition, Some(&prefix), start.as_deref(), limit)?;

        let mut events = Vec::new();
        for (_key, value_bytes) in iter {
            events.push(AuditEvent::decode(&value_bytes)?);
        }
        Ok(events)
    }

    /// Every scope that has a chain.
    pub fn list_scopes(&self) -> Result<Vec<AuditScope>, SystemError> {
        let entries = self.heads.scan_all(None, None, None)?;
        Ok(entries.into_iter().map(|(_, head)| head.scope).collect())
    }

    /// Walk one scope's chain and verify every link.
    ///
    /// Checks, in order: per-record hash integrity, sequence continuity,
    /// `previous_hash` linkage, and finally agreement between the last record
    /// and the stored head. The walk reports the FIRST failing record, which
    /// localizes where tampering began.
    ///
    /// A chain whose oldest records were pruned starts at some seq > 1; the
    /// first retained record anchors verification and only its own hash is
    /// checked, since its predecessor no longer exists to compare against.
    pub fn verify_chain(&self, scope: &AuditScope) -> Result<ChainVerification, SystemError> {
        let events = self.list_scope(scope, None, None)?;
        let head = self.heads.get(scope)?;

        if events.is_empty() {
            return match head {
                None => Ok(ChainVerification::ok(0)),
                Some(h) => Ok(ChainVerification::broken(
                    0,
                    None,
                    format!("head records seq {} but the chain has no records", h.seq),
                )),
            };
        }

        let mut checked: u64 = 0;
        let mut previous: Option<&AuditEvent> = None;

        for event in &events {
            checked += 1;

            match previous {
                None => {
                    if event.seq == 1 && event.previous_hash != GENESIS_HASH {
                        return Ok(ChainVerification::broken(
                            checked,
                            Some(event.seq),
                            "first record does not link to the genesis hash".to_string(),
                        ));
                    }
                }
                Some(prev) => {
                    if event.seq != prev.seq + 1 {
                        return Ok(ChainVerification::broken(
                            checked,
                            Some(event.seq),
                            format!("sequence gap: {} follows {}", event.seq, prev.seq),
                        ));
                    }
                    if event.previous_hash != prev.hash {
                        return Ok(ChainVerification::broken(
                            checked,
                            Some(event.seq),
                            format!("record {} does not link to its predecessor", event.seq),
                        ));
                    }
                }
            }

            if !event.hash_is_valid() {
                return Ok(ChainVerification::broken(
                    checked,
                    Some(event.seq),
                    format!("record {} content does not match its hash", event.seq),
                ));
            }

            previous = Some(event);
        }

        // `events` is non-empty here
        if let Some(last) = events.last() {
            match &head {
                Some(h) if h.seq == last.seq && h.hash == last.hash => {}
                Some(h) => {
                    return Ok(ChainVerification::broken(
                        checked,
                        None,
                        format!(
                            "head at seq {} disagrees with last record seq {}",
                            h.seq, last.seq
                        ),
                    ));
                }
                None => {
                    return Ok(ChainVerification::broken(
                        checked,
                        None,
                        "chain has records but no head".to_string(),
                    ));
                }
            }
        }

        Ok(ChainVerification::ok(checked))
    }

    /// Delete records older than `cutoff_ms` from one scope's chain.
    ///
    /// The newest record is always retained so the chain keeps its anchor;
    /// verification of a pruned chain starts from that anchor. Returns the
    /// number of records deleted.
    pub fn prune_older_than(
        &self,
        scope: &AuditScope,
        cutoff_ms: i64,
    ) -> Result<usize, SystemError> {
        let lock = self.scope_lock(scope);
        let _guard = lock
            .lock()
            .map_err(|e| SystemError::Other(format!("audit scope lock poisoned: {}", e)))?;

        let head = match self.heads.get(scope)? {
            Some(h) => h,
            None => return Ok(0),
        };

        let events = self.list_scope(scope, None, None)?;
        let partition = Partition::new(StoragePartition::AuditEvents.name());

        let mut operations = Vec::new();
        for event in &events {
            // Keep the chain anchor
            if event.seq >= head.seq {
                break;
            }
            if event.created_at >= cutoff_ms {
                break;
            }
            operations.push(Operation::Delete {
                partition: partition.clone(),
                key: AuditChainKey::new(scope.clone(), event.seq).storage_key(),
            });
        }

        let deleted = operations.len();
        if deleted > 0 {
            self.backend.batch(operations)?;
            log::info!(
                "Audit retention pruned {} records from scope {}",
                deleted,
                scope
            );
        }
        Ok(deleted)
    }

    /// Async version of `append()`.
    ///
    /// Uses `spawn_blocking` internally to avoid blocking the async runtime.
    pub async fn append_async(
        self: &Arc<Self>,
        new: NewAuditEvent,
        now: i64,
    ) -> Result<AuditEvent, SystemError> {
        let provider = Arc::clone(self);
        tokio::task::spawn_blocking(move || provider.append(new, now))
            .await
            .map_err(|e| SystemError::Other(format!("spawn_blocking error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudpods_commons::{now_millis, TenantId};
    use cloudpods_store::test_utils::InMemoryBackend;

    fn create_test_provider() -> AuditProvider {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        AuditProvider::new(backend)
    }

    fn tenant_scope(id: &str) -> AuditScope {
        AuditScope::Tenant(TenantId::new(id))
    }

    fn test_input(scope: AuditScope, action: &str) -> NewAuditEvent {
        NewAuditEvent {
            scope,
            actor: "system".to_string(),
            action: action.to_string(),
            resource_type: "pod".to_string(),
            resource_id: "pod-1".to_string(),
            metadata: None,
        }
    }

    #[test]
    fn test_append_assigns_sequences_and_links() {
        let provider = create_test_provider();
        let scope = tenant_scope("t1");
        let now = now_millis();

        let e1 = provider.append(test_input(scope.clone(), "pod.create"), now).unwrap();
        let e2 = provider.append(test_input(scope.clone(), "pod.suspend"), now + 1).unwrap();
        let e3 = provider.append(test_input(scope.clone(), "pod.resume"), now + 2).unwrap();

        assert_eq!((e1.seq, e2.seq, e3.seq), (1, 2, 3));
        assert_eq!(e1.previous_hash, GENESIS_HASH);
        assert_eq!(e2.previous_hash, e1.hash);
        assert_eq!(e3.previous_hash, e2.hash);

        let head = provider.get_head(&scope).unwrap().unwrap();
        assert_eq!(head.seq, 3);
        assert_eq!(head.hash, e3.hash);
    }

    #[test]
    fn test_scopes_are_independent_chains() {
        let provider = create_test_provider();
        let now = now_millis();

        provider.append(test_input(tenant_scope("t1"), "a"), now).unwrap();
        provider.append(test_input(tenant_scope("t1"), "b"), now).unwrap();
        let global = provider.append(test_input(AuditScope::Global, "c"), now).unwrap();

        assert_eq!(global.seq, 1);
        assert_eq!(global.previous_hash, GENESIS_HASH);

        let mut scopes = provider.list_scopes().unwrap();
        scopes.sort_by_key(|s| s.key_segment());
        assert_eq!(scopes.len(), 2);
    }

    #[test]
    fn test_verify_intact_chain() {
        let provider = create_test_provider();
        let scope = tenant_scope("t1");
        let now = now_millis();
        for i in 0..5 {
            provider
                .append(test_input(scope.clone(), &format!("action-{}", i)), now + i)
                .unwrap();
        }

        let report = provider.verify_chain(&scope).unwrap();
        assert!(report.valid);
        assert_eq!(report.records_checked, 5);
        assert!(report.first_invalid_seq.is_none());
    }

    #[test]
    fn test_verify_empty_chain() {
        let provider = create_test_provider();
        let report = provider.verify_chain(&tenant_scope("t-none")).unwrap();
        assert!(report.valid);
        assert_eq!(report.records_checked, 0);
    }

    #[test]
    fn test_verify_detects_tampered_record() {
        let provider = create_test_provider();
        let scope = tenant_scope("t1");
        let now = now_millis();
        for i in 0..4 {
            provider
                .append(test_input(scope.clone(), &format!("action-{}", i)), now + i)
                .unwrap();
        }

        // Rewrite record 2 in place, as an attacker with store access would
        let key = AuditChainKey::new(scope.clone(), 2);
        let mut tampered = provider.events.get(&key).unwrap().unwrap();
        tampered.actor = "intruder".to_string();
        provider.events.put(&key, &tampered).unwrap();

        let report = provider.verify_chain(&scope).unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_invalid_seq, Some(2));
    }

    #[test]
    fn test_verify_detects_reforged_hash() {
        let provider = create_test_provider();
        let scope = tenant_scope("t1");
        let now = now_millis();
        for i in 0..4 {
            provider
                .append(test_input(scope.clone(), &format!("action-{}", i)), now + i)
                .unwrap();
        }

        // Recompute the hash after editing, so the record is self-consistent.
        // The successor's previous_hash no longer matches, which pins the
        // break at seq 3.
        let key = AuditChainKey::new(scope.clone(), 2);
        let mut tampered = provider.events.get(&key).unwrap().unwrap();
        tampered.actor = "intruder".to_string();
        tampered.hash = tampered.compute_hash();
        provider.events.put(&key, &tampered).unwrap();

        let report = provider.verify_chain(&scope).unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_invalid_seq, Some(3));
    }

    #[test]
    fn test_verify_detects_deleted_record() {
        let provider = create_test_provider();
        let scope = tenant_scope("t1");
        let now = now_millis();
        for i in 0..4 {
            provider
                .append(test_input(scope.clone(), &format!("action-{}", i)), now + i)
                .unwrap();
        }

        provider
            .events
            .delete(&AuditChainKey::new(scope.clone(), 2))
            .unwrap();

        let report = provider.verify_chain(&scope).unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_invalid_seq, Some(3));
        assert!(report.reason.as_deref().unwrap_or("").contains("gap"));
    }

    #[test]
    fn test_verify_detects_truncated_tail() {
        let provider = create_test_provider();
        let scope = tenant_scope("t1");
        let now = now_millis();
        for i in 0..3 {
            provider
                .append(test_input(scope.clone(), &format!("action-{}", i)), now + i)
                .unwrap();
        }

        provider
            .events
            .delete(&AuditChainKey::new(scope.clone(), 3))
            .unwrap();

        let report = provider.verify_chain(&scope).unwrap();
        assert!(!report.valid);
        assert!(report
            .reason
            .as_deref()
            .unwrap_or("")
            .contains("head at seq 3"));
    }

    #[test]
    fn test_prune_keeps_anchor_and_chain_verifies() {
        let provider = create_test_provider();
        let scope = tenant_scope("t1");
        let base = 1_000_000;
        for i in 0..5 {
            provider
                .append(test_input(scope.clone(), &format!("action-{}", i)), base + i)
                .unwrap();
        }

        // Everything is older than the cutoff; the newest record survives
        let deleted = provider.prune_older_than(&scope, base + 100).unwrap();
        assert_eq!(deleted, 4);

        let remaining = provider.list_scope(&scope, None, None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].seq, 5);

        let report = provider.verify_chain(&scope).unwrap();
        assert!(report.valid, "pruned chain verifies from its anchor");
        assert_eq!(report.records_checked, 1);

        // Appends continue the original sequence
        let next = provider
            .append(test_input(scope.clone(), "after-prune"), base + 10)
            .unwrap();
        assert_eq!(next.seq, 6);
        assert!(provider.verify_chain(&scope).unwrap().valid);
    }

    #[test]
    fn test_prune_respects_cutoff() {
        let provider = create_test_provider();
        let scope = tenant_scope("t1");
        let base = 1_000_000;
        for i in 0..5 {
            provider
                .append(
                    test_input(scope.clone(), &format!("action-{}", i)),
                    base + i * 1_000,
                )
                .unwrap();
        }

        // Only records strictly older than base+2000 go
        let deleted = provider.prune_older_than(&scope, base + 2_000).unwrap();
        assert_eq!(deleted, 2);

        let remaining = provider.list_scope(&scope, None, None).unwrap();
        let seqs: Vec<u64> = remaining.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_never_fork() {
        let provider = Arc::new(create_test_provider());
        let scope = tenant_scope("t1");
        let now = now_millis();

        let mut handles = Vec::new();
        for i in 0..10 {
            let provider = Arc::clone(&provider);
            let scope = scope.clone();
            handles.push(tokio::spawn(async move {
                provider
                    .append_async(test_input(scope, &format!("action-{}", i)), now + i)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let report = provider.verify_chain(&scope).unwrap();
        assert!(report.valid);
        assert_eq!(report.records_checked, 10);

        let head = provider.get_head(&scope).unwrap().unwrap();
        assert_eq!(head.seq, 10);
    }
}
