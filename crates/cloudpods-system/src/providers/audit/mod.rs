//! Audit trail module (audit_events + audit_chain_heads in RocksDB)

pub mod audit_provider;

pub use audit_provider::{AuditEventsStore, AuditProvider, ChainHeadsStore, ChainVerification};
