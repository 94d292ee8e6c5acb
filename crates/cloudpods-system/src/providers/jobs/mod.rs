//! Jobs table module (jobs in RocksDB)
//!
//! This module contains all components for the durable job queue:
//! - IndexedEntityStore wrapper for type-safe storage with automatic index management
//! - Claim, retry, and retention operations
//! - Index definitions for efficient queries

pub mod jobs_indexes;
pub mod jobs_provider;

pub use jobs_indexes::{
    claim_priority, create_jobs_indexes, status_to_u8, JobIdempotencyIndex, JobPodActiveIndex,
    JobQueueClaimIndex, JobStatusUpdatedIndex,
};
pub use jobs_provider::{JobsProvider, JobsStore};
