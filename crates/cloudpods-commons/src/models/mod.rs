//! Persisted data models for the orchestration core.

pub mod audit;
pub mod backup;
pub mod health;
pub mod job;
pub mod pod;
pub mod resources;
pub mod setting;
pub mod usage;
pub mod webhook;
pub mod worker;

pub use audit::{AuditChainKey, AuditEvent, AuditScope, ChainHead, NewAuditEvent, GENESIS_HASH};
pub use backup::{BackupPolicy, BackupRun, BackupRunStatus, BackupType};
pub use health::{HealthState, HealthStatus};
pub use job::{Job, JobFilter, JobKind, JobOptions, JobStatus};
pub use pod::{Pod, PodStatus};
pub use resources::{
    AssignmentKey, DnsRecord, ResourceStatus, RuleDirection, RuleProtocol, SecurityGroup,
    SecurityGroupAssignment, SecurityGroupRule, Volume,
};
pub use setting::{Setting, SettingKey, SettingScope};
pub use usage::{RollupKey, SampleKey, UsageDaily, UsageSample};
pub use webhook::{DeliveryStatus, EventType, Webhook, WebhookDelivery};
pub use worker::{Worker, WorkerStatus};
