use super::defaults::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub jobs: JobsSettings,
    #[serde(default)]
    pub auto_heal: AutoHealSettings,
    #[serde(default)]
    pub backup: BackupSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub audit: AuditSettings,
    #[serde(default)]
    pub webhooks: WebhookSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Instance name used in startup logs and worker identifiers
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Seconds to wait for in-flight jobs to finish during graceful shutdown
    #[serde(default = "default_shutdown_drain_timeout")]
    pub shutdown_drain_timeout_seconds: u64,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Base data directory for all CloudPods storage
    /// Default: "./data"
    /// The RocksDB store lives under {data_path}/rocksdb
    #[serde(default = "default_data_path")]
    pub data_path: String,
    #[serde(default)]
    pub rocksdb: RocksDbSettings,
}

impl StorageSettings {
    /// Get RocksDB directory path (data_path/rocksdb)
    pub fn rocksdb_dir(&self) -> std::path::PathBuf {
        let base = crate::file_helpers::normalize_dir_path(&self.data_path);
        crate::file_helpers::join_path(base, "rocksdb")
    }
}

/// RocksDB-specific settings (MEMORY OPTIMIZED DEFAULTS)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbSettings {
    /// Write buffer size per column family in bytes (default: 512KB)
    /// With ~30 column families, write buffers dominate memory usage.
    #[serde(default = "default_rocksdb_write_buffer_size")]
    pub write_buffer_size: usize,

    /// Maximum number of write buffers (default: 2)
    #[serde(default = "default_rocksdb_max_write_buffers")]
    pub max_write_buffers: i32,

    /// Block cache size for reads in bytes (default: 4MB, SHARED across all CFs)
    /// This cache is shared, so adding CFs doesn't multiply memory.
    #[serde(default = "default_rocksdb_block_cache_size")]
    pub block_cache_size: usize,

    /// Maximum number of background jobs (default: 4)
    #[serde(default = "default_rocksdb_max_background_jobs")]
    pub max_background_jobs: i32,

    /// Maximum number of open files RocksDB can keep open (default: 512)
    /// Set to -1 for unlimited. Lower values reduce memory usage but may impact performance.
    #[serde(default = "default_rocksdb_max_open_files")]
    pub max_open_files: i32,

    /// Sync writes to WAL on each write (default: false for performance)
    /// When false, writes are buffered and synced periodically by OS.
    /// Setting to true guarantees durability but reduces write throughput 10-100x.
    #[serde(default = "default_rocksdb_sync_writes")]
    pub sync_writes: bool,

    /// Disable WAL for maximum write performance (default: false)
    /// WARNING: Setting to true means data loss on crash.
    #[serde(default)]
    pub disable_wal: bool,

    /// Compact all column families on startup (default: false)
    /// Reduces SST file count at the cost of startup time.
    #[serde(default = "default_rocksdb_compact_on_startup")]
    pub compact_on_startup: bool,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for all log files (default: "./logs")
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Optional per-target log level overrides.
    /// Configure via a TOML table:
    /// [logging.targets]
    /// rocksdb = "warn"
    /// reqwest = "warn"
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

/// Job queue and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsSettings {
    /// Queue the coordinator claims from (default: "default")
    #[serde(default = "default_jobs_queue")]
    pub queue: String,

    /// Maximum number of concurrently executing jobs (default: 8)
    #[serde(default = "default_jobs_max_concurrent")]
    pub max_concurrent: u32,

    /// Fallback poll interval in milliseconds when no enqueue wakeup arrives (default: 500)
    #[serde(default = "default_jobs_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Worker heartbeat interval in seconds (default: 15)
    #[serde(default = "default_jobs_heartbeat_interval_seconds")]
    pub heartbeat_interval_seconds: u64,

    /// Heartbeat intervals missed before a worker counts as dead (default: 3)
    /// The reaper requeues running jobs owned by dead workers.
    #[serde(default = "default_jobs_stale_after_intervals")]
    pub stale_after_intervals: u32,

    /// Retry budget applied when an enqueue does not set its own (default: 5)
    #[serde(default = "default_jobs_max_attempts")]
    pub default_max_attempts: u32,

    /// Base retry delay in seconds; doubles per attempt (default: 30)
    #[serde(default = "default_jobs_retry_base_delay_seconds")]
    pub retry_base_delay_seconds: u64,

    /// Cap on the exponential retry delay in seconds (default: 3600)
    #[serde(default = "default_jobs_max_retry_delay_seconds")]
    pub max_retry_delay_seconds: u64,

    /// Days terminal jobs are retained before pruning (default: 30)
    #[serde(default = "default_jobs_retention_days")]
    pub retention_days: u32,
}

/// Auto-heal policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoHealSettings {
    /// Enqueue heal jobs for unhealthy pods (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Consecutive failed health checks before a heal job is enqueued (default: 3)
    #[serde(default = "default_auto_heal_failure_threshold")]
    pub failure_threshold: u32,
}

/// Backup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Completed runs kept per policy when the policy doesn't set its own (default: 7)
    #[serde(default = "default_backup_retention_count")]
    pub default_retention_count: u32,
}

/// Usage metering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Seconds between usage samples per active pod (default: 60)
    #[serde(default = "default_metrics_sample_interval_seconds")]
    pub sample_interval_seconds: u64,

    /// Days raw samples are retained; daily rollups are kept indefinitely (default: 14)
    #[serde(default = "default_metrics_sample_retention_days")]
    pub sample_retention_days: u32,
}

/// Audit trail settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Days audit events are retained (default: 365)
    #[serde(default = "default_audit_retention_days")]
    pub retention_days: u32,
}

/// Webhook delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Delivery attempts before a delivery is marked permanently failed (default: 5)
    #[serde(default = "default_webhooks_max_attempts")]
    pub max_attempts: u32,

    /// Base retry delay in seconds; doubles per attempt (default: 60)
    #[serde(default = "default_webhooks_initial_retry_delay_seconds")]
    pub initial_retry_delay_seconds: u64,

    /// Cap on the exponential retry delay in seconds (default: 3600)
    #[serde(default = "default_webhooks_max_retry_delay_seconds")]
    pub max_retry_delay_seconds: u64,

    /// HTTP request timeout in seconds for delivery attempts (default: 10)
    #[serde(default = "default_webhooks_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

/// Background scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Seconds between health check passes over active pods (default: 30)
    #[serde(default = "default_scheduler_health_check_interval_seconds")]
    pub health_check_interval_seconds: u64,

    /// Seconds between reaper passes for stale workers and timed-out jobs (default: 60)
    #[serde(default = "default_scheduler_reaper_interval_seconds")]
    pub reaper_interval_seconds: u64,

    /// UTC hour at which the daily usage rollup runs (default: 0)
    #[serde(default = "default_scheduler_rollup_hour_utc")]
    pub rollup_hour_utc: u32,

    /// Seconds between checks for due backup policies (default: 300)
    #[serde(default = "default_scheduler_backup_check_interval_seconds")]
    pub backup_check_interval_seconds: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            shutdown_drain_timeout_seconds: default_shutdown_drain_timeout(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            rocksdb: RocksDbSettings::default(),
        }
    }
}

impl Default for RocksDbSettings {
    fn default() -> Self {
        Self {
            write_buffer_size: default_rocksdb_write_buffer_size(),
            max_write_buffers: default_rocksdb_max_write_buffers(),
            block_cache_size: default_rocksdb_block_cache_size(),
            max_background_jobs: default_rocksdb_max_background_jobs(),
            max_open_files: default_rocksdb_max_open_files(),
            sync_writes: default_rocksdb_sync_writes(),
            disable_wal: false,
            compact_on_startup: default_rocksdb_compact_on_startup(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            logs_path: default_logs_path(),
            log_to_console: true,
            format: default_log_format(),
            targets: HashMap::new(),
        }
    }
}

impl Default for JobsSettings {
    fn default() -> Self {
        Self {
            queue: default_jobs_queue(),
            max_concurrent: default_jobs_max_concurrent(),
            poll_interval_ms: default_jobs_poll_interval_ms(),
            heartbeat_interval_seconds: default_jobs_heartbeat_interval_seconds(),
            stale_after_intervals: default_jobs_stale_after_intervals(),
            default_max_attempts: default_jobs_max_attempts(),
            retry_base_delay_seconds: default_jobs_retry_base_delay_seconds(),
            max_retry_delay_seconds: default_jobs_max_retry_delay_seconds(),
            retention_days: default_jobs_retention_days(),
        }
    }
}

impl Default for AutoHealSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_auto_heal_failure_threshold(),
        }
    }
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            default_retention_count: default_backup_retention_count(),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            sample_interval_seconds: default_metrics_sample_interval_seconds(),
            sample_retention_days: default_metrics_sample_retention_days(),
        }
    }
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            retention_days: default_audit_retention_days(),
        }
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_webhooks_max_attempts(),
            initial_retry_delay_seconds: default_webhooks_initial_retry_delay_seconds(),
            max_retry_delay_seconds: default_webhooks_max_retry_delay_seconds(),
            request_timeout_seconds: default_webhooks_request_timeout_seconds(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            health_check_interval_seconds: default_scheduler_health_check_interval_seconds(),
            reaper_interval_seconds: default_scheduler_reaper_interval_seconds(),
            rollup_hour_utc: default_scheduler_rollup_hour_utc(),
            backup_check_interval_seconds: default_scheduler_backup_check_interval_seconds(),
        }
    }
}

/// Get default configuration (useful for testing)
impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingSettings::default(),
            jobs: JobsSettings::default(),
            auto_heal: AutoHealSettings::default(),
            backup: BackupSettings::default(),
            metrics: MetricsSettings::default(),
            audit: AuditSettings::default(),
            webhooks: WebhookSettings::default(),
            scheduler: SchedulerSettings::default(),
        }
    }
}
