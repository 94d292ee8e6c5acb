// Default value functions

pub fn default_server_name() -> String {
    "cloudpods".to_string()
}

pub fn default_shutdown_drain_timeout() -> u64 {
    30 // seconds to wait for in-flight jobs during graceful shutdown
}

pub fn default_true() -> bool {
    true
}

pub fn default_data_path() -> String {
    "./data".to_string() // Default dev path; normalized to absolute at runtime
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_log_format() -> String {
    "compact".to_string()
}

pub fn default_logs_path() -> String {
    "./logs".to_string()
}

// RocksDB defaults (MEMORY OPTIMIZED)
pub fn default_rocksdb_write_buffer_size() -> usize {
    512 * 1024 // 512KB per column family; with ~30 CFs write buffers dominate memory
}

pub fn default_rocksdb_max_write_buffers() -> i32 {
    2
}

pub fn default_rocksdb_block_cache_size() -> usize {
    4 * 1024 * 1024 // 4MB, SHARED across all column families
}

pub fn default_rocksdb_max_background_jobs() -> i32 {
    4
}

pub fn default_rocksdb_sync_writes() -> bool {
    false
}

pub fn default_rocksdb_max_open_files() -> i32 {
    512 // Reasonable default that stays under typical OS limits
}

pub fn default_rocksdb_compact_on_startup() -> bool {
    false
}

// Jobs defaults
pub fn default_jobs_queue() -> String {
    "default".to_string()
}

pub fn default_jobs_max_concurrent() -> u32 {
    8 // concurrent job executions per coordinator
}

pub fn default_jobs_poll_interval_ms() -> u64 {
    500 // fallback poll when no enqueue wakeup arrives
}

pub fn default_jobs_heartbeat_interval_seconds() -> u64 {
    15
}

pub fn default_jobs_stale_after_intervals() -> u32 {
    3 // heartbeats missed before a worker counts as dead
}

pub fn default_jobs_max_attempts() -> u32 {
    5
}

pub fn default_jobs_retry_base_delay_seconds() -> u64 {
    30 // doubles per attempt up to max_retry_delay_seconds
}

pub fn default_jobs_max_retry_delay_seconds() -> u64 {
    3600 // 1 hour cap on exponential backoff
}

pub fn default_jobs_retention_days() -> u32 {
    30 // terminal jobs kept this long for audit
}

// Auto-heal defaults
pub fn default_auto_heal_failure_threshold() -> u32 {
    3 // consecutive failed health checks before a heal job is enqueued
}

// Backup defaults
pub fn default_backup_retention_count() -> u32 {
    7 // completed runs kept per policy
}

// Usage metering defaults
pub fn default_metrics_sample_interval_seconds() -> u64 {
    60
}

pub fn default_metrics_sample_retention_days() -> u32 {
    14 // raw samples; daily rollups are kept indefinitely
}

// Audit defaults
pub fn default_audit_retention_days() -> u32 {
    365
}

// Webhook defaults
pub fn default_webhooks_max_attempts() -> u32 {
    5
}

pub fn default_webhooks_initial_retry_delay_seconds() -> u64 {
    60 // doubles per attempt up to max_retry_delay_seconds
}

pub fn default_webhooks_max_retry_delay_seconds() -> u64 {
    3600
}

pub fn default_webhooks_request_timeout_seconds() -> u64 {
    10
}

// Scheduler defaults
pub fn default_scheduler_health_check_interval_seconds() -> u64 {
    30
}

pub fn default_scheduler_reaper_interval_seconds() -> u64 {
    60
}

pub fn default_scheduler_rollup_hour_utc() -> u32 {
    0 // midnight UTC; rolls up the previous day
}

pub fn default_scheduler_backup_check_interval_seconds() -> u64 {
    300 // 5 minutes
}
