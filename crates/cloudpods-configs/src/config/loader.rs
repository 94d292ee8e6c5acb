use super::types::OrchestratorConfig;
use crate::file_helpers::normalize_dir_path;
use std::fs;
use std::path::Path;

impl OrchestratorConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let mut config: OrchestratorConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        config.finalize()?;

        Ok(config)
    }

    /// Normalize directory-like paths to absolute paths for consistent runtime behavior.
    ///
    /// Relative paths stay relative to the current working dir, but resolving
    /// them once here avoids each subsystem re-implementing path handling.
    fn normalize_paths(&mut self) {
        self.storage.data_path = normalize_dir_path(&self.storage.data_path);
        self.logging.logs_path = normalize_dir_path(&self.logging.logs_path);
    }

    /// Normalize local filesystem paths and validate configuration.
    pub fn finalize(&mut self) -> anyhow::Result<()> {
        self.normalize_paths();

        self.validate()?;

        Ok(())
    }

    /// Validate configuration settings
    pub fn validate(&self) -> anyhow::Result<()> {
        // Validate log level
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        // Validate log format
        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        // Validate per-target log levels if provided
        for (target, level) in &self.logging.targets {
            if !valid_levels.contains(&level.as_str()) {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}' for target '{}'. Must be one of: {}",
                    level,
                    target,
                    valid_levels.join(", ")
                ));
            }
        }

        // Validate job settings
        if self.jobs.queue.trim().is_empty() {
            return Err(anyhow::anyhow!("jobs.queue cannot be empty"));
        }

        if self.jobs.max_concurrent == 0 {
            return Err(anyhow::anyhow!("jobs.max_concurrent cannot be 0"));
        }

        if self.jobs.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("jobs.poll_interval_ms cannot be 0"));
        }

        if self.jobs.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("jobs.heartbeat_interval_seconds cannot be 0"));
        }

        if self.jobs.stale_after_intervals == 0 {
            return Err(anyhow::anyhow!("jobs.stale_after_intervals cannot be 0"));
        }

        if self.jobs.default_max_attempts == 0 {
            return Err(anyhow::anyhow!("jobs.default_max_attempts cannot be 0"));
        }

        if self.jobs.retry_base_delay_seconds == 0 {
            return Err(anyhow::anyhow!("jobs.retry_base_delay_seconds cannot be 0"));
        }

        if self.jobs.max_retry_delay_seconds < self.jobs.retry_base_delay_seconds {
            return Err(anyhow::anyhow!(
                "jobs.max_retry_delay_seconds ({}) cannot be below jobs.retry_base_delay_seconds ({})",
                self.jobs.max_retry_delay_seconds,
                self.jobs.retry_base_delay_seconds
            ));
        }

        // Validate auto-heal settings
        if self.auto_heal.failure_threshold == 0 {
            return Err(anyhow::anyhow!("auto_heal.failure_threshold cannot be 0"));
        }

        // Validate backup settings
        if self.backup.default_retention_count == 0 {
            return Err(anyhow::anyhow!("backup.default_retention_count cannot be 0"));
        }

        // Validate metering settings
        if self.metrics.sample_interval_seconds == 0 {
            return Err(anyhow::anyhow!("metrics.sample_interval_seconds cannot be 0"));
        }

        // Validate webhook settings
        if self.webhooks.max_attempts == 0 {
            return Err(anyhow::anyhow!("webhooks.max_attempts cannot be 0"));
        }

        if self.webhooks.initial_retry_delay_seconds == 0 {
            return Err(anyhow::anyhow!("webhooks.initial_retry_delay_seconds cannot be 0"));
        }

        if self.webhooks.max_retry_delay_seconds < self.webhooks.initial_retry_delay_seconds {
            return Err(anyhow::anyhow!(
                "webhooks.max_retry_delay_seconds ({}) cannot be below webhooks.initial_retry_delay_seconds ({})",
                self.webhooks.max_retry_delay_seconds,
                self.webhooks.initial_retry_delay_seconds
            ));
        }

        if self.webhooks.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("webhooks.request_timeout_seconds cannot be 0"));
        }

        // Validate scheduler settings
        if self.scheduler.health_check_interval_seconds == 0 {
            return Err(anyhow::anyhow!("scheduler.health_check_interval_seconds cannot be 0"));
        }

        if self.scheduler.reaper_interval_seconds == 0 {
            return Err(anyhow::anyhow!("scheduler.reaper_interval_seconds cannot be 0"));
        }

        if self.scheduler.backup_check_interval_seconds == 0 {
            return Err(anyhow::anyhow!("scheduler.backup_check_interval_seconds cannot be 0"));
        }

        if self.scheduler.rollup_hour_utc > 23 {
            return Err(anyhow::anyhow!(
                "scheduler.rollup_hour_utc ({}) must be between 0 and 23",
                self.scheduler.rollup_hour_utc
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = OrchestratorConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = OrchestratorConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_max_concurrent() {
        let mut config = OrchestratorConfig::default();
        config.jobs.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_webhook_attempts() {
        let mut config = OrchestratorConfig::default();
        config.webhooks.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_cap_below_base() {
        let mut config = OrchestratorConfig::default();
        config.jobs.retry_base_delay_seconds = 120;
        config.jobs.max_retry_delay_seconds = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_rollup_hour() {
        let mut config = OrchestratorConfig::default();
        config.scheduler.rollup_hour_utc = 24;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [jobs]
            max_concurrent = 4

            [webhooks]
            max_attempts = 3
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.jobs.max_concurrent, 4);
        assert_eq!(config.webhooks.max_attempts, 3);
        assert_eq!(config.jobs.queue, "default");
        assert_eq!(config.scheduler.rollup_hour_utc, 0);
        assert!(config.validate().is_ok());
    }
}
