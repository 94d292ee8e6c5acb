// CloudPods Server
//
// Orchestrator daemon for the compute fleet: job workers plus the
// background scheduler, over a RocksDB-backed store.

mod logging;

use anyhow::Result;
use cloudpods_configs::OrchestratorConfig;
use cloudpods_core::dns::MockDns;
use cloudpods_core::hypervisor::MockHypervisor;
use cloudpods_core::transport::HttpTransport;
use cloudpods_core::{AppContext, Scheduler};
use cloudpods_store::{RocksDBBackend, RocksDbInit, StorageBackend};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Read `--config <path>` from the command line, defaulting to config.toml.
fn config_path(mut args: impl Iterator<Item = String>) -> String {
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return path;
            }
        }
    }
    "config.toml".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration. A missing file is fine; an invalid one is not.
    let path = config_path(std::env::args().skip(1));
    let config = if Path::new(&path).exists() {
        OrchestratorConfig::from_file(&path)?
    } else {
        eprintln!("Warning: {} not found, using defaults", path);
        OrchestratorConfig::default()
    };

    // Initialize logging
    logging::init_logging(
        &config.logging.level,
        &config.logging.logs_path,
        config.logging.log_to_console,
        &config.logging.targets,
        &config.logging.format,
    )?;

    info!(
        "Starting CloudPods orchestrator v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        "Instance '{}', queue '{}'",
        config.server.name, config.jobs.queue
    );

    // Open the store
    let db_dir = config.storage.rocksdb_dir();
    std::fs::create_dir_all(&db_dir)?;
    let db = RocksDbInit::new(db_dir.to_string_lossy(), config.storage.rocksdb.clone()).open()?;
    let backend: Arc<dyn StorageBackend> = Arc::new(RocksDBBackend::new(db));
    info!("RocksDB initialized at {}", db_dir.display());

    // Infrastructure clients. Webhook delivery goes over real HTTP; the
    // hypervisor and DNS seams stay in-process until a fleet backend is
    // wired in.
    let transport = Arc::new(HttpTransport::new(Duration::from_secs(
        config.webhooks.request_timeout_seconds,
    ))?);
    let hypervisor = Arc::new(MockHypervisor::new());
    let dns = Arc::new(MockDns::new());

    let max_concurrent = config.jobs.max_concurrent.max(1) as usize;
    let drain_timeout = Duration::from_secs(config.server.shutdown_drain_timeout_seconds);

    let app_ctx = AppContext::init(backend, config, hypervisor, dns, transport);
    info!("Application context initialized");

    // Job processing loop
    let coordinator = app_ctx.coordinator();
    let runner = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.run_loop(max_concurrent).await })
    };
    info!(
        "Worker {} processing up to {} concurrent job(s)",
        coordinator.worker_id(),
        max_concurrent
    );

    // Background timers: usage sampling, health checks, reaper, backup
    // firing, daily rollup and retention
    let scheduler = Scheduler::new(Arc::clone(&app_ctx));
    scheduler.start().await;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Stop claiming, drain in-flight jobs, then stop the timers
    coordinator.shutdown();
    match tokio::time::timeout(drain_timeout, runner).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => log::error!("Job loop exited with error: {}", e),
        Ok(Err(e)) => log::error!("Job loop task failed: {}", e),
        Err(_) => warn!(
            "In-flight jobs did not drain within {}s; the reaper will reclaim them",
            drain_timeout.as_secs()
        ),
    }
    scheduler.shutdown().await;

    info!("CloudPods orchestrator stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::config_path;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_config_path_default() {
        assert_eq!(config_path(args(&[])), "config.toml");
        assert_eq!(config_path(args(&["--verbose"])), "config.toml");
    }

    #[test]
    fn test_config_path_flag() {
        assert_eq!(
            config_path(args(&["--config", "/etc/cloudpods/prod.toml"])),
            "/etc/cloudpods/prod.toml"
        );
    }

    #[test]
    fn test_config_path_dangling_flag_falls_back() {
        assert_eq!(config_path(args(&["--config"])), "config.toml");
    }
}
