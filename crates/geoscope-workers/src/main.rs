//! geoscope audit worker service.
//!
//! Loads configuration from the environment, starts the job manager, and
//! runs until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use geoscope_persistence::InMemoryAuditStore;
use geoscope_pipeline::Orchestrator;
use geoscope_types::AppConfig;
use geoscope_workers::{JobManager, ManagerOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How long in-flight audits get to finish on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;
    info!(
        workers = config.worker_pool_size,
        crawl_cap_default = config.crawl_cap_default,
        llm_configured = config.llm_primary.is_some(),
        perf_oracle = config.perf_oracle_url.is_some(),
        search_oracle = config.search_oracle_url.is_some(),
        "geoscope worker service starting"
    );

    let store = Arc::new(InMemoryAuditStore::new());
    let orchestrator =
        Arc::new(Orchestrator::new(config.clone(), store).context("building orchestrator")?);
    let manager = Arc::new(JobManager::new(
        ManagerOptions::from_config(&config),
        orchestrator,
    ));
    manager.start();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("interrupt received");
    manager.shutdown(SHUTDOWN_GRACE).await;

    let stats = manager.stats();
    info!(
        completed = stats.jobs_completed,
        failed = stats.jobs_failed,
        retried = stats.jobs_retried,
        "final job counters"
    );
    Ok(())
}
