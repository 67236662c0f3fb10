//! maintenance-worker: keeps metric stream partitions provisioned and rotated.
//!
//! Connects to PostgreSQL, runs an immediate maintenance pass, then keeps
//! provisioning today's and tomorrow's partitions and rotating expired ones
//! until SIGINT / SIGTERM. Alarm evaluation runs elsewhere, so the alarm
//! cadence drives a source that never reports anything due.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use metronome_core::config::{load_dotenv, Config};
use metronome_scheduler::{Maintenance, NoAlarms, Scheduler};
use metronome_storage::{PartitionStore, PgStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Partition maintenance worker for the metrics store.
#[derive(Parser, Debug)]
#[command(name = "maintenance-worker", version, about)]
struct Cli {
    /// Alarm-check interval in seconds (overrides config).
    #[arg(long)]
    alarm_interval: Option<u64>,

    /// Maintenance interval in seconds (overrides config).
    #[arg(long)]
    maintenance_interval: Option<u64>,

    /// Retention window in hours (overrides config).
    #[arg(long)]
    rotate_after_hours: Option<u64>,

    /// Run a single maintenance pass and exit.
    #[arg(long)]
    once: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(secs) = cli.alarm_interval {
        config.scheduler.alarm_interval_secs = secs;
    }
    if let Some(secs) = cli.maintenance_interval {
        config.scheduler.maintenance_interval_secs = secs;
    }
    if let Some(hours) = cli.rotate_after_hours {
        config.scheduler.rotate_after_hours = hours;
    }
    config.log_summary();

    if !config.postgres.is_configured() {
        anyhow::bail!("PG_USERNAME is not set; refusing to start without a database");
    }

    let store: Arc<dyn PartitionStore> = Arc::new(PgStore::connect(&config.postgres).await?);
    let maintenance = Maintenance::from_config(store, &config)?;

    if cli.once {
        let outcome = maintenance.run_pass(chrono::Utc::now()).await?;
        info!(
            created = outcome.created.len(),
            rotated = outcome.rotated.len(),
            failed = outcome.rotation_failures.len(),
            "single maintenance pass finished"
        );
        return Ok(());
    }

    let handle = Scheduler::new(maintenance, Arc::new(NoAlarms))
        .with_max_concurrent_checks(config.scheduler.max_concurrent_checks)
        .start(config.scheduler.alarm_interval(), config.scheduler.maintenance_interval())
        .await?;

    info!("maintenance-worker running");
    os_signal().await;
    info!("shutdown signal received");

    let metrics = handle.metrics();
    match tokio::time::timeout(Duration::from_secs(10), handle.shutdown()).await {
        Ok(()) => info!("scheduler stopped gracefully"),
        Err(_) => tracing::warn!("scheduler shutdown timed out, forcing exit"),
    }
    info!(
        maintenance_passes = metrics.maintenance_passes,
        partitions_created = metrics.partitions_created,
        partitions_rotated = metrics.partitions_rotated,
        "maintenance-worker exited cleanly"
    );
    Ok(())
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (cross-platform fallback).
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
