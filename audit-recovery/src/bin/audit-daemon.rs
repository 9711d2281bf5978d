//! Audit daemon binary: ledger plus scheduled backups

use anyhow::Context;
use audit_ledger::Ledger;
use audit_recovery::{BackupScheduler, BackupSystem, DaemonConfig, RecoveryCoordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Saudi AI audit daemon");

    // Load configuration: explicit path, AUDIT_CONFIG, or environment
    let config = match std::env::args().nth(1).or_else(|| std::env::var("AUDIT_CONFIG").ok()) {
        Some(path) => DaemonConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => DaemonConfig::from_env().context("loading configuration from environment")?,
    };

    let ledger = Ledger::open(config.ledger.clone())
        .await
        .context("opening audit ledger")?;
    if let Some(warning) = ledger.load_warning() {
        tracing::warn!(warning = %warning, "Ledger started empty; recover from a recovery point");
    }

    let report = ledger.verify_all()?;
    tracing::info!(
        entries = report.entries_count,
        valid = report.valid,
        integrity_score = report.integrity_score,
        "Startup integrity check finished"
    );

    let layout = config.layout();
    let backups =
        BackupSystem::new(config.backup.clone(), layout.clone())?.with_ledger(ledger.clone());
    let recovery = RecoveryCoordinator::new(config.recovery.clone(), layout, backups.clone())?
        .with_ledger(ledger.clone());
    let status = recovery.get_recovery_status();
    tracing::info!(
        recovery_points = status.available_recovery_points,
        health_score = status.system_health_score,
        "Disaster recovery ready"
    );

    let (mut scheduler, mut outcomes) = BackupScheduler::new(
        backups,
        config.backup.schedule.clone(),
        config.backup.retry.clone(),
    )
    .await?;
    scheduler.start().await?;

    let drain = tokio::spawn(async move {
        while let Some(outcome) = outcomes.recv().await {
            match &outcome.result {
                Ok(summary) => tracing::info!(
                    job = %outcome.job,
                    attempts = outcome.attempts,
                    summary = %summary,
                    "Job outcome"
                ),
                Err(e) => tracing::error!(
                    job = %outcome.job,
                    attempts = outcome.attempts,
                    error = %e,
                    "Job outcome"
                ),
            }
        }
    });

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down audit daemon");
    scheduler.stop().await?;
    drop(scheduler);
    drain.abort();
    ledger.shutdown().await?;
    Ok(())
}
