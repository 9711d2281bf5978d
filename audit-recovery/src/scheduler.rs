//! Supervised backup scheduler
//!
//! Three cron jobs drive the backup system:
//! - backup every 4 hours (default `0 0 */4 * * *`)
//! - retention cleanup daily at 02:00
//! - monthly archive at 01:00 on the 1st (previous month; previous year in January)
//!
//! Each run goes through a bounded exponential-backoff retry and publishes a
//! [`JobOutcome`] on the outcome channel, so failures are never lost.

use crate::backup::BackupSystem;
use crate::config::{RetryPolicy, ScheduleConfig};
use crate::types::BackupKind;
use crate::{Error, Result};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

const OUTCOME_CHANNEL_CAPACITY: usize = 64;

/// Periodic job kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledJob {
    /// Scheduled backup
    Backup,
    /// Retention sweep
    Cleanup,
    /// Monthly (and in January yearly) archival
    MonthlyArchive,
}

impl fmt::Display for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScheduledJob::Backup => "backup",
            ScheduledJob::Cleanup => "cleanup",
            ScheduledJob::MonthlyArchive => "monthly_archive",
        };
        write!(f, "{}", name)
    }
}

/// Result of one supervised job run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Job kind
    pub job: ScheduledJob,
    /// First attempt start
    pub started_at: DateTime<Utc>,
    /// Last attempt end
    pub finished_at: DateTime<Utc>,
    /// Attempts made
    pub attempts: u32,
    /// Summary on success, last error on failure
    pub result: std::result::Result<String, String>,
}

impl JobOutcome {
    /// Whether the job eventually succeeded
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Cron-driven backup scheduler
pub struct BackupScheduler {
    scheduler: JobScheduler,
    backups: BackupSystem,
    schedule: ScheduleConfig,
    retry: RetryPolicy,
    outcomes: mpsc::Sender<JobOutcome>,
    jobs: Vec<(ScheduledJob, Uuid)>,
}

impl fmt::Debug for BackupScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupScheduler")
            .field("schedule", &self.schedule)
            .field("retry", &self.retry)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

impl BackupScheduler {
    /// Create a scheduler and the receiving end of its outcome channel
    pub async fn new(
        backups: BackupSystem,
        schedule: ScheduleConfig,
        retry: RetryPolicy,
    ) -> Result<(Self, mpsc::Receiver<JobOutcome>)> {
        let scheduler = JobScheduler::new().await?;
        let (outcomes, receiver) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);

        Ok((
            Self {
                scheduler,
                backups,
                schedule,
                retry,
                outcomes,
                jobs: Vec::new(),
            },
            receiver,
        ))
    }

    /// Register the three jobs and start ticking
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting backup scheduler");

        let jobs = [
            (ScheduledJob::Backup, self.schedule.backup_cron.clone()),
            (ScheduledJob::Cleanup, self.schedule.cleanup_cron.clone()),
            (ScheduledJob::MonthlyArchive, self.schedule.archive_cron.clone()),
        ];
        for (kind, cron) in jobs {
            let backups = self.backups.clone();
            let retry = self.retry.clone();
            let outcomes = self.outcomes.clone();

            let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
                let backups = backups.clone();
                let retry = retry.clone();
                let outcomes = outcomes.clone();
                Box::pin(async move {
                    let outcome = run_supervised(&backups, kind, &retry).await;
                    publish(&outcomes, outcome);
                })
            })
            .map_err(|e| Error::Scheduler(format!("invalid {} schedule '{}': {}", kind, cron, e)))?;

            let uuid = self.scheduler.add(job).await?;
            info!(job = %kind, cron = %cron, job_id = %uuid, "Scheduled job registered");
            self.jobs.push((kind, uuid));
        }

        self.scheduler.start().await?;
        self.backups.set_running(true);

        if self.schedule.initial_backup {
            let backups = self.backups.clone();
            let retry = self.retry.clone();
            let outcomes = self.outcomes.clone();
            tokio::spawn(async move {
                let outcome = run_supervised(&backups, ScheduledJob::Backup, &retry).await;
                publish(&outcomes, outcome);
            });
        }

        info!(
            interval_hours = self.schedule.backup_interval_hours,
            "Backup scheduler started"
        );
        Ok(())
    }

    /// Stop ticking. A run already in progress finishes on its own.
    pub async fn stop(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        self.backups.set_running(false);
        info!("Backup scheduler stopped");
        Ok(())
    }

    /// Run a job immediately under the same supervision as a cron tick
    pub async fn run_now(&self, job: ScheduledJob) -> JobOutcome {
        let outcome = run_supervised(&self.backups, job, &self.retry).await;
        publish(&self.outcomes, outcome.clone());
        outcome
    }

    /// Next cron tick of a registered job
    pub async fn next_tick(&mut self, job: ScheduledJob) -> Result<Option<DateTime<Utc>>> {
        let uuid = self
            .jobs
            .iter()
            .find(|(kind, _)| *kind == job)
            .map(|(_, uuid)| *uuid)
            .ok_or_else(|| Error::Scheduler(format!("{} job is not registered", job)))?;
        Ok(self.scheduler.next_tick_for_job(uuid).await?)
    }
}

/// Run `job` with bounded retries and exponential backoff
pub async fn run_supervised(
    backups: &BackupSystem,
    job: ScheduledJob,
    retry: &RetryPolicy,
) -> JobOutcome {
    let started_at = Utc::now();
    let mut policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(retry.initial_backoff_ms))
        .with_max_interval(Duration::from_millis(retry.max_backoff_ms))
        .with_max_elapsed_time(None)
        .build();
    let max_attempts = retry.max_attempts.max(1);

    let mut attempts = 0;
    let result = loop {
        attempts += 1;
        match run_job(backups, job, Utc::now()).await {
            Ok(summary) => break Ok(summary),
            Err(e) if attempts >= max_attempts => break Err(e.to_string()),
            Err(e) => {
                let delay = policy
                    .next_backoff()
                    .unwrap_or_else(|| Duration::from_millis(retry.max_backoff_ms));
                warn!(
                    job = %job,
                    attempt = attempts,
                    max_attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Scheduled job failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    };

    let outcome = JobOutcome {
        job,
        started_at,
        finished_at: Utc::now(),
        attempts,
        result,
    };
    match &outcome.result {
        Ok(summary) => info!(job = %job, attempts, summary = %summary, "Scheduled job succeeded"),
        Err(e) => error!(job = %job, attempts, error = %e, "Scheduled job failed after retries"),
    }
    outcome
}

async fn run_job(backups: &BackupSystem, job: ScheduledJob, now: DateTime<Utc>) -> Result<String> {
    match job {
        ScheduledJob::Backup => {
            let manifest = backups.create_backup(BackupKind::Scheduled).await?;
            Ok(format!(
                "{} ({} files)",
                manifest.backup_id,
                manifest.artifacts.len()
            ))
        }
        ScheduledJob::Cleanup => {
            let report = backups.cleanup_old_backups(now).await?;
            if !report.failures.is_empty() {
                return Err(Error::Other(format!(
                    "could not remove {}",
                    report.failures.join(", ")
                )));
            }
            Ok(format!("{} expired backups removed", report.removed()))
        }
        ScheduledJob::MonthlyArchive => {
            let (year, month) = previous_month(now);
            let monthly = backups.create_monthly_archive(year, month).await?;
            let mut summary = format!(
                "{} backups archived for {:04}-{:02}",
                monthly.backups_archived.len(),
                year,
                month
            );
            if now.month() == 1 {
                let yearly = backups.create_yearly_archive(now.year() - 1).await?;
                summary.push_str(&format!(
                    ", {} added to {}",
                    yearly.backups_archived.len(),
                    yearly.archive_path.display()
                ));
            }
            Ok(summary)
        }
    }
}

fn publish(outcomes: &mpsc::Sender<JobOutcome>, outcome: JobOutcome) {
    if let Err(e) = outcomes.try_send(outcome) {
        warn!(error = %e, "Job outcome dropped");
    }
}

/// Year and month preceding `now`
fn previous_month(now: DateTime<Utc>) -> (i32, u32) {
    if now.month() == 1 {
        (now.year() - 1, 12)
    } else {
        (now.year(), now.month() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackupConfig, DataLayout};
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn backup_system(dir: &TempDir) -> BackupSystem {
        let layout = DataLayout {
            data_dir: dir.path().join("audit_data"),
            chain_file: "audit_chain.json.gz".to_string(),
            config_root: dir.path().to_path_buf(),
            genesis_hash: audit_ledger::GENESIS_HASH.to_string(),
        };
        fs::create_dir_all(&layout.data_dir).unwrap();
        let config = BackupConfig {
            backup_dir: dir.path().join("backup_storage"),
            ..Default::default()
        };
        BackupSystem::new(config, layout).unwrap()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        }
    }

    #[test]
    fn test_previous_month() {
        let march = Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap();
        assert_eq!(previous_month(march), (2024, 2));

        let january = Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).unwrap();
        assert_eq!(previous_month(january), (2024, 12));
    }

    #[tokio::test]
    async fn test_supervised_success_first_attempt() {
        let dir = TempDir::new().unwrap();
        let backups = backup_system(&dir);

        let outcome = run_supervised(&backups, ScheduledJob::Backup, &fast_retry()).await;
        assert!(outcome.succeeded(), "{:?}", outcome.result);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(backups.list_backups().len(), 1);
    }

    #[tokio::test]
    async fn test_supervised_gives_up_after_max_attempts() {
        let dir = TempDir::new().unwrap();
        let backups = backup_system(&dir);
        // Replace the daily tier with a file so every attempt fails
        let daily = dir.path().join("backup_storage/daily");
        fs::remove_dir_all(&daily).unwrap();
        fs::write(&daily, b"blocked").unwrap();

        let outcome = run_supervised(&backups, ScheduledJob::Backup, &fast_retry()).await;
        assert!(!outcome.succeeded());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(backups.status().recent_errors.len(), 3);
    }

    #[tokio::test]
    async fn test_run_now_publishes_outcome() {
        let dir = TempDir::new().unwrap();
        let backups = backup_system(&dir);
        let (scheduler, mut outcomes) =
            BackupScheduler::new(backups, ScheduleConfig::default(), fast_retry())
                .await
                .unwrap();

        let outcome = scheduler.run_now(ScheduledJob::Cleanup).await;
        assert!(outcome.succeeded());

        let published = outcomes.recv().await.unwrap();
        assert_eq!(published.job, ScheduledJob::Cleanup);
        assert_eq!(published, outcome);
    }

    #[tokio::test]
    async fn test_start_runs_initial_backup() {
        let dir = TempDir::new().unwrap();
        let backups = backup_system(&dir);
        let (mut scheduler, mut outcomes) =
            BackupScheduler::new(backups.clone(), ScheduleConfig::default(), fast_retry())
                .await
                .unwrap();

        scheduler.start().await.unwrap();
        assert!(backups.status().is_running);

        let outcome = tokio::time::timeout(Duration::from_secs(30), outcomes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.job, ScheduledJob::Backup);
        assert!(outcome.succeeded());
        assert!(scheduler.next_tick(ScheduledJob::Cleanup).await.is_ok());

        scheduler.stop().await.unwrap();
        assert!(!backups.status().is_running);
    }

    #[tokio::test]
    async fn test_invalid_cron_is_rejected() {
        let dir = TempDir::new().unwrap();
        let schedule = ScheduleConfig {
            backup_cron: "every four hours".to_string(),
            ..Default::default()
        };
        let (mut scheduler, _outcomes) =
            BackupScheduler::new(backup_system(&dir), schedule, fast_retry())
                .await
                .unwrap();

        let err = scheduler.start().await.unwrap_err();
        assert!(matches!(err, Error::Scheduler(_)));
    }
}
