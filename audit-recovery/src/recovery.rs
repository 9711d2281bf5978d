//! Disaster recovery coordinator
//!
//! Point-in-time recovery layered on the backup system. A recovery point is a
//! directory under `recovery_points/` holding:
//!
//! - `audit_chain_backup.json.gz` copy of the chain file
//! - `config/` configuration files
//! - `user_data/` user data directories
//! - `recovery_metadata.json` metadata and combined checksum
//!
//! Recovery is single-flight: a second call while one runs fails with
//! [`Error::RecoveryInProgress`]. Steps run in order and stop at the first
//! failure. Nothing is rolled back automatically; the pre-recovery backup
//! taken in step 1 is the manual rollback path.
//!
//! With a ledger attached, its appends are suspended for the whole recovery
//! and the restored chain is installed through the ledger's writer, so an
//! append can neither slip past the pre-recovery backup nor overwrite the
//! restored chain afterwards.

use crate::backup::BackupSystem;
use crate::checks::{run_checks, CheckTarget};
use crate::config::{DataLayout, RecoveryConfig};
use crate::fsutil;
use crate::types::{
    BackupKind, BackupState, CheckResult, PointIntegrity, RecoveryPoint, RecoveryPointSummary,
    RecoveryRecord, RecoveryStatus, RecoveryStep, RecoveryTestReport, SnapshotContents,
    StepResult, SystemState, VerificationMode, VerificationReport, RECOVERY_METADATA_FILE,
};
use crate::{Error, Result};
use audit_ledger::chain::retention_deadline;
use audit_ledger::storage::{read_chain_file, write_chain_file};
use audit_ledger::{Ledger, LedgerEntry};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

const POINTS_DIR: &str = "recovery_points";
const LOGS_DIR: &str = "recovery_logs";
const TEST_POINTS_DIR: &str = "test_points";
const POINT_CHAIN_FILE: &str = "audit_chain_backup.json.gz";
const POINT_CONFIG_DIR: &str = "config";
const POINT_USER_DATA_DIR: &str = "user_data";
const POINT_PREFIX: &str = "RP_";
const HEALTHY_POINT_COUNT: f64 = 5.0;

/// One day of the recovery audit trail
#[derive(Debug, Serialize, Deserialize)]
struct RecoveryLog {
    date: NaiveDate,
    daily_log: Vec<RecoveryRecord>,
}

#[derive(Debug)]
struct Inner {
    config: RecoveryConfig,
    layout: DataLayout,
    backups: BackupSystem,
    in_progress: AtomicBool,
    history: Mutex<Vec<RecoveryRecord>>,
    last_test: Mutex<Option<RecoveryTestReport>>,
}

/// Chain read from a recovery point, cut to the target time
#[derive(Debug)]
struct PreparedChain {
    source: PathBuf,
    entries: Vec<LedgerEntry>,
    truncated: usize,
}

/// Releases the single-flight flag when dropped
struct InProgressGuard<'a>(&'a AtomicBool);

impl<'a> InProgressGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Disaster recovery coordinator
#[derive(Debug, Clone)]
pub struct RecoveryCoordinator {
    inner: Arc<Inner>,
    ledger: Option<Ledger>,
}

impl RecoveryCoordinator {
    /// Create the recovery directories
    pub fn new(config: RecoveryConfig, layout: DataLayout, backups: BackupSystem) -> Result<Self> {
        for dir in [POINTS_DIR, LOGS_DIR, TEST_POINTS_DIR] {
            fs::create_dir_all(config.recovery_dir.join(dir))?;
        }

        info!(
            recovery_dir = %config.recovery_dir.display(),
            rto_hours = config.max_recovery_hours,
            "Disaster recovery initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                layout,
                backups,
                in_progress: AtomicBool::new(false),
                history: Mutex::new(Vec::new()),
                last_test: Mutex::new(None),
            }),
            ledger: None,
        })
    }

    /// Suspend this ledger's appends during recovery, install restored
    /// chains through it, and clear its quarantine once the restored chain
    /// verifies
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Snapshot the chain file, configuration and user data
    pub async fn create_recovery_point(&self, description: &str) -> Result<RecoveryPoint> {
        let inner = Arc::clone(&self.inner);
        let description = description.to_string();
        tokio::task::spawn_blocking(move || {
            let parent = inner.points_dir();
            inner.create_point(&parent, &description)
        })
        .await?
    }

    /// Recovery points, newest first
    pub fn list_recovery_points(&self) -> Vec<RecoveryPointSummary> {
        self.inner.list_points()
    }

    /// Check a recovery point's checksum and required files
    pub fn verify_recovery_point(&self, recovery_point_id: &str) -> Result<PointIntegrity> {
        let dir = self.inner.point_dir(recovery_point_id)?;
        verify_point(&dir)
    }

    /// Whether a recovery is running
    pub fn is_recovery_in_progress(&self) -> bool {
        self.inner.in_progress.load(Ordering::Acquire)
    }

    /// Recover from a recovery point, optionally truncating the chain to
    /// entries at or before `target_time`
    pub async fn perform_recovery(
        &self,
        recovery_point_id: &str,
        target_time: Option<DateTime<Utc>>,
        mode: VerificationMode,
    ) -> Result<RecoveryRecord> {
        let _guard =
            InProgressGuard::acquire(&self.inner.in_progress).ok_or(Error::RecoveryInProgress)?;
        let point_dir = self.inner.point_dir(recovery_point_id)?;
        let _suspension = match &self.ledger {
            Some(ledger) => Some(
                ledger
                    .suspend_writes(format!("recovery from {}", recovery_point_id))
                    .await?,
            ),
            None => None,
        };

        let started_at = Utc::now();
        let started = Instant::now();
        let recovery_id = format!("REC_{}", started_at.format("%Y%m%d_%H%M%S_%6f"));
        info!(
            recovery_id = %recovery_id,
            recovery_point = %recovery_point_id,
            target_time = ?target_time,
            ?mode,
            "Starting disaster recovery"
        );

        let mut record = RecoveryRecord {
            recovery_id: recovery_id.clone(),
            recovery_point_id: recovery_point_id.to_string(),
            started_at,
            finished_at: started_at,
            duration_seconds: 0.0,
            sla_compliant: true,
            target_time,
            verification_mode: mode,
            steps: Vec::new(),
            verification: None,
            pre_recovery_backup: None,
            truncated_entries: 0,
            success: false,
            error: None,
        };

        let outcome = self
            .run_steps(&mut record, &point_dir, target_time, mode)
            .await;

        let duration_seconds = started.elapsed().as_secs_f64();
        let rto_seconds = f64::from(self.inner.config.max_recovery_hours) * 3600.0;
        record.finished_at = Utc::now();
        record.duration_seconds = duration_seconds;
        record.sla_compliant = duration_seconds <= rto_seconds;
        if !record.sla_compliant {
            warn!(
                recovery_id = %recovery_id,
                duration_seconds,
                rto_hours = self.inner.config.max_recovery_hours,
                "Recovery exceeded recovery time objective"
            );
        }

        match &outcome {
            Ok(()) => {
                record.success = true;
                info!(
                    recovery_id = %recovery_id,
                    duration_seconds,
                    sla_compliant = record.sla_compliant,
                    truncated_entries = record.truncated_entries,
                    "Disaster recovery completed"
                );
            }
            Err((step, reason)) => {
                record.error = Some(format!("{}: {}", step, reason));
                error!(
                    recovery_id = %recovery_id,
                    step = %step,
                    error = %reason,
                    "Disaster recovery failed"
                );
            }
        }

        self.inner.log_recovery(&record);

        match outcome {
            Ok(()) => Ok(record),
            Err((step, reason)) => Err(Error::RecoveryStepFailure {
                recovery_id,
                step: step.to_string(),
                reason,
            }),
        }
    }

    async fn run_steps(
        &self,
        record: &mut RecoveryRecord,
        point_dir: &Path,
        target_time: Option<DateTime<Utc>>,
        mode: VerificationMode,
    ) -> std::result::Result<(), (RecoveryStep, String)> {
        // 1. Pre-recovery backup
        let step = RecoveryStep::PreRecoveryBackup;
        let result = self
            .inner
            .backups
            .create_backup(BackupKind::PreRecovery)
            .await
            .map(|manifest| {
                record.pre_recovery_backup = Some(manifest.backup_id.clone());
                manifest.backup_id
            });
        finish_step(record, step, result)?;

        // 2. Recovery point integrity
        let step = RecoveryStep::VerifyRecoveryPoint;
        let dir = point_dir.to_path_buf();
        let result = blocking(move || {
            let integrity = verify_point(&dir)?;
            if integrity.valid {
                Ok(format!("checksum {}", integrity.current_checksum))
            } else {
                Err(Error::IntegrityCheckFailed {
                    id: name_of(&dir),
                    reason: format!(
                        "checksum match: {}, missing: [{}]",
                        integrity.checksum_match,
                        integrity.missing_files.join(", ")
                    ),
                })
            }
        })
        .await;
        finish_step(record, step, result)?;

        // 3. Chain file
        let step = RecoveryStep::RestoreChain;
        let inner = Arc::clone(&self.inner);
        let dir = point_dir.to_path_buf();
        let result = match blocking(move || inner.prepare_chain(&dir, target_time)).await {
            Ok(prepared) => {
                record.truncated_entries = prepared.truncated;
                self.install_chain(prepared).await
            }
            Err(e) => Err(e),
        };
        finish_step(record, step, result)?;

        // 4. Configuration
        let step = RecoveryStep::RestoreConfig;
        let inner = Arc::clone(&self.inner);
        let dir = point_dir.to_path_buf();
        let result = blocking(move || inner.restore_config(&dir))
            .await
            .map(|n| format!("{} configuration files restored", n));
        finish_step(record, step, result)?;

        // 5. User data
        let step = RecoveryStep::RestoreUserData;
        let inner = Arc::clone(&self.inner);
        let dir = point_dir.to_path_buf();
        let result = blocking(move || inner.restore_user_data(&dir))
            .await
            .map(|n| format!("{} user data entries restored", n));
        finish_step(record, step, result)?;

        // 6. Post-recovery verification
        let step = RecoveryStep::Verification;
        let target = self.inner.live_check_target();
        let verification = blocking(move || Ok(run_checks(&target, mode))).await;
        let result = match verification {
            Ok(report) => {
                let outcome = verification_outcome(&report);
                record.verification = Some(report);
                match outcome {
                    Ok(summary) => self
                        .clear_ledger_quarantine(&record.recovery_id)
                        .map(|_| summary),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };
        finish_step(record, step, result)?;

        Ok(())
    }

    async fn install_chain(&self, prepared: PreparedChain) -> Result<String> {
        let truncated = prepared.truncated;
        match &self.ledger {
            Some(ledger) => {
                let n = ledger.restore(prepared.entries).await?;
                Ok(format!(
                    "chain restored through the ledger, {} entries, {} truncated",
                    n, truncated
                ))
            }
            None => {
                let inner = Arc::clone(&self.inner);
                let n = blocking(move || inner.write_live_chain(&prepared)).await?;
                Ok(format!("chain restored, {} entries, {} truncated", n, truncated))
            }
        }
    }

    fn clear_ledger_quarantine(&self, recovery_id: &str) -> Result<()> {
        if let Some(ledger) = &self.ledger {
            if !ledger.health().is_healthy() {
                ledger.clear_quarantine(recovery_id)?;
            }
        }
        Ok(())
    }

    /// Non-destructive drill: builds a test point, checks it, and runs the
    /// full verification suite against a scratch copy
    pub async fn test_recovery_procedures(&self) -> Result<RecoveryTestReport> {
        let inner = Arc::clone(&self.inner);
        let report = tokio::task::spawn_blocking(move || inner.run_drill()).await?;
        *self.inner.last_test.lock() = Some(report.clone());
        Ok(report)
    }

    /// Snapshot of the recovery subsystem
    pub fn get_recovery_status(&self) -> RecoveryStatus {
        let points = self.inner.list_points();
        let backup_status = self.inner.backups.status();
        let last_recovery_test = self.inner.last_test.lock().clone();

        let backup_factor = if backup_status.status == BackupState::Completed {
            1.0
        } else {
            0.5
        };
        let points_factor = (points.len() as f64 / HEALTHY_POINT_COUNT).min(1.0);
        let test_factor = match &last_recovery_test {
            Some(test) if test.overall_success => 1.0,
            _ => 0.0,
        };

        RecoveryStatus {
            recovery_in_progress: self.is_recovery_in_progress(),
            available_recovery_points: points.len(),
            latest_recovery_point: points.first().cloned(),
            backup_status,
            last_recovery_test,
            recent_recoveries: self.inner.history.lock().len(),
            system_health_score: (backup_factor + points_factor + test_factor) / 3.0,
            max_recovery_hours: self.inner.config.max_recovery_hours,
            retention_years: self.inner.config.retention_years,
        }
    }

    /// Recovery attempts since start, oldest first
    pub fn recovery_history(&self) -> Vec<RecoveryRecord> {
        self.inner.history.lock().clone()
    }
}

impl Inner {
    fn points_dir(&self) -> PathBuf {
        self.config.recovery_dir.join(POINTS_DIR)
    }

    fn point_dir(&self, id: &str) -> Result<PathBuf> {
        let dir = self.points_dir().join(id);
        if dir.join(RECOVERY_METADATA_FILE).is_file() {
            Ok(dir)
        } else {
            Err(Error::RecoveryPointNotFound(id.to_string()))
        }
    }

    fn live_check_target(&self) -> CheckTarget {
        CheckTarget {
            chain_path: self.layout.chain_path(),
            config_root: self.layout.config_root.clone(),
            essential_config_files: self.config.essential_config_files.clone(),
            genesis_hash: self.layout.genesis_hash.clone(),
            retention_years: self.config.retention_years,
            max_verification_ms: self.config.max_verification_ms,
        }
    }

    fn create_point(&self, parent: &Path, description: &str) -> Result<RecoveryPoint> {
        let chain = self.layout.chain_path();
        if !chain.is_file() {
            return Err(Error::Other(format!(
                "cannot create recovery point without a chain file at {}",
                chain.display()
            )));
        }

        let created_at = Utc::now();
        let (id, dir) = allocate_point_dir(parent, created_at)?;

        let chain_bytes = fsutil::atomic_copy(&chain, &dir.join(POINT_CHAIN_FILE))?;
        let chain_entries = read_chain_file(&dir.join(POINT_CHAIN_FILE))?.len();

        let mut config_files = Vec::new();
        for name in &self.config.config_files {
            let src = self.layout.config_root.join(name);
            if src.is_file() {
                fsutil::copy_path(&src, &dir.join(POINT_CONFIG_DIR).join(name))?;
                config_files.push(name.clone());
            }
        }
        fs::create_dir_all(dir.join(POINT_CONFIG_DIR))?;

        let mut user_data = Vec::new();
        for name in &self.config.user_data_dirs {
            let src = self.layout.data_dir.join(name);
            if src.exists() {
                fsutil::copy_path(&src, &dir.join(POINT_USER_DATA_DIR).join(name))?;
                user_data.push(name.clone());
            }
        }
        fs::create_dir_all(dir.join(POINT_USER_DATA_DIR))?;

        let mut point = RecoveryPoint {
            recovery_point_id: id.clone(),
            created_at,
            description: description.to_string(),
            system_state: SystemState {
                captured_at: created_at,
                data_dir: self.layout.data_dir.clone(),
                chain_entries,
                disk_usage_bytes: fsutil::dir_size(&self.layout.data_dir),
                platform_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            contents: SnapshotContents {
                chain_bytes,
                config_files,
                user_data,
            },
            retention_until: retention_deadline(created_at, self.config.retention_years)
                .ok_or_else(|| Error::Other("retention period overflows".to_string()))?,
            checksum: None,
        };

        let metadata_path = dir.join(RECOVERY_METADATA_FILE);
        fsutil::write_json_atomic(&metadata_path, &point)?;
        point.checksum = Some(fsutil::tree_checksum(&dir, &[RECOVERY_METADATA_FILE])?);
        fsutil::write_json_atomic(&metadata_path, &point)?;

        info!(
            recovery_point = %id,
            chain_entries,
            config_files = point.contents.config_files.len(),
            user_data = point.contents.user_data.len(),
            "Recovery point created"
        );
        Ok(point)
    }

    fn list_points(&self) -> Vec<RecoveryPointSummary> {
        let Ok(entries) = fs::read_dir(self.points_dir()) else {
            return Vec::new();
        };

        let mut points: Vec<RecoveryPointSummary> = entries
            .flatten()
            .filter(|e| e.file_type().map_or(false, |t| t.is_dir()))
            .filter_map(|e| {
                let dir = e.path();
                let point: RecoveryPoint =
                    fsutil::read_json(&dir.join(RECOVERY_METADATA_FILE)).ok()?;
                Some(RecoveryPointSummary {
                    id: point.recovery_point_id,
                    created_at: point.created_at,
                    description: point.description,
                    size_bytes: fsutil::dir_size(&dir),
                })
            })
            .collect();
        points.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        points
    }

    /// Save the live chain aside, then read the point's chain and cut it to
    /// entries at or before `target_time`
    fn prepare_chain(
        &self,
        point_dir: &Path,
        target_time: Option<DateTime<Utc>>,
    ) -> Result<PreparedChain> {
        let live = self.layout.chain_path();
        if live.is_file() {
            let saved = self.layout.data_dir.join(format!(
                "audit_chain_pre_recovery_{}.json.gz",
                Utc::now().format("%Y%m%d_%H%M%S")
            ));
            fsutil::atomic_copy(&live, &saved)?;
            info!(saved = %saved.display(), "Current chain saved before restore");
        }

        let source = point_dir.join(POINT_CHAIN_FILE);
        let mut entries = read_chain_file(&source)?;
        let keep = match target_time {
            Some(target) => entries.iter().take_while(|e| e.timestamp <= target).count(),
            None => entries.len(),
        };
        let truncated = entries.len() - keep;
        if truncated > 0 {
            entries.truncate(keep);
            warn!(
                target_time = ?target_time,
                kept = keep,
                removed = truncated,
                "Chain truncated to target time"
            );
        }

        Ok(PreparedChain {
            source,
            entries,
            truncated,
        })
    }

    /// Install a prepared chain as the live chain file when no ledger owns it
    fn write_live_chain(&self, prepared: &PreparedChain) -> Result<usize> {
        let live = self.layout.chain_path();
        if prepared.truncated == 0 {
            fsutil::atomic_copy(&prepared.source, &live)?;
        } else {
            write_chain_file(&live, &prepared.entries)?;
        }
        Ok(prepared.entries.len())
    }

    fn restore_config(&self, point_dir: &Path) -> Result<usize> {
        let source = point_dir.join(POINT_CONFIG_DIR);
        let mut restored = 0;
        for path in fsutil::list_files(&source) {
            let name = fsutil::relative_name(&source, &path);
            fsutil::atomic_copy(&path, &self.layout.config_root.join(&name))?;
            restored += 1;
        }
        Ok(restored)
    }

    fn restore_user_data(&self, point_dir: &Path) -> Result<usize> {
        let source = point_dir.join(POINT_USER_DATA_DIR);
        let Ok(entries) = fs::read_dir(&source) else {
            return Ok(0);
        };

        let mut restored = 0;
        for entry in entries {
            let entry = entry?;
            let target = self.layout.data_dir.join(entry.file_name());
            fsutil::remove_path(&target)?;
            fsutil::copy_path(&entry.path(), &target)?;
            restored += 1;
        }
        Ok(restored)
    }

    fn log_recovery(&self, record: &RecoveryRecord) {
        self.history.lock().push(record.clone());

        let date = record.started_at.date_naive();
        let path = self
            .config
            .recovery_dir
            .join(LOGS_DIR)
            .join(format!("recovery_log_{}.json", date.format("%Y%m%d")));

        let mut log = match fsutil::read_json::<RecoveryLog>(&path) {
            Ok(log) => log,
            Err(_) => RecoveryLog {
                date,
                daily_log: Vec::new(),
            },
        };
        log.daily_log.push(record.clone());
        if let Err(e) = fsutil::write_json_atomic(&path, &log) {
            warn!(path = %path.display(), error = %e, "Failed to write recovery log");
        }
    }

    fn run_drill(&self) -> RecoveryTestReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let test_id = format!("TEST_{}", started_at.format("%Y%m%d_%H%M%S_%6f"));
        let test_root = self.config.recovery_dir.join(TEST_POINTS_DIR);
        let mut tests = Vec::new();

        info!(test_id = %test_id, "Starting recovery drill");

        // Recovery point creation, in the test area
        let point = match fs::create_dir_all(&test_root)
            .map_err(Error::from)
            .and_then(|_| self.create_point(&test_root, &format!("recovery drill {}", test_id)))
        {
            Ok(point) => {
                tests.push(CheckResult::pass(
                    "recovery_point_creation",
                    point.recovery_point_id.clone(),
                ));
                Some(point)
            }
            Err(e) => {
                tests.push(CheckResult::fail("recovery_point_creation", e.to_string()));
                None
            }
        };
        let point_dir = point
            .as_ref()
            .map(|p| test_root.join(&p.recovery_point_id));

        // Integrity of the test point
        tests.push(match point_dir.as_deref().map(verify_point) {
            Some(Ok(integrity)) if integrity.valid => {
                CheckResult::pass("integrity_check", integrity.current_checksum)
            }
            Some(Ok(integrity)) => CheckResult::fail(
                "integrity_check",
                format!("checksum match: {}", integrity.checksum_match),
            ),
            Some(Err(e)) => CheckResult::fail("integrity_check", e.to_string()),
            None => CheckResult::fail("integrity_check", "no test recovery point"),
        });

        // Backup system health
        let backup_status = self.backups.status();
        tests.push(if backup_status.status == BackupState::Failed {
            CheckResult::fail(
                "backup_status",
                backup_status
                    .recent_errors
                    .last()
                    .map(|e| e.error.clone())
                    .unwrap_or_else(|| "last backup failed".to_string()),
            )
        } else {
            CheckResult::pass("backup_status", format!("{:?}", backup_status.status))
        });

        // Full verification against a scratch copy
        let scratch = test_root.join(format!("scratch_{}", test_id));
        tests.push(match &point_dir {
            Some(dir) => match self.simulate_verification(dir, &scratch) {
                Ok(report) => match verification_outcome(&report) {
                    Ok(summary) => CheckResult::pass("simulated_verification", summary),
                    Err(e) => CheckResult::fail("simulated_verification", e.to_string()),
                },
                Err(e) => CheckResult::fail("simulated_verification", e.to_string()),
            },
            None => CheckResult::fail("simulated_verification", "no test recovery point"),
        });

        for path in std::iter::once(scratch).chain(point_dir) {
            if let Err(e) = fsutil::remove_path(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove drill artifacts");
            }
        }

        let tests_passed = tests.iter().filter(|t| t.success).count();
        let total_tests = tests.len();
        let report = RecoveryTestReport {
            test_id,
            started_at,
            finished_at: Utc::now(),
            duration_seconds: started.elapsed().as_secs_f64(),
            tests,
            tests_passed,
            total_tests,
            overall_success: tests_passed == total_tests,
        };
        info!(
            test_id = %report.test_id,
            passed = tests_passed,
            total = total_tests,
            "Recovery drill finished"
        );
        report
    }

    fn simulate_verification(&self, point_dir: &Path, scratch: &Path) -> Result<VerificationReport> {
        let chain_path = scratch.join(&self.layout.chain_file);
        let config_root = scratch.join(POINT_CONFIG_DIR);
        fsutil::atomic_copy(&point_dir.join(POINT_CHAIN_FILE), &chain_path)?;
        fsutil::copy_dir_recursive(&point_dir.join(POINT_CONFIG_DIR), &config_root)?;

        let target = CheckTarget {
            chain_path,
            config_root,
            ..self.live_check_target()
        };
        Ok(run_checks(&target, VerificationMode::Full))
    }
}

/// Recompute a recovery point's checksum and look for its required files
pub fn verify_point(dir: &Path) -> Result<PointIntegrity> {
    let metadata_path = dir.join(RECOVERY_METADATA_FILE);
    let point: RecoveryPoint = fsutil::read_json(&metadata_path)?;

    let missing_files: Vec<String> = [POINT_CHAIN_FILE, POINT_CONFIG_DIR, POINT_USER_DATA_DIR]
        .iter()
        .filter(|name| !dir.join(name).exists())
        .map(|name| name.to_string())
        .collect();

    let current_checksum = fsutil::tree_checksum(dir, &[RECOVERY_METADATA_FILE])?;
    let checksum_match = point.checksum.as_deref() == Some(current_checksum.as_str());

    Ok(PointIntegrity {
        valid: checksum_match && missing_files.is_empty(),
        checksum_match,
        expected_checksum: point.checksum,
        current_checksum,
        missing_files,
    })
}

/// Claim `RP_{ts}` under `parent`, adding `_N` when the second is taken
fn allocate_point_dir(parent: &Path, at: DateTime<Utc>) -> Result<(String, PathBuf)> {
    fs::create_dir_all(parent)?;
    let base = format!("{}{}", POINT_PREFIX, at.format("%Y%m%d_%H%M%S"));
    for n in 0..1000u32 {
        let id = if n == 0 {
            base.clone()
        } else {
            format!("{}_{}", base, n)
        };
        let dir = parent.join(&id);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok((id, dir)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::Other(format!("no free recovery point id for {}", base)))
}

fn verification_outcome(report: &VerificationReport) -> Result<String> {
    match report.first_failure() {
        None => Ok(format!("{} checks passed", report.checks.len())),
        Some(failed) => Err(Error::Other(format!(
            "{} failed: {}",
            failed.check, failed.detail
        ))),
    }
}

/// Record a step result, returning the failure so `?` stops the sequence
fn finish_step(
    record: &mut RecoveryRecord,
    step: RecoveryStep,
    result: Result<String>,
) -> std::result::Result<(), (RecoveryStep, String)> {
    match result {
        Ok(detail) => {
            info!(
                recovery_id = %record.recovery_id,
                step = %step,
                detail = %detail,
                "Recovery step completed"
            );
            record.steps.push(StepResult {
                step,
                success: true,
                detail,
            });
            Ok(())
        }
        Err(e) => {
            let reason = e.to_string();
            record.steps.push(StepResult {
                step,
                success: false,
                detail: reason.clone(),
            });
            Err((step, reason))
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn name_of(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
