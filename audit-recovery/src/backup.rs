//! Tiered backup system
//!
//! Layout under the backup root:
//!
//! - `daily/backup_{YYYYmmdd_HHMMSS}` one directory per backup
//! - `monthly/archive_{YYYYMM}/backup_*` first backup of each ISO week
//! - `yearly/yearly_{YYYY}/backup_*` compliance copies, 7-year floor
//!
//! Every backup directory carries a `backup_manifest.json`. Only backups
//! whose manifest records a passed verification are listed or archived. A
//! failed backup's directory is removed, and archive copies are staged in
//! `.{backup_id}.partial` before being renamed into place.
//!
//! Cleanup never removes a daily backup from the current month, nor one from
//! the previous month until that month's archive exists.

use crate::config::{BackupConfig, DataLayout};
use crate::fsutil;
use crate::types::{
    ArchiveReport, ArtifactKind, BackupArtifact, BackupFailure, BackupKind, BackupManifest,
    BackupState, BackupStatus, BackupVerification, CleanupReport, RestoreReport, StorageUsage,
    TierCounts, MANIFEST_FILE,
};
use crate::{Error, Result};
use audit_ledger::{Ledger, LedgerEntry};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const DAILY_TIER: &str = "daily";
const MONTHLY_TIER: &str = "monthly";
const YEARLY_TIER: &str = "yearly";
const BACKUP_PREFIX: &str = "backup_";
const ARCHIVE_PREFIX: &str = "archive_";
const YEARLY_PREFIX: &str = "yearly_";
const RECENT_ERRORS: usize = 5;

/// Mutable bookkeeping behind the status report
#[derive(Debug)]
struct Runtime {
    status: BackupState,
    is_running: bool,
    last_backup_time: Option<DateTime<Utc>>,
    errors: Vec<BackupFailure>,
}

#[derive(Debug)]
struct Inner {
    config: BackupConfig,
    layout: DataLayout,
    runtime: Mutex<Runtime>,
}

/// Backup system handle
///
/// Cheap to clone. Blocking filesystem work runs on the blocking pool so
/// it never stalls the ledger actor.
#[derive(Debug, Clone)]
pub struct BackupSystem {
    inner: Arc<Inner>,
    ledger: Option<Ledger>,
}

impl BackupSystem {
    /// Create the tier directories and an idle system
    pub fn new(config: BackupConfig, layout: DataLayout) -> Result<Self> {
        for tier in [DAILY_TIER, MONTHLY_TIER, YEARLY_TIER] {
            fs::create_dir_all(config.backup_dir.join(tier))?;
        }

        info!(
            backup_dir = %config.backup_dir.display(),
            data_dir = %layout.data_dir.display(),
            remote = config.remote_backup_dir.is_some(),
            "Backup system initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                layout,
                runtime: Mutex::new(Runtime {
                    status: BackupState::Initialized,
                    is_running: false,
                    last_backup_time: None,
                    errors: Vec::new(),
                }),
            }),
            ledger: None,
        })
    }

    /// Install in-place chain restores through this ledger's writer instead
    /// of copying over the file it owns
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Backup configuration
    pub fn config(&self) -> &BackupConfig {
        &self.inner.config
    }

    /// Data layout being backed up
    pub fn layout(&self) -> &DataLayout {
        &self.inner.layout
    }

    /// Snapshot the chain file, configuration, templates and logs
    pub async fn create_backup(&self, kind: BackupKind) -> Result<BackupManifest> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.create_backup(kind)).await?
    }

    /// Restore every artifact of a backup. With `target`, everything lands
    /// under that directory; otherwise each artifact returns to its origin,
    /// the chain going through the attached ledger when there is one.
    pub async fn restore_from_backup(
        &self,
        backup_id: &str,
        target: Option<PathBuf>,
    ) -> Result<RestoreReport> {
        let inner = Arc::clone(&self.inner);
        let id = backup_id.to_string();
        let route_chain = target.is_none() && self.ledger.is_some();
        let (report, chain) = tokio::task::spawn_blocking(move || {
            inner.restore(&id, target.as_deref(), route_chain)
        })
        .await??;

        if let (Some(ledger), Some(entries)) = (&self.ledger, chain) {
            let count = ledger.restore(entries).await?;
            info!(backup_id = %backup_id, entries = count, "Ledger chain restored from backup");
        }
        Ok(report)
    }

    /// Re-check a backup against its manifest
    pub fn verify_backup(&self, backup_id: &str) -> Result<BackupVerification> {
        let dir = self.find_backup(backup_id)?;
        let manifest: BackupManifest = fsutil::read_json(&dir.join(MANIFEST_FILE))?;
        Ok(verify_dir(&dir, &manifest))
    }

    /// Locate a backup in the daily, monthly or yearly tier
    pub fn find_backup(&self, backup_id: &str) -> Result<PathBuf> {
        self.inner
            .find_backup(backup_id)
            .ok_or_else(|| Error::BackupNotFound(backup_id.to_string()))
    }

    /// Read a backup's manifest
    pub fn manifest(&self, backup_id: &str) -> Result<BackupManifest> {
        let dir = self.find_backup(backup_id)?;
        fsutil::read_json(&dir.join(MANIFEST_FILE))
    }

    /// Verified daily backup ids, oldest first
    pub fn list_backups(&self) -> Vec<String> {
        self.inner
            .daily_backups()
            .into_iter()
            .filter(|b| b.valid)
            .map(|b| b.id)
            .collect()
    }

    /// Delete backups past their tier's retention, relative to `now`
    pub async fn cleanup_old_backups(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.cleanup(now)).await?
    }

    /// Archive the first backup of each ISO week of `year`/`month`
    pub async fn create_monthly_archive(&self, year: i32, month: u32) -> Result<ArchiveReport> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.monthly_archive(year, month)).await?
    }

    /// Add the newest backup of `year` to the yearly compliance archive
    pub async fn create_yearly_archive(&self, year: i32) -> Result<ArchiveReport> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.yearly_archive(year)).await?
    }

    /// Current status
    pub fn status(&self) -> BackupStatus {
        self.inner.status()
    }

    /// Mark whether the scheduler is running
    pub fn set_running(&self, running: bool) {
        self.inner.runtime.lock().is_running = running;
    }
}

/// Daily backup directory with its parsed creation time
#[derive(Debug, Clone)]
struct DailyBackup {
    id: String,
    path: PathBuf,
    created: NaiveDateTime,
    /// Manifest readable and its verification passed
    valid: bool,
}

impl Inner {
    fn tier(&self, name: &str) -> PathBuf {
        self.config.backup_dir.join(name)
    }

    fn create_backup(&self, kind: BackupKind) -> Result<BackupManifest> {
        let started_at = Utc::now();
        let started = Instant::now();
        self.runtime.lock().status = BackupState::Running;

        info!(backup_type = %kind, "Starting backup");

        let mut allocated = None;
        let result = self.run_backup(kind, started_at, started, &mut allocated);

        let mut runtime = self.runtime.lock();
        match &result {
            Ok(manifest) => {
                runtime.status = BackupState::Completed;
                runtime.last_backup_time = manifest.completed_at;
            }
            Err(e) => {
                let duration_seconds = started.elapsed().as_secs_f64();
                error!(
                    backup_id = ?allocated,
                    error = %e,
                    duration_seconds,
                    "Backup failed"
                );
                if let Some(id) = &allocated {
                    let dir = self.tier(DAILY_TIER).join(id);
                    if let Err(e) = fsutil::remove_path(&dir) {
                        warn!(backup_id = %id, error = %e, "Failed to remove incomplete backup");
                    }
                }
                runtime.status = BackupState::Failed;
                runtime.errors.push(BackupFailure {
                    backup_id: allocated,
                    error: e.to_string(),
                    failed_at: Utc::now(),
                    duration_seconds,
                });
                let excess = runtime.errors.len().saturating_sub(RECENT_ERRORS);
                runtime.errors.drain(..excess);
            }
        }
        result
    }

    fn run_backup(
        &self,
        kind: BackupKind,
        started_at: DateTime<Utc>,
        started: Instant,
        allocated: &mut Option<String>,
    ) -> Result<BackupManifest> {
        let (backup_id, dir) = self.allocate_backup_dir(started_at)?;
        *allocated = Some(backup_id.clone());

        let mut artifacts = Vec::new();
        self.copy_chain(&dir, &mut artifacts)?;
        self.copy_config_files(&dir, &mut artifacts)?;
        self.copy_templates(&dir, &mut artifacts)?;
        self.copy_logs(&dir, &mut artifacts)?;

        let mut manifest = BackupManifest {
            backup_id: backup_id.clone(),
            backup_type: kind,
            created_at: started_at,
            data_dir: self.layout.data_dir.clone(),
            artifacts,
            retention_years: self.config.retention.yearly_retention_years,
            verification: None,
            completed_at: None,
            duration_seconds: None,
            performance_warning: None,
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        fsutil::write_json_atomic(&manifest_path, &manifest)?;

        let verification = verify_dir(&dir, &manifest);
        let duration_seconds = started.elapsed().as_secs_f64();
        if duration_seconds > self.config.max_backup_seconds as f64 {
            warn!(
                backup_id = %backup_id,
                duration_seconds,
                budget_seconds = self.config.max_backup_seconds,
                "Backup exceeded time budget"
            );
            manifest.performance_warning = Some(format!(
                "backup took {:.1}s, budget is {}s",
                duration_seconds, self.config.max_backup_seconds
            ));
        }
        let valid = verification.valid;
        let reason = describe_failure(&verification);
        manifest.verification = Some(verification);
        manifest.completed_at = Some(Utc::now());
        manifest.duration_seconds = Some(duration_seconds);
        fsutil::write_json_atomic(&manifest_path, &manifest)?;

        if !valid {
            return Err(Error::IntegrityCheckFailed {
                id: backup_id,
                reason,
            });
        }

        if let Some(remote) = &self.config.remote_backup_dir {
            let target = remote.join(DAILY_TIER).join(&backup_id);
            match fsutil::copy_dir_recursive(&dir, &target) {
                Ok(files) => debug!(backup_id = %backup_id, files, "Backup mirrored"),
                Err(e) => warn!(
                    backup_id = %backup_id,
                    remote = %remote.display(),
                    error = %e,
                    "Remote backup copy failed"
                ),
            }
        }

        info!(
            backup_id = %backup_id,
            backup_type = %kind,
            files = manifest.artifacts.len(),
            duration_seconds,
            "Backup completed"
        );

        Ok(manifest)
    }

    /// Claim `daily/backup_{ts}`, adding `_N` when the second is taken
    fn allocate_backup_dir(&self, at: DateTime<Utc>) -> Result<(String, PathBuf)> {
        let daily = self.tier(DAILY_TIER);
        fs::create_dir_all(&daily)?;

        let base = format!("{}{}", BACKUP_PREFIX, at.format("%Y%m%d_%H%M%S"));
        for n in 0..1000u32 {
            let id = if n == 0 {
                base.clone()
            } else {
                format!("{}_{}", base, n)
            };
            let dir = daily.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Other(format!("no free backup id for {}", base)))
    }

    fn copy_chain(&self, dir: &Path, artifacts: &mut Vec<BackupArtifact>) -> Result<()> {
        let chain = self.layout.chain_path();
        if !chain.exists() {
            warn!(path = %chain.display(), "No chain file to back up");
            return Ok(());
        }

        // The live file is only ever replaced by rename, so one open handle
        // sees a complete snapshot.
        let stored = dir.join(&self.layout.chain_file);
        let copied = fsutil::atomic_copy(&chain, &stored)?;
        artifacts.push(BackupArtifact {
            original_name: self.layout.chain_file.clone(),
            stored_name: self.layout.chain_file.clone(),
            original_size: copied,
            stored_size: copied,
            compressed: false,
            kind: ArtifactKind::AuditChain,
        });
        Ok(())
    }

    fn copy_config_files(&self, dir: &Path, artifacts: &mut Vec<BackupArtifact>) -> Result<()> {
        for name in &self.config.config_files {
            let src = self.layout.config_root.join(name);
            if !src.is_file() {
                debug!(file = %name, "Config file absent, skipped");
                continue;
            }
            let stored_name = format!("config_{}", name);
            let copied = fs::copy(&src, dir.join(&stored_name))?;
            artifacts.push(BackupArtifact {
                original_name: name.clone(),
                stored_name,
                original_size: copied,
                stored_size: copied,
                compressed: false,
                kind: ArtifactKind::Configuration,
            });
        }
        Ok(())
    }

    fn copy_templates(&self, dir: &Path, artifacts: &mut Vec<BackupArtifact>) -> Result<()> {
        let root = self.layout.config_root.join(&self.config.templates_dir);
        if !root.is_dir() {
            return Ok(());
        }
        for path in fsutil::list_files(&root) {
            let name = format!(
                "{}/{}",
                self.config.templates_dir,
                fsutil::relative_name(&root, &path)
            );
            let target = dir.join(&name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let copied = fs::copy(&path, &target)?;
            artifacts.push(BackupArtifact {
                original_name: name.clone(),
                stored_name: name,
                original_size: copied,
                stored_size: copied,
                compressed: false,
                kind: ArtifactKind::Template,
            });
        }
        Ok(())
    }

    fn copy_logs(&self, dir: &Path, artifacts: &mut Vec<BackupArtifact>) -> Result<()> {
        let root = self.layout.data_dir.join(&self.config.logs_dir);
        if !root.is_dir() {
            return Ok(());
        }
        for path in fsutil::list_files(&root) {
            if path.extension().map_or(true, |ext| ext != "log") {
                continue;
            }
            let original_name = format!(
                "{}/{}",
                self.config.logs_dir,
                fsutil::relative_name(&root, &path)
            );
            let stored_name = format!("{}.gz", original_name);
            let original_size = fs::metadata(&path)?.len();
            let stored_size = fsutil::gzip_file(&path, &dir.join(&stored_name))?;
            artifacts.push(BackupArtifact {
                original_name,
                stored_name,
                original_size,
                stored_size,
                compressed: true,
                kind: ArtifactKind::Log,
            });
        }
        Ok(())
    }

    /// With `route_chain`, the chain artifact is decoded and handed back
    /// instead of being copied into place
    fn restore(
        &self,
        backup_id: &str,
        target: Option<&Path>,
        route_chain: bool,
    ) -> Result<(RestoreReport, Option<Vec<LedgerEntry>>)> {
        let started = Instant::now();
        let dir = self
            .find_backup(backup_id)
            .ok_or_else(|| Error::BackupNotFound(backup_id.to_string()))?;

        let manifest: BackupManifest = fsutil::read_json(&dir.join(MANIFEST_FILE))
            .map_err(|e| Error::IntegrityCheckFailed {
                id: backup_id.to_string(),
                reason: format!("unreadable manifest: {}", e),
            })?;

        let verification = verify_dir(&dir, &manifest);
        if !verification.valid {
            return Err(Error::IntegrityCheckFailed {
                id: backup_id.to_string(),
                reason: describe_failure(&verification),
            });
        }
        let mut chain = None;
        for artifact in &manifest.artifacts {
            if artifact.kind == ArtifactKind::AuditChain {
                let entries =
                    audit_ledger::storage::read_chain_file(&dir.join(&artifact.stored_name))
                        .map_err(|e| Error::IntegrityCheckFailed {
                            id: backup_id.to_string(),
                            reason: e.to_string(),
                        })?;
                chain = Some(entries);
            }
        }

        info!(
            backup_id = %backup_id,
            target = ?target,
            files = manifest.artifacts.len(),
            "Restoring backup"
        );

        let mut restored_files = Vec::with_capacity(manifest.artifacts.len());
        for artifact in &manifest.artifacts {
            let root = match target {
                Some(t) => t,
                None if artifact.kind.lives_in_data_dir() => self.layout.data_dir.as_path(),
                None => self.layout.config_root.as_path(),
            };
            let src = dir.join(&artifact.stored_name);
            let dst = root.join(&artifact.original_name);
            if route_chain && artifact.kind == ArtifactKind::AuditChain {
                restored_files.push(dst);
                continue;
            }
            if artifact.compressed {
                fsutil::gunzip_file(&src, &dst)?;
            } else {
                fsutil::atomic_copy(&src, &dst)?;
            }
            restored_files.push(dst);
        }

        let duration_seconds = started.elapsed().as_secs_f64();
        info!(
            backup_id = %backup_id,
            files = restored_files.len(),
            duration_seconds,
            "Backup restored"
        );

        let report = RestoreReport {
            backup_id: backup_id.to_string(),
            target: target.map(Path::to_path_buf),
            restored_files,
            duration_seconds,
            original_backup_time: manifest.created_at,
        };
        Ok((report, chain.filter(|_| route_chain)))
    }

    fn find_backup(&self, backup_id: &str) -> Option<PathBuf> {
        let daily = self.tier(DAILY_TIER).join(backup_id);
        if daily.join(MANIFEST_FILE).is_file() {
            return Some(daily);
        }
        for tier in [MONTHLY_TIER, YEARLY_TIER] {
            for archive in subdirs(&self.tier(tier)) {
                let candidate = archive.join(backup_id);
                if candidate.join(MANIFEST_FILE).is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    fn daily_backups(&self) -> Vec<DailyBackup> {
        let mut backups: Vec<DailyBackup> = subdirs(&self.tier(DAILY_TIER))
            .into_iter()
            .filter_map(|path| {
                let id = path.file_name()?.to_str()?.to_string();
                let created = parse_backup_time(&id)?;
                let valid = manifest_valid(&path);
                Some(DailyBackup {
                    id,
                    path,
                    created,
                    valid,
                })
            })
            .collect();
        backups.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        backups
    }

    fn cleanup(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let retention = &self.config.retention;
        let mut report = CleanupReport::default();

        let mut daily_cutoff =
            (now - Duration::days(i64::from(retention.daily_retention_days))).naive_utc();
        if let Some(floor) = self.archive_floor(now) {
            daily_cutoff = daily_cutoff.min(floor);
        }
        for backup in self.daily_backups() {
            if backup.created < daily_cutoff {
                remove_dir(&backup.path, &backup.id, &mut report.daily_removed, &mut report.failures);
            }
        }

        let current_month = now.year() * 12 + now.month0() as i32;
        for path in subdirs(&self.tier(MONTHLY_TIER)) {
            let Some((id, (year, month))) = name_of(&path).and_then(|n| {
                let ym = parse_archive_month(&n)?;
                Some((n, ym))
            }) else {
                continue;
            };
            let age_months = current_month - (year * 12 + month as i32 - 1);
            if age_months > retention.monthly_retention_months as i32 {
                remove_dir(&path, &id, &mut report.monthly_removed, &mut report.failures);
            }
        }

        let oldest_kept_year = now.year() - retention.yearly_retention_years as i32;
        for path in subdirs(&self.tier(YEARLY_TIER)) {
            let Some((id, year)) = name_of(&path).and_then(|n| {
                let y = parse_yearly(&n)?;
                Some((n, y))
            }) else {
                continue;
            };
            if year < oldest_kept_year {
                remove_dir(&path, &id, &mut report.yearly_removed, &mut report.failures);
            }
        }

        info!(
            daily = report.daily_removed.len(),
            monthly = report.monthly_removed.len(),
            yearly = report.yearly_removed.len(),
            failures = report.failures.len(),
            "Backup cleanup completed"
        );
        Ok(report)
    }

    /// Start of the oldest month whose daily backups still await their
    /// monthly archive
    fn archive_floor(&self, now: DateTime<Utc>) -> Option<NaiveDateTime> {
        let month_start = now.date_naive().with_day(1)?;
        let previous = month_start.checked_sub_months(Months::new(1))?;
        let archived = self
            .tier(MONTHLY_TIER)
            .join(archive_name(previous.year(), previous.month()))
            .is_dir();
        let floor = if archived { month_start } else { previous };
        floor.and_hms_opt(0, 0, 0)
    }

    fn monthly_archive(&self, year: i32, month: u32) -> Result<ArchiveReport> {
        let archive_path = self.tier(MONTHLY_TIER).join(archive_name(year, month));
        let already_existed = archive_path.exists();
        fs::create_dir_all(&archive_path)?;

        // First backup of each ISO week
        let mut weekly: BTreeMap<(i32, u32), DailyBackup> = BTreeMap::new();
        for backup in self.daily_backups() {
            if !backup.valid || backup.created.year() != year || backup.created.month() != month {
                continue;
            }
            let week = backup.created.iso_week();
            weekly.entry((week.year(), week.week())).or_insert(backup);
        }

        let mut backups_archived = Vec::new();
        for backup in weekly.into_values() {
            if archive_path.join(&backup.id).exists() {
                continue;
            }
            copy_into_archive(&backup.path, &archive_path, &backup.id)?;
            backups_archived.push(backup.id);
        }

        info!(
            archive = %archive_path.display(),
            archived = backups_archived.len(),
            "Monthly archive updated"
        );
        Ok(ArchiveReport {
            archive_path,
            backups_archived,
            already_existed,
        })
    }

    fn yearly_archive(&self, year: i32) -> Result<ArchiveReport> {
        let archive_path = self
            .tier(YEARLY_TIER)
            .join(format!("{}{:04}", YEARLY_PREFIX, year));
        let already_existed = archive_path.exists();
        fs::create_dir_all(&archive_path)?;

        let mut candidates: Vec<(NaiveDateTime, String, PathBuf)> = self
            .daily_backups()
            .into_iter()
            .filter(|b| b.valid && b.created.year() == year)
            .map(|b| (b.created, b.id, b.path))
            .collect();
        for archive in subdirs(&self.tier(MONTHLY_TIER)) {
            let in_year = name_of(&archive)
                .and_then(|n| parse_archive_month(&n))
                .map_or(false, |(y, _)| y == year);
            if !in_year {
                continue;
            }
            for path in subdirs(&archive) {
                let Some(id) = name_of(&path) else { continue };
                if let Some(created) = parse_backup_time(&id) {
                    if manifest_valid(&path) {
                        candidates.push((created, id, path));
                    }
                }
            }
        }

        let mut backups_archived = Vec::new();
        if let Some((_, id, path)) = candidates.into_iter().max_by(|a, b| a.0.cmp(&b.0)) {
            if !archive_path.join(&id).exists() {
                copy_into_archive(&path, &archive_path, &id)?;
                backups_archived.push(id);
            }
        } else {
            warn!(year, "No backups available for yearly archive");
        }

        info!(
            archive = %archive_path.display(),
            archived = backups_archived.len(),
            "Yearly archive updated"
        );
        Ok(ArchiveReport {
            archive_path,
            backups_archived,
            already_existed,
        })
    }

    fn status(&self) -> BackupStatus {
        let daily = self.daily_backups().iter().filter(|b| b.valid).count();
        let runtime = self.runtime.lock();
        let interval = Duration::hours(i64::from(self.config.schedule.backup_interval_hours));
        let next_backup_time = runtime.last_backup_time.unwrap_or_else(Utc::now) + interval;

        let count = |tier: &str, prefix: &str| {
            subdirs(&self.tier(tier))
                .iter()
                .filter(|p| name_of(p).map_or(false, |n| n.starts_with(prefix)))
                .count()
        };
        let daily_bytes = fsutil::dir_size(&self.tier(DAILY_TIER));
        let monthly_bytes = fsutil::dir_size(&self.tier(MONTHLY_TIER));
        let yearly_bytes = fsutil::dir_size(&self.tier(YEARLY_TIER));

        BackupStatus {
            status: runtime.status,
            is_running: runtime.is_running,
            last_backup_time: runtime.last_backup_time,
            next_backup_time,
            backup_counts: TierCounts {
                daily,
                monthly: count(MONTHLY_TIER, ARCHIVE_PREFIX),
                yearly: count(YEARLY_TIER, YEARLY_PREFIX),
            },
            recent_errors: runtime.errors.clone(),
            storage_usage: StorageUsage {
                daily_bytes,
                monthly_bytes,
                yearly_bytes,
                total_bytes: daily_bytes + monthly_bytes + yearly_bytes,
            },
            retention_policy: self.config.retention.clone(),
        }
    }
}

/// Check every manifest artifact exists with its recorded size
pub fn verify_dir(dir: &Path, manifest: &BackupManifest) -> BackupVerification {
    let mut missing_files = Vec::new();
    let mut corrupted_files = Vec::new();

    for artifact in &manifest.artifacts {
        match fs::metadata(dir.join(&artifact.stored_name)) {
            Ok(meta) if meta.len() == artifact.stored_size => {}
            Ok(_) => corrupted_files.push(artifact.stored_name.clone()),
            Err(_) => missing_files.push(artifact.stored_name.clone()),
        }
    }

    BackupVerification {
        valid: missing_files.is_empty() && corrupted_files.is_empty(),
        files_checked: manifest.artifacts.len(),
        missing_files,
        corrupted_files,
        verified_at: Utc::now(),
    }
}

fn describe_failure(verification: &BackupVerification) -> String {
    format!(
        "missing: [{}], corrupted: [{}]",
        verification.missing_files.join(", "),
        verification.corrupted_files.join(", ")
    )
}

fn manifest_valid(dir: &Path) -> bool {
    fsutil::read_json::<BackupManifest>(&dir.join(MANIFEST_FILE))
        .ok()
        .and_then(|m| m.verification)
        .map_or(false, |v| v.valid)
}

/// Copy a backup directory into `archive` as `id`, through a staging
/// directory so an interrupted copy never looks like an archived backup
fn copy_into_archive(src: &Path, archive: &Path, id: &str) -> Result<()> {
    let staging = archive.join(format!(".{}.partial", id));
    fsutil::remove_path(&staging)?;

    let copied = fsutil::copy_dir_recursive(src, &staging)
        .and_then(|_| fs::rename(&staging, archive.join(id)));
    if let Err(e) = copied {
        let _ = fsutil::remove_path(&staging);
        return Err(e.into());
    }
    Ok(())
}

fn archive_name(year: i32, month: u32) -> String {
    format!("{}{:04}{:02}", ARCHIVE_PREFIX, year, month)
}

fn remove_dir(path: &Path, id: &str, removed: &mut Vec<String>, failures: &mut Vec<String>) {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(backup = %id, "Expired backup removed");
            removed.push(id.to_string());
        }
        Err(e) => {
            warn!(backup = %id, error = %e, "Failed to remove expired backup");
            failures.push(id.to_string());
        }
    }
}

fn subdirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| e.file_type().map_or(false, |t| t.is_dir()))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    dirs
}

fn name_of(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_string)
}

/// `backup_20240315_143000` or `backup_20240315_143000_2`
fn parse_backup_time(id: &str) -> Option<NaiveDateTime> {
    let stamp = id.strip_prefix(BACKUP_PREFIX)?.get(..15)?;
    NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S").ok()
}

/// `archive_202403`
fn parse_archive_month(name: &str) -> Option<(i32, u32)> {
    let stamp = name.strip_prefix(ARCHIVE_PREFIX)?;
    if stamp.len() != 6 {
        return None;
    }
    let year = stamp.get(..4)?.parse().ok()?;
    let month: u32 = stamp.get(4..)?.parse().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

/// `yearly_2024`
fn parse_yearly(name: &str) -> Option<i32> {
    name.strip_prefix(YEARLY_PREFIX)?.parse().ok()
}
