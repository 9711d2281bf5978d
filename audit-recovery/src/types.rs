//! Core types for backup and disaster recovery

use crate::config::RetentionConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Manifest file written into every backup directory
pub const MANIFEST_FILE: &str = "backup_manifest.json";

/// Metadata file written into every recovery point
pub const RECOVERY_METADATA_FILE: &str = "recovery_metadata.json";

/// Why a backup was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    /// Cron-triggered
    Scheduled,
    /// Operator-triggered
    Manual,
    /// Taken in response to an incident
    Emergency,
    /// Taken by the recovery coordinator before it restores anything
    PreRecovery,
}

impl BackupKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Scheduled => "scheduled",
            BackupKind::Manual => "manual",
            BackupKind::Emergency => "emergency",
            BackupKind::PreRecovery => "pre_recovery",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a backed-up file is, which decides where it restores to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The chain file (data directory)
    AuditChain,
    /// A configuration file (config root)
    Configuration,
    /// A template file (config root)
    Template,
    /// A log file, stored gzipped (data directory)
    Log,
}

impl ArtifactKind {
    /// Whether the artifact restores into the data directory
    pub fn lives_in_data_dir(&self) -> bool {
        matches!(self, ArtifactKind::AuditChain | ArtifactKind::Log)
    }
}

/// One file in a backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArtifact {
    /// Path relative to its restore root
    pub original_name: String,
    /// Path relative to the backup directory
    pub stored_name: String,
    /// Size of the source file
    pub original_size: u64,
    /// Size of the stored file
    pub stored_size: u64,
    /// Stored file was gzipped by the backup and must be decompressed on restore
    pub compressed: bool,
    /// Artifact kind
    pub kind: ArtifactKind,
}

/// Post-copy verification of a backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupVerification {
    /// Every artifact present with its recorded size
    pub valid: bool,
    /// Artifacts checked
    pub files_checked: usize,
    /// Stored names that are missing
    pub missing_files: Vec<String>,
    /// Stored names whose size differs from the manifest
    pub corrupted_files: Vec<String>,
    /// When the check ran
    pub verified_at: DateTime<Utc>,
}

/// Describes one backup directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Backup id (directory name)
    pub backup_id: String,
    /// Why it was taken
    pub backup_type: BackupKind,
    /// Start time
    pub created_at: DateTime<Utc>,
    /// Data directory that was backed up
    pub data_dir: PathBuf,
    /// Copied files
    pub artifacts: Vec<BackupArtifact>,
    /// Retention stamped at creation (years)
    pub retention_years: u32,
    /// Attached once after the post-copy check
    pub verification: Option<BackupVerification>,
    /// End time
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration
    pub duration_seconds: Option<f64>,
    /// Set when the soft time budget was exceeded
    pub performance_warning: Option<String>,
}

/// Backup system state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupState {
    /// No backup attempted yet
    Initialized,
    /// A backup is being written
    Running,
    /// Last backup succeeded
    Completed,
    /// Last backup failed
    Failed,
}

/// A failed backup attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupFailure {
    /// Backup id, if one was allocated
    pub backup_id: Option<String>,
    /// Error text
    pub error: String,
    /// When it failed
    pub failed_at: DateTime<Utc>,
    /// Time spent before failing
    pub duration_seconds: f64,
}

/// Entries per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    /// `daily/backup_*`
    pub daily: usize,
    /// `monthly/archive_*`
    pub monthly: usize,
    /// `yearly/yearly_*`
    pub yearly: usize,
}

/// Bytes used per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    /// Daily tier
    pub daily_bytes: u64,
    /// Monthly tier
    pub monthly_bytes: u64,
    /// Yearly tier
    pub yearly_bytes: u64,
    /// Sum of all tiers
    pub total_bytes: u64,
}

/// Snapshot of the backup system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupStatus {
    /// Current state
    pub status: BackupState,
    /// Whether the scheduler is running
    pub is_running: bool,
    /// Last successful backup
    pub last_backup_time: Option<DateTime<Utc>>,
    /// Expected next backup
    pub next_backup_time: DateTime<Utc>,
    /// Entries per tier
    pub backup_counts: TierCounts,
    /// Last five failures
    pub recent_errors: Vec<BackupFailure>,
    /// Bytes per tier
    pub storage_usage: StorageUsage,
    /// Retention policy
    pub retention_policy: RetentionConfig,
}

/// Result of a restore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Restored backup
    pub backup_id: String,
    /// Explicit target, if one was given
    pub target: Option<PathBuf>,
    /// Files written
    pub restored_files: Vec<PathBuf>,
    /// Wall-clock duration
    pub duration_seconds: f64,
    /// When the backup was taken
    pub original_backup_time: DateTime<Utc>,
}

/// Result of a retention sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Daily backups removed
    pub daily_removed: Vec<String>,
    /// Monthly archives removed
    pub monthly_removed: Vec<String>,
    /// Yearly archives removed
    pub yearly_removed: Vec<String>,
    /// Directories that could not be removed
    pub failures: Vec<String>,
}

impl CleanupReport {
    /// Total directories removed
    pub fn removed(&self) -> usize {
        self.daily_removed.len() + self.monthly_removed.len() + self.yearly_removed.len()
    }
}

/// Result of an archival run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReport {
    /// Archive directory
    pub archive_path: PathBuf,
    /// Backups copied in this run
    pub backups_archived: Vec<String>,
    /// Archive already existed before this run
    pub already_existed: bool,
}

/// Depth of post-recovery verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// File existence only
    Quick,
    /// Adds chain integrity and a functionality check
    Standard,
    /// Adds performance and compliance checks
    Full,
}

impl VerificationMode {
    /// Whether integrity and functionality checks run
    pub fn includes_standard(&self) -> bool {
        matches!(self, VerificationMode::Standard | VerificationMode::Full)
    }

    /// Whether performance and compliance checks run
    pub fn includes_full(&self) -> bool {
        matches!(self, VerificationMode::Full)
    }
}

/// Outcome of one named check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Check name
    pub check: String,
    /// Passed
    pub success: bool,
    /// Human-readable detail
    pub detail: String,
}

impl CheckResult {
    /// Passing check
    pub fn pass(check: &str, detail: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            success: true,
            detail: detail.into(),
        }
    }

    /// Failing check
    pub fn fail(check: &str, detail: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            success: false,
            detail: detail.into(),
        }
    }
}

/// Post-recovery verification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Requested depth
    pub mode: VerificationMode,
    /// Every check passed
    pub overall_success: bool,
    /// Individual checks in run order
    pub checks: Vec<CheckResult>,
}

impl VerificationReport {
    /// First failing check
    pub fn first_failure(&self) -> Option<&CheckResult> {
        self.checks.iter().find(|c| !c.success)
    }
}

/// System facts captured with a recovery point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    /// When captured
    pub captured_at: DateTime<Utc>,
    /// Data directory
    pub data_dir: PathBuf,
    /// Entries in the snapshotted chain
    pub chain_entries: usize,
    /// Bytes under the data directory
    pub disk_usage_bytes: u64,
    /// Crate version that captured it
    pub platform_version: String,
}

/// What a recovery point contains
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotContents {
    /// Size of the chain copy
    pub chain_bytes: u64,
    /// Configuration files copied
    pub config_files: Vec<String>,
    /// User data entries copied
    pub user_data: Vec<String>,
}

/// Metadata of a recovery point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPoint {
    /// Recovery point id (directory name)
    pub recovery_point_id: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Operator description
    pub description: String,
    /// Captured system state
    pub system_state: SystemState,
    /// Contents
    pub contents: SnapshotContents,
    /// Compliance deadline
    pub retention_until: DateTime<Utc>,
    /// Combined checksum of every file except the metadata file
    pub checksum: Option<String>,
}

/// Listing entry for a recovery point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPointSummary {
    /// Recovery point id
    pub id: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Description
    pub description: String,
    /// Bytes on disk
    pub size_bytes: u64,
}

/// Checksum and required-file check of a recovery point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointIntegrity {
    /// Checksum matches and nothing is missing
    pub valid: bool,
    /// Recomputed checksum equals the recorded one
    pub checksum_match: bool,
    /// Recorded checksum
    pub expected_checksum: Option<String>,
    /// Recomputed checksum
    pub current_checksum: String,
    /// Required entries that are absent
    pub missing_files: Vec<String>,
}

/// Recovery steps in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStep {
    /// Backup of the current state
    PreRecoveryBackup,
    /// Checksum and required files of the recovery point
    VerifyRecoveryPoint,
    /// Chain file restore (and optional truncation)
    RestoreChain,
    /// Configuration restore
    RestoreConfig,
    /// User data restore
    RestoreUserData,
    /// Post-recovery checks
    Verification,
}

impl RecoveryStep {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStep::PreRecoveryBackup => "pre_recovery_backup",
            RecoveryStep::VerifyRecoveryPoint => "verify_recovery_point",
            RecoveryStep::RestoreChain => "restore_chain",
            RecoveryStep::RestoreConfig => "restore_config",
            RecoveryStep::RestoreUserData => "restore_user_data",
            RecoveryStep::Verification => "verification",
        }
    }
}

impl fmt::Display for RecoveryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one recovery step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step
    pub step: RecoveryStep,
    /// Passed
    pub success: bool,
    /// Detail or error text
    pub detail: String,
}

/// Audit record of one recovery attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    /// Recovery id
    pub recovery_id: String,
    /// Recovery point used
    pub recovery_point_id: String,
    /// Start
    pub started_at: DateTime<Utc>,
    /// End
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration
    pub duration_seconds: f64,
    /// Within the recovery time objective
    pub sla_compliant: bool,
    /// Truncation target, if any
    pub target_time: Option<DateTime<Utc>>,
    /// Verification depth
    pub verification_mode: VerificationMode,
    /// Steps that ran, in order
    pub steps: Vec<StepResult>,
    /// Post-recovery checks, when step 6 ran
    pub verification: Option<VerificationReport>,
    /// Backup taken before anything was restored
    pub pre_recovery_backup: Option<String>,
    /// Entries dropped by truncation
    pub truncated_entries: usize,
    /// Every step passed
    pub success: bool,
    /// First failure
    pub error: Option<String>,
}

impl RecoveryRecord {
    /// First failed step
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.success)
    }
}

/// Result of a non-destructive recovery drill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryTestReport {
    /// Test id
    pub test_id: String,
    /// Start
    pub started_at: DateTime<Utc>,
    /// End
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration
    pub duration_seconds: f64,
    /// Tests in run order
    pub tests: Vec<CheckResult>,
    /// Tests that passed
    pub tests_passed: usize,
    /// Tests run
    pub total_tests: usize,
    /// Every test passed
    pub overall_success: bool,
}

/// Snapshot of the disaster recovery subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStatus {
    /// A recovery is running
    pub recovery_in_progress: bool,
    /// Recovery points on disk
    pub available_recovery_points: usize,
    /// Newest recovery point
    pub latest_recovery_point: Option<RecoveryPointSummary>,
    /// Backup system snapshot
    pub backup_status: BackupStatus,
    /// Last drill
    pub last_recovery_test: Option<RecoveryTestReport>,
    /// Recoveries attempted since start
    pub recent_recoveries: usize,
    /// Average of backup, recovery-point and drill factors
    pub system_health_score: f64,
    /// Recovery time objective (hours)
    pub max_recovery_hours: u32,
    /// Retention (years)
    pub retention_years: u32,
}
