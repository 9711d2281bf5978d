//! Configuration for backup, scheduling and disaster recovery

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the live system keeps its files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataLayout {
    /// Ledger data directory (chain file, logs, reports)
    pub data_dir: PathBuf,

    /// Chain file name inside `data_dir`
    pub chain_file: String,

    /// Directory holding configuration files and templates
    pub config_root: PathBuf,

    /// Genesis sentinel of the chain
    pub genesis_hash: String,
}

impl DataLayout {
    /// Layout matching a ledger configuration. Configuration files live
    /// next to the data directory.
    pub fn from_ledger(config: &audit_ledger::Config) -> Self {
        let config_root = config
            .data_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            data_dir: config.data_dir.clone(),
            chain_file: config.chain.chain_file.clone(),
            config_root,
            genesis_hash: config.chain.genesis_hash.clone(),
        }
    }

    /// Live chain file
    pub fn chain_path(&self) -> PathBuf {
        self.data_dir.join(&self.chain_file)
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::from_ledger(&audit_ledger::Config::default())
    }
}

/// Backup system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Root of the daily/monthly/yearly tiers
    pub backup_dir: PathBuf,

    /// Mirror location; mirroring failures never fail a backup
    pub remote_backup_dir: Option<PathBuf>,

    /// Configuration files copied from the config root
    pub config_files: Vec<String>,

    /// Template directory under the config root
    pub templates_dir: String,

    /// Log directory under the data directory (`*.log` files are gzipped)
    pub logs_dir: String,

    /// Soft budget for one backup (seconds)
    pub max_backup_seconds: u64,

    /// Retention tiers
    pub retention: RetentionConfig,

    /// Cron schedule
    pub schedule: ScheduleConfig,

    /// Retry policy for scheduled jobs
    pub retry: RetryPolicy,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("./backup_storage"),
            remote_backup_dir: None,
            config_files: vec![
                "config.json".to_string(),
                "settings.ini".to_string(),
                ".env".to_string(),
            ],
            templates_dir: "templates".to_string(),
            logs_dir: "logs".to_string(),
            max_backup_seconds: 300,
            retention: RetentionConfig::default(),
            schedule: ScheduleConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Retention per tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Daily backups (days)
    pub daily_retention_days: u32,

    /// Monthly archives (months)
    pub monthly_retention_months: u32,

    /// Yearly compliance archives (years), government floor
    pub yearly_retention_years: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            daily_retention_days: 30,
            monthly_retention_months: 12,
            yearly_retention_years: 7,
        }
    }
}

/// Cron schedule for the three periodic jobs (6-field, seconds first, UTC)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Backup job. Default: every 4 hours
    pub backup_cron: String,

    /// Cleanup job. Default: daily at 02:00
    pub cleanup_cron: String,

    /// Monthly archive job. Default: 01:00 on the 1st, ahead of cleanup
    pub archive_cron: String,

    /// Interval reported as "next backup" in status
    pub backup_interval_hours: u32,

    /// Take a backup as soon as the scheduler starts
    pub initial_backup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            backup_cron: "0 0 */4 * * *".to_string(),
            cleanup_cron: "0 0 2 * * *".to_string(),
            archive_cron: "0 0 1 1 * *".to_string(),
            backup_interval_hours: 4,
            initial_backup: true,
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per run, including the first
    pub max_attempts: u32,

    /// First backoff (milliseconds)
    pub initial_backoff_ms: u64,

    /// Backoff cap (milliseconds)
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

/// Disaster recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Recovery points, logs and test points
    pub recovery_dir: PathBuf,

    /// Recovery time objective (hours)
    pub max_recovery_hours: u32,

    /// Retention stamped on recovery points and checked on entries (years)
    pub retention_years: u32,

    /// Configuration files snapshotted into a recovery point
    pub config_files: Vec<String>,

    /// Configuration files that must exist after a recovery
    pub essential_config_files: Vec<String>,

    /// Directories (or files) under the data directory treated as user data
    pub user_data_dirs: Vec<String>,

    /// Budget for the restored-chain verification (milliseconds)
    pub max_verification_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            recovery_dir: PathBuf::from("./disaster_recovery"),
            max_recovery_hours: 4,
            retention_years: 7,
            config_files: vec![
                "config.json".to_string(),
                "settings.ini".to_string(),
                ".env".to_string(),
            ],
            essential_config_files: vec!["config.json".to_string(), "settings.ini".to_string()],
            user_data_dirs: vec![
                "logs".to_string(),
                "reports".to_string(),
                "temp_data".to_string(),
            ],
            max_verification_ms: 3_000,
        }
    }
}

/// Daemon configuration: ledger plus backup and recovery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Ledger configuration
    pub ledger: audit_ledger::Config,

    /// Backup configuration
    pub backup: BackupConfig,

    /// Recovery configuration
    pub recovery: RecoveryConfig,
}

impl DaemonConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = DaemonConfig {
            ledger: audit_ledger::Config::from_env()?,
            ..Default::default()
        };

        if let Ok(dir) = std::env::var("AUDIT_BACKUP_DIR") {
            config.backup.backup_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("AUDIT_REMOTE_BACKUP_DIR") {
            config.backup.remote_backup_dir = Some(PathBuf::from(dir));
        }

        if let Ok(dir) = std::env::var("AUDIT_RECOVERY_DIR") {
            config.recovery.recovery_dir = PathBuf::from(dir);
        }

        if let Ok(cron) = std::env::var("AUDIT_BACKUP_CRON") {
            config.backup.schedule.backup_cron = cron;
        }

        config.validate()?;
        Ok(config)
    }

    /// Data layout derived from the ledger configuration
    pub fn layout(&self) -> DataLayout {
        DataLayout::from_ledger(&self.ledger)
    }

    fn validate(&self) -> crate::Result<()> {
        if self.backup.retry.max_attempts == 0 {
            return Err(crate::Error::Config(
                "backup.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.backup.retention.yearly_retention_years < 7 {
            return Err(crate::Error::Config(format!(
                "yearly retention {} is below the 7-year government floor",
                self.backup.retention.yearly_retention_years
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.backup.max_backup_seconds, 300);
        assert_eq!(config.backup.retention.daily_retention_days, 30);
        assert_eq!(config.backup.retention.monthly_retention_months, 12);
        assert_eq!(config.backup.retention.yearly_retention_years, 7);
        assert_eq!(config.backup.schedule.backup_cron, "0 0 */4 * * *");
        assert_eq!(config.recovery.max_recovery_hours, 4);
    }

    #[test]
    fn test_layout_config_root_is_parent_of_data_dir() {
        let mut ledger = audit_ledger::Config::default();
        ledger.data_dir = PathBuf::from("/srv/audit/audit_data");

        let layout = DataLayout::from_ledger(&ledger);
        assert_eq!(layout.config_root, PathBuf::from("/srv/audit"));
        assert_eq!(
            layout.chain_path(),
            PathBuf::from("/srv/audit/audit_data/audit_chain.json.gz")
        );
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.toml");
        std::fs::write(
            &path,
            r#"
[ledger]
data_dir = "/var/lib/audit"

[backup]
backup_dir = "/var/backups/audit"

[backup.schedule]
backup_cron = "0 30 */2 * * *"
"#,
        )
        .unwrap();

        let config = DaemonConfig::from_file(&path).unwrap();
        assert_eq!(config.ledger.data_dir, PathBuf::from("/var/lib/audit"));
        assert_eq!(config.backup.backup_dir, PathBuf::from("/var/backups/audit"));
        assert_eq!(config.backup.schedule.backup_cron, "0 30 */2 * * *");
        assert_eq!(config.backup.schedule.cleanup_cron, "0 0 2 * * *");
        // Archive runs before cleanup so the month is archived first
        assert_eq!(config.backup.schedule.archive_cron, "0 0 1 1 * *");
        assert_eq!(config.recovery.retention_years, 7);
    }

    #[test]
    fn test_retention_floor_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.toml");
        std::fs::write(&path, "[backup.retention]\nyearly_retention_years = 3\n").unwrap();

        let err = DaemonConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
