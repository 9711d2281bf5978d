//! Audit Backup & Disaster Recovery
//!
//! Tiered backups and point-in-time recovery for the audit ledger.
//!
//! # Architecture
//!
//! - **Backup System**: dated snapshots of the chain file, configuration,
//!   templates and logs, kept 30 days / 12 months / 7 years
//! - **Backup Scheduler**: cron jobs for backup, cleanup and archival,
//!   each run supervised with bounded retries
//! - **Recovery Coordinator**: single-flight, six-step recovery from
//!   checksummed recovery points with post-recovery verification
//!
//! Backups read only the persisted chain file. They never block appends.
//!
//! # Example
//!
//! ```no_run
//! use audit_recovery::{BackupKind, BackupSystem, DaemonConfig, RecoveryCoordinator, VerificationMode};
//!
//! #[tokio::main]
//! async fn main() -> audit_recovery::Result<()> {
//!     let config = DaemonConfig::default();
//!     let backups = BackupSystem::new(config.backup.clone(), config.layout())?;
//!     backups.create_backup(BackupKind::Manual).await?;
//!
//!     let recovery = RecoveryCoordinator::new(config.recovery.clone(), config.layout(), backups)?;
//!     let point = recovery.create_recovery_point("before migration").await?;
//!     recovery
//!         .perform_recovery(&point.recovery_point_id, None, VerificationMode::Full)
//!         .await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod backup;
pub mod checks;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod recovery;
pub mod scheduler;
pub mod types;

pub use backup::BackupSystem;
pub use config::{BackupConfig, DaemonConfig, DataLayout, RecoveryConfig, RetryPolicy};
pub use error::{Error, Result};
pub use recovery::RecoveryCoordinator;
pub use scheduler::{BackupScheduler, JobOutcome, ScheduledJob};
pub use types::{
    BackupKind, BackupManifest, BackupStatus, RecoveryPoint, RecoveryRecord, RecoveryStatus,
    VerificationMode,
};
