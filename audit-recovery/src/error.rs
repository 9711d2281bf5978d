//! Error types for backup and disaster recovery

use thiserror::Error;

/// Result type for backup and recovery operations
pub type Result<T> = std::result::Result<T, Error>;

/// Backup and recovery errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] audit_ledger::Error),

    /// No backup with this id in any tier
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    /// Backup or recovery point failed verification; nothing was restored
    #[error("Integrity check failed for {id}: {reason}")]
    IntegrityCheckFailed {
        /// Backup or recovery point id
        id: String,
        /// What failed
        reason: String,
    },

    /// No recovery point with this id
    #[error("Recovery point not found: {0}")]
    RecoveryPointNotFound(String),

    /// Another recovery is running
    #[error("Recovery operation already in progress")]
    RecoveryInProgress,

    /// A recovery step failed; later steps did not run
    #[error("Recovery {recovery_id} failed at step {step}: {reason}")]
    RecoveryStepFailure {
        /// Recovery record id (see the recovery log)
        recovery_id: String,
        /// Failed step
        step: String,
        /// Failure detail
        reason: String,
    },

    /// Cron scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for Error {
    fn from(e: tokio_cron_scheduler::JobSchedulerError) -> Self {
        Error::Scheduler(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Other(format!("blocking task failed: {}", e))
    }
}
