//! Error types for the audit ledger

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Payload cannot be canonically serialized; nothing was committed
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Entry not found
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Appends are refused while the chain is quarantined
    #[error("Writes disabled since {since}: chain quarantined after {corrupted_count} corrupted entries")]
    WritesDisabled {
        /// When the quarantine started
        since: DateTime<Utc>,
        /// Number of corrupted entries that triggered it
        corrupted_count: usize,
    },

    /// Appends are refused while the chain is being replaced
    #[error("Writes suspended: {0}")]
    WritesSuspended(String),

    /// Hash or link mismatch still present in the chain
    #[error("Chain corruption: {0}")]
    ChainCorruption(String),

    /// Durable storage error (chain file, corruption reports)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
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
