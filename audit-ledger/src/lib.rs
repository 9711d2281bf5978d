//! Saudi AI Audit Ledger
//!
//! Append-only, hash-chained ledger of AI procurement, Sharia and AML
//! decisions.
//!
//! # Architecture
//!
//! - **Hash Chain**: every entry commits to its predecessor's SHA-256 hash
//! - **Single Writer**: one actor task serializes append, hash and persist
//! - **Atomic Persist**: gzip JSON chain file replaced via temp + rename
//! - **Fail-Stop**: detected corruption quarantines the ledger
//!
//! # Invariants
//!
//! - `entry[i].previous_hash == entry[i-1].hash` for every `i > 0`
//! - `entry.hash == SHA256(canonical(entry without hash))`
//! - Positions are dense and strictly increasing from 0
//! - Entries are never modified once appended

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod chain;
pub mod storage;
pub mod verify;
pub mod stats;
pub mod ledger;
pub mod error;
pub mod actor;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    AlertSeverity, BiasAlert, BiasResult, ChainHealth, DecisionPayload, DecisionRecord,
    LedgerEntry,
};
pub use chain::GENESIS_HASH;
pub use storage::ChainStore;
pub use verify::{CorruptedEntry, CorruptionKind, IntegrityReport, RangeReport};
pub use stats::DailyStatistics;
pub use ledger::{Ledger, WriteSuspension};
pub use config::Config;
