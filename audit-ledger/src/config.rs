//! Configuration for the audit ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory holding the chain file and corruption reports
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Chain configuration
    pub chain: ChainConfig,

    /// Soft SLA budgets
    pub performance: PerformanceConfig,

    /// Persist batching configuration
    pub batching: BatchingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./audit_data"),
            service_name: "audit-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            chain: ChainConfig::default(),
            performance: PerformanceConfig::default(),
            batching: BatchingConfig::default(),
        }
    }
}

/// Chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Previous hash of the first entry
    pub genesis_hash: String,

    /// Compliance retention applied to every entry (years)
    pub retention_years: u32,

    /// Chain file name inside `data_dir`
    pub chain_file: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            genesis_hash: crate::chain::GENESIS_HASH.to_string(),
            retention_years: 7,
            chain_file: crate::storage::CHAIN_FILE_NAME.to_string(),
        }
    }
}

/// Soft SLA budgets. Exceeding them is logged, never fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Append budget (milliseconds)
    pub max_append_ms: u64,

    /// Full-chain verification budget (milliseconds)
    pub max_verification_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_append_ms: 50,
            max_verification_ms: 3_000,
        }
    }
}

/// Persist batching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Persist after this many unpersisted appends
    pub max_batch_size: usize,

    /// Persist pending appends after this timeout (milliseconds)
    pub batch_timeout_ms: u64,

    /// When disabled every append is persisted before it returns
    pub enabled: bool,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            batch_timeout_ms: 1_000,
            enabled: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("AUDIT_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(ms) = std::env::var("AUDIT_MAX_APPEND_MS") {
            config.performance.max_append_ms = ms
                .parse()
                .map_err(|e| crate::Error::Config(format!("AUDIT_MAX_APPEND_MS: {}", e)))?;
        }

        if let Ok(ms) = std::env::var("AUDIT_MAX_VERIFICATION_MS") {
            config.performance.max_verification_ms = ms
                .parse()
                .map_err(|e| crate::Error::Config(format!("AUDIT_MAX_VERIFICATION_MS: {}", e)))?;
        }

        Ok(config)
    }

    /// Path of the persisted chain file
    pub fn chain_path(&self) -> PathBuf {
        self.data_dir.join(&self.chain.chain_file)
    }
}
