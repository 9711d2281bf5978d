//! Main ledger orchestration layer
//!
//! This module ties together storage, hashing, verification and the writer
//! actor into the API the decision services use.
//!
//! # Example
//!
//! ```no_run
//! use audit_ledger::{Config, DecisionPayload, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> audit_ledger::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     let id = ledger
//!         .append(DecisionPayload::procurement("1234567890").with_field("tender_id", "T-1"))
//!         .await?;
//!     assert!(ledger.get_entry(&id).is_ok());
//!
//!     let report = ledger.verify_all()?;
//!     assert!(report.valid);
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    metrics::Metrics,
    stats::{daily_statistics, DailyStatistics},
    storage::ChainStore,
    types::{BiasAlert, BiasResult, ChainHealth, DecisionPayload, LedgerEntry},
    verify::{verify_chain, verify_range, CorruptedEntry, IntegrityReport, RangeReport},
    Config, Error, Result,
};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// In-memory chain plus the id index.
///
/// Entries sit behind an `Arc` so readers can take a [`snapshot`] and scan it
/// without holding the lock. An append while a snapshot is alive copies the
/// vector once.
///
/// [`snapshot`]: ChainState::snapshot
#[derive(Debug, Default)]
pub struct ChainState {
    entries: Arc<Vec<LedgerEntry>>,
    index: HashMap<String, usize>,
}

impl ChainState {
    /// Build state from loaded entries
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        let mut state = Self::default();
        state.replace(entries);
        state
    }

    /// Entries in chain order
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Shared handle to the current entries, unaffected by later appends
    pub fn snapshot(&self) -> Arc<Vec<LedgerEntry>> {
        Arc::clone(&self.entries)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by id
    pub fn get(&self, id: &str) -> Option<&LedgerEntry> {
        self.index.get(id).and_then(|&i| self.entries.get(i))
    }

    /// Whether an id is already taken
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Tail hash, or `genesis` when empty
    pub fn latest_hash(&self, genesis: &str) -> String {
        self.entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| genesis.to_string())
    }

    pub(crate) fn push(&mut self, entry: LedgerEntry) {
        self.index.insert(entry.id.clone(), self.entries.len());
        Arc::make_mut(&mut self.entries).push(entry);
    }

    pub(crate) fn pop(&mut self) -> Option<LedgerEntry> {
        let entry = Arc::make_mut(&mut self.entries).pop()?;
        self.index.remove(&entry.id);
        Some(entry)
    }

    #[cfg(test)]
    pub(crate) fn entries_mut(&mut self) -> &mut [LedgerEntry] {
        Arc::<Vec<LedgerEntry>>::make_mut(&mut self.entries)
    }

    pub(crate) fn replace(&mut self, entries: Vec<LedgerEntry>) {
        self.index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        self.entries = Arc::new(entries);
    }
}

/// State shared between the writer actor and readers
#[derive(Debug, Default)]
pub struct SharedState {
    /// The chain
    pub chain: RwLock<ChainState>,
    /// Health flag gating appends
    pub health: RwLock<ChainHealth>,
    /// Reason appends are suspended, while a [`WriteSuspension`] is alive
    pub suspended: RwLock<Option<String>>,
}

impl SharedState {
    /// Wrap a chain in a healthy state
    pub fn new(chain: ChainState) -> Self {
        Self {
            chain: RwLock::new(chain),
            health: RwLock::new(ChainHealth::Healthy),
            suspended: RwLock::new(None),
        }
    }
}

/// Appends are refused while this guard is alive. Dropping it resumes them.
#[derive(Debug)]
#[must_use = "appends resume as soon as the suspension is dropped"]
pub struct WriteSuspension {
    shared: Arc<SharedState>,
}

impl Drop for WriteSuspension {
    fn drop(&mut self) {
        if let Some(reason) = self.shared.suspended.write().take() {
            tracing::info!(reason = %reason, "Appends resumed");
        }
    }
}

/// Persisted record of a corruption event
#[derive(Debug, Clone, Serialize)]
pub struct CorruptionReport {
    /// Investigation id for the compliance team
    pub investigation_id: String,
    /// Detection time
    pub detected_at: DateTime<Utc>,
    /// Fixed error code
    pub error_code: &'static str,
    /// Entries in the chain
    pub total_entries: usize,
    /// Distinct corrupted positions
    pub corrupted_count: usize,
    /// Score at detection
    pub integrity_score: f64,
    /// Findings
    pub corrupted_entries: Vec<CorruptedEntry>,
}

/// Main ledger interface
#[derive(Debug, Clone)]
pub struct Ledger {
    /// Actor handle for writes
    handle: LedgerHandle,

    /// Chain and health, read directly
    shared: Arc<SharedState>,

    /// Chain file
    store: ChainStore,

    /// Configuration
    config: Arc<Config>,

    /// Metrics
    metrics: Metrics,

    /// Startup load problem, if any
    load_warning: Option<String>,
}

impl Ledger {
    /// Open ledger with configuration.
    ///
    /// An unreadable chain file does not fail the open: it is moved aside
    /// untouched, the ledger starts empty and [`Ledger::load_warning`]
    /// reports what happened. Failing to move it aside fails the open.
    pub async fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let store = ChainStore::open(config.chain_path())?;
        let outcome = store.load_or_empty()?;

        let metrics = Metrics::new().map_err(|e| Error::Other(format!("metrics: {}", e)))?;
        metrics.set_chain_length(outcome.entries.len());

        let shared = Arc::new(SharedState::new(ChainState::from_entries(outcome.entries)));
        let config = Arc::new(config);

        let handle = spawn_ledger_actor(
            shared.clone(),
            store.clone(),
            config.clone(),
            metrics.clone(),
        );

        tracing::info!(
            service = %config.service_name,
            data_dir = %config.data_dir.display(),
            entries = shared.chain.read().len(),
            "Audit ledger opened"
        );

        Ok(Self {
            handle,
            shared,
            store,
            config,
            metrics,
            load_warning: outcome.warning,
        })
    }

    /// Append a decision stamped with the current time
    pub async fn append(&self, payload: DecisionPayload) -> Result<String> {
        self.handle.append(payload, None).await
    }

    /// Append a decision with a caller-supplied timestamp
    pub async fn append_at(
        &self,
        payload: DecisionPayload,
        timestamp: DateTime<Utc>,
    ) -> Result<String> {
        self.handle.append(payload, Some(timestamp)).await
    }

    /// Append an untyped JSON payload
    pub async fn append_value(&self, payload: serde_json::Value) -> Result<String> {
        self.append(DecisionPayload::from_value(payload)?).await
    }

    /// Record a bias alert against an existing entry
    pub async fn log_bias_alert(&self, entry_id: &str, result: BiasResult) -> Result<String> {
        if !result.confidence.is_finite() {
            return Err(Error::Encoding(format!(
                "bias confidence must be finite, got {}",
                result.confidence
            )));
        }
        if !self.shared.chain.read().contains(entry_id) {
            return Err(Error::EntryNotFound(entry_id.to_string()));
        }

        let alert = BiasAlert::from_result(entry_id, result);
        let severity = alert.severity;
        let alert_id = self.append(DecisionPayload::BiasAlert(alert)).await?;

        tracing::warn!(
            alert_id = %alert_id,
            related_entry = %entry_id,
            severity = %severity,
            "Bias alert recorded"
        );
        Ok(alert_id)
    }

    /// Tail hash, or the genesis sentinel when empty
    pub fn latest_hash(&self) -> String {
        self.shared
            .chain
            .read()
            .latest_hash(&self.config.chain.genesis_hash)
    }

    /// Get entry by id
    pub fn get_entry(&self, id: &str) -> Result<LedgerEntry> {
        self.shared
            .chain
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::EntryNotFound(id.to_string()))
    }

    /// Copy of the whole chain
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.snapshot().to_vec()
    }

    /// Current entries, shared rather than copied
    pub fn snapshot(&self) -> Arc<Vec<LedgerEntry>> {
        self.shared.chain.read().snapshot()
    }

    /// Entries with `start <= timestamp <= end`
    pub fn entries_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<LedgerEntry> {
        self.snapshot()
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.shared.chain.read().len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.shared.chain.read().is_empty()
    }

    /// Verify the whole chain.
    ///
    /// Scans a snapshot, so appends carry on during the scan. Any corruption
    /// writes a report into the data directory and quarantines the ledger.
    /// Appends stay refused until [`Ledger::clear_quarantine`] succeeds.
    pub fn verify_all(&self) -> Result<IntegrityReport> {
        let budget = Duration::from_millis(self.config.performance.max_verification_ms);
        let snapshot = self.snapshot();
        let report = verify_chain(&snapshot, &self.config.chain.genesis_hash, budget);

        let corrupted = !report.corrupted_entries.is_empty();
        self.metrics
            .record_verification(report.verification_time_ms / 1000.0, corrupted);
        if report.partial_verification {
            self.metrics.record_sla_violation();
        }

        if corrupted {
            self.quarantine(&report)?;
        } else {
            tracing::info!(
                entries = report.entries_checked,
                elapsed_ms = report.verification_time_ms,
                partial = report.partial_verification,
                "Chain verified"
            );
        }

        Ok(report)
    }

    /// Hash-check entries in a time window, optionally for one decision type
    pub fn verify_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        decision_type: Option<&str>,
    ) -> RangeReport {
        verify_range(&self.snapshot(), start, end, decision_type)
    }

    /// Aggregate view of one UTC day
    pub fn daily_statistics(&self, date: NaiveDate) -> DailyStatistics {
        daily_statistics(
            &self.snapshot(),
            date,
            self.config.performance.max_append_ms as f64,
        )
    }

    /// Current health
    pub fn health(&self) -> ChainHealth {
        self.shared.health.read().clone()
    }

    /// Leave quarantine after the chain has been repaired.
    ///
    /// Re-runs full verification and only returns to healthy when it
    /// passes completely.
    pub fn clear_quarantine(&self, operator: &str) -> Result<IntegrityReport> {
        let report = self.verify_all()?;

        if !report.valid {
            let reason = if report.partial_verification {
                "verification incomplete".to_string()
            } else {
                format!("{} corrupted entries remain", report.corrupted_count)
            };
            tracing::warn!(operator, reason = %reason, "Quarantine not cleared");
            return Err(Error::ChainCorruption(reason));
        }

        let was_quarantined = !self.shared.health.read().is_healthy();
        *self.shared.health.write() = ChainHealth::Healthy;
        if was_quarantined {
            tracing::info!(operator, entries = report.entries_count, "Quarantine cleared");
        }
        Ok(report)
    }

    /// Persist unpersisted appends (batching mode)
    pub async fn flush(&self) -> Result<()> {
        self.handle.flush().await
    }

    /// Replace the in-memory chain with the chain file on disk
    pub async fn reload(&self) -> Result<usize> {
        self.handle.reload().await
    }

    /// Refuse appends until the returned guard is dropped.
    ///
    /// Resolves once every append queued before the call is persisted, so
    /// the chain file is final while the guard lives. Appends submitted
    /// meanwhile fail with [`Error::WritesSuspended`]. A second suspension
    /// while one is active fails the same way.
    pub async fn suspend_writes(&self, reason: impl Into<String>) -> Result<WriteSuspension> {
        self.handle.suspend(reason.into()).await?;
        Ok(WriteSuspension {
            shared: self.shared.clone(),
        })
    }

    /// Replace the chain on disk and in memory with `entries`.
    ///
    /// Goes through the writer, so it cannot interleave with an append and
    /// works while appends are suspended or quarantined. Verification is the
    /// caller's job.
    pub async fn restore(&self, entries: Vec<LedgerEntry>) -> Result<usize> {
        self.handle.restore(entries).await
    }

    /// Shutdown ledger, returning once pending appends are persisted
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }

    /// Metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Warning raised while loading the chain at startup
    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Chain file path
    pub fn chain_path(&self) -> &Path {
        self.store.path()
    }

    fn quarantine(&self, report: &IntegrityReport) -> Result<()> {
        let detected_at = Utc::now();

        let since = {
            let mut health = self.shared.health.write();
            let since = match &*health {
                ChainHealth::Quarantined { since, .. } => *since,
                ChainHealth::Healthy => detected_at,
            };
            *health = ChainHealth::Quarantined {
                since,
                report_path: None,
                corrupted_count: report.corrupted_count,
            };
            since
        };

        tracing::error!(
            corrupted = report.corrupted_count,
            findings = report.corrupted_entries.len(),
            integrity_score = report.integrity_score,
            "Chain corruption detected, appends disabled"
        );

        let path = self.write_corruption_report(report, detected_at)?;

        *self.shared.health.write() = ChainHealth::Quarantined {
            since,
            report_path: Some(path),
            corrupted_count: report.corrupted_count,
        };
        Ok(())
    }

    fn write_corruption_report(
        &self,
        report: &IntegrityReport,
        detected_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let document = CorruptionReport {
            investigation_id: format!("INV_{}", Uuid::now_v7().simple()),
            detected_at,
            error_code: "CHAIN_CORRUPTION",
            total_entries: report.entries_count,
            corrupted_count: report.corrupted_count,
            integrity_score: report.integrity_score,
            corrupted_entries: report.corrupted_entries.clone(),
        };

        let path = self.config.data_dir.join(format!(
            "corruption_report_{}.json",
            detected_at.format("%Y%m%d_%H%M%S_%6f")
        ));
        std::fs::write(&path, serde_json::to_vec_pretty(&document)?).map_err(|e| {
            Error::Storage(format!(
                "failed to write corruption report {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::error!(
            investigation_id = %document.investigation_id,
            path = %path.display(),
            "Corruption report written"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_test_ledger() -> (Ledger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.batching.enabled = false;

        (Ledger::open(config).await.unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let (ledger, _dir) = create_test_ledger().await;
        assert!(ledger.is_empty());
        assert!(ledger.load_warning().is_none());
        assert_eq!(ledger.latest_hash(), crate::chain::GENESIS_HASH);
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_append_and_retrieve_entry() {
        let (ledger, _dir) = create_test_ledger().await;

        let id = ledger
            .append(DecisionPayload::procurement("1234567890").with_field("tender_id", "T-9"))
            .await
            .unwrap();
        assert!(id.starts_with("procurement_1234567890_"));

        let entry = ledger.get_entry(&id).unwrap();
        assert_eq!(entry.chain_position, 0);
        assert_eq!(entry.previous_hash, crate::chain::GENESIS_HASH);
        assert_eq!(entry.data.field("tender_id"), Some(&json!("T-9")));
        assert_eq!(ledger.latest_hash(), entry.hash);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_entry() {
        let (ledger, _dir) = create_test_ledger().await;
        let err = ledger.get_entry("missing").unwrap_err();
        assert!(matches!(err, Error::EntryNotFound(_)));
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_system_entries_without_user() {
        let (ledger, _dir) = create_test_ledger().await;
        let id = ledger
            .append_value(json!({"decision_type": "procurement", "batch": 1}))
            .await
            .unwrap();
        assert!(id.starts_with("procurement_SYSTEM_"));
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bias_alert_is_chained() {
        let (ledger, _dir) = create_test_ledger().await;
        let decision = ledger
            .append(DecisionPayload::procurement("1234567890"))
            .await
            .unwrap();

        let alert_id = ledger
            .log_bias_alert(
                &decision,
                BiasResult {
                    confidence: 0.9,
                    details: json!({"bias_type": "regional"}),
                },
            )
            .await
            .unwrap();
        assert!(alert_id.starts_with("BIAS_ALERT_"));

        let alert = ledger.get_entry(&alert_id).unwrap();
        let details = alert.data.as_bias_alert().unwrap();
        assert_eq!(details.related_entry, decision);
        assert_eq!(details.severity, crate::types::AlertSeverity::High);
        assert!(details.regulatory_notification);
        assert_eq!(alert.chain_position, 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bias_alert_rejects_bad_input() {
        let (ledger, _dir) = create_test_ledger().await;
        let err = ledger
            .log_bias_alert(
                "nope",
                BiasResult {
                    confidence: 0.5,
                    details: json!({}),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EntryNotFound(_)));

        let id = ledger
            .append(DecisionPayload::aml("1234567890"))
            .await
            .unwrap();
        let err = ledger
            .log_bias_alert(
                &id,
                BiasResult {
                    confidence: f64::NAN,
                    details: json!({}),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
        assert_eq!(ledger.len(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_all_clean_chain_stays_healthy() {
        let (ledger, _dir) = create_test_ledger().await;
        for _ in 0..5 {
            ledger
                .append(DecisionPayload::sharia("1234567890"))
                .await
                .unwrap();
        }

        let report = ledger.verify_all().unwrap();
        assert!(report.valid);
        assert_eq!(report.entries_count, 5);
        assert!(ledger.health().is_healthy());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_corruption_quarantines_and_reports() {
        let (ledger, dir) = create_test_ledger().await;
        for _ in 0..4 {
            ledger
                .append(DecisionPayload::procurement("1234567890"))
                .await
                .unwrap();
        }

        ledger.shared.chain.write().entries_mut()[1].hash = "0".repeat(64);

        let report = ledger.verify_all().unwrap();
        assert!(!report.valid);

        let report_path = match ledger.health() {
            ChainHealth::Quarantined {
                report_path,
                corrupted_count,
                ..
            } => {
                assert_eq!(corrupted_count, 1);
                report_path.unwrap()
            }
            ChainHealth::Healthy => panic!("ledger should be quarantined"),
        };
        assert!(report_path.starts_with(dir.path()));

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&report_path).unwrap()).unwrap();
        assert!(written["investigation_id"]
            .as_str()
            .unwrap()
            .starts_with("INV_"));
        assert_eq!(written["corrupted_count"], json!(1));

        let err = ledger
            .append(DecisionPayload::procurement("1234567890"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WritesDisabled { .. }));

        assert!(ledger.clear_quarantine("ops-team").is_err());
        assert!(!ledger.health().is_healthy());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_quarantine_after_repair() {
        let (ledger, _dir) = create_test_ledger().await;
        for _ in 0..3 {
            ledger
                .append(DecisionPayload::aml("1234567890"))
                .await
                .unwrap();
        }

        let original = ledger.shared.chain.read().entries()[2].hash.clone();
        ledger.shared.chain.write().entries_mut()[2].hash = "bad".to_string();
        assert!(!ledger.verify_all().unwrap().valid);

        // Operator restores the durable chain
        ledger.reload().await.unwrap();
        assert_eq!(ledger.shared.chain.read().entries()[2].hash, original);

        let report = ledger.clear_quarantine("ops-team").unwrap();
        assert!(report.valid);
        assert!(ledger.health().is_healthy());

        ledger
            .append(DecisionPayload::aml("1234567890"))
            .await
            .unwrap();
        assert_eq!(ledger.len(), 4);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_append_at_and_entries_between() {
        let (ledger, _dir) = create_test_ledger().await;
        let base = Utc::now() - chrono::Duration::days(3);
        for i in 0..3 {
            ledger
                .append_at(
                    DecisionPayload::procurement("1234567890"),
                    base + chrono::Duration::days(i),
                )
                .await
                .unwrap();
        }

        let window = ledger.entries_between(base, base + chrono::Duration::hours(30));
        assert_eq!(window.len(), 2);

        let range = ledger.verify_range(base, base + chrono::Duration::days(5), Some("procurement"));
        assert_eq!(range.entries_count, 3);
        assert!(range.valid);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_restores_chain() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let ledger = Ledger::open(config.clone()).await.unwrap();
        let id = ledger
            .append(DecisionPayload::procurement("1234567890"))
            .await
            .unwrap();
        let tail = ledger.latest_hash();
        ledger.shutdown().await.unwrap();

        let reopened = Ledger::open(config).await.unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.latest_hash(), tail);
        assert!(reopened.get_entry(&id).is_ok());
        reopened.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_chain_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        std::fs::write(config.chain_path(), b"garbage").unwrap();

        let ledger = Ledger::open(config.clone()).await.unwrap();
        assert!(ledger.is_empty());
        assert!(ledger.load_warning().is_some());

        ledger
            .append(DecisionPayload::procurement("1234567890"))
            .await
            .unwrap();
        ledger.shutdown().await.unwrap();

        let aside: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().contains(".unreadable_"))
            .collect();
        assert_eq!(aside.len(), 1);
        assert_eq!(std::fs::read(&aside[0]).unwrap(), b"garbage");

        let reopened = Ledger::open(config).await.unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.load_warning().is_none());
        reopened.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reserved_field_keeps_chain_reopenable() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let ledger = Ledger::open(config.clone()).await.unwrap();
        let kept = ledger
            .append(DecisionPayload::procurement("1234567890"))
            .await
            .unwrap();
        let err = ledger
            .append(DecisionPayload::procurement("1234567890").with_field("alert_type", "bias_detection"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
        ledger.shutdown().await.unwrap();

        let reopened = Ledger::open(config).await.unwrap();
        assert!(reopened.load_warning().is_none());
        assert_eq!(reopened.len(), 1);
        assert!(reopened.get_entry(&kept).is_ok());
        reopened.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_scans_snapshot_while_appends_continue() {
        let (ledger, _dir) = create_test_ledger().await;
        for _ in 0..3 {
            ledger
                .append(DecisionPayload::aml("1234567890"))
                .await
                .unwrap();
        }

        let snapshot = ledger.snapshot();
        ledger
            .append(DecisionPayload::aml("1234567890"))
            .await
            .unwrap();

        assert_eq!(snapshot.len(), 3);
        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.snapshot()[..3], snapshot[..]);
        assert!(ledger.verify_all().unwrap().valid);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_suspension_guard_resumes_on_drop() {
        let (ledger, _dir) = create_test_ledger().await;

        let guard = ledger.suspend_writes("backup restore").await.unwrap();
        let err = ledger
            .append(DecisionPayload::sharia("1234567890"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WritesSuspended(_)));
        assert!(matches!(
            ledger.suspend_writes("second").await,
            Err(Error::WritesSuspended(_))
        ));

        drop(guard);
        ledger
            .append(DecisionPayload::sharia("1234567890"))
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_while_quarantined() {
        let (ledger, _dir) = create_test_ledger().await;
        for _ in 0..3 {
            ledger
                .append(DecisionPayload::procurement("1234567890"))
                .await
                .unwrap();
        }
        let good = ledger.entries();
        ledger.shared.chain.write().entries_mut()[0].hash = "bad".to_string();
        assert!(!ledger.verify_all().unwrap().valid);

        assert_eq!(ledger.restore(good[..2].to_vec()).await.unwrap(), 2);
        assert_eq!(ledger.entries(), good[..2].to_vec());
        assert!(ledger.clear_quarantine("ops-team").unwrap().valid);

        ledger.shutdown().await.unwrap();
    }
}
