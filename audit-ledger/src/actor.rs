//! Actor-based single writer for the chain
//!
//! Every mutation of the chain (append, reload, restore, persist) is a message
//! handled by one task, so two submissions can never race on `chain_position`
//! or `previous_hash`, and a restored chain can never be overwritten by a
//! stale in-memory one. Readers go straight to the shared [`ChainState`]
//! behind a read lock and see the chain either before or after an append,
//! never a partially applied one.
//!
//! [`ChainState`]: crate::ledger::ChainState
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        Ledger (Clone) - many concurrent callers       │
//! └───────────────┬──────────────────────┬───────────────┘
//!                 │ writes               │ reads
//!                 ▼                      │
//! ┌───────────────────────────────┐      │
//! │     LedgerHandle (Clone)      │      │
//! └───────────────┬───────────────┘      │
//!                 │ mpsc (bounded)       │
//!                 ▼                      ▼
//! ┌───────────────────────────────┐   ┌─────────────────┐
//! │  LedgerActor (single task)    │──▶│ RwLock<Chain>   │
//! │  hash → push → persist        │   └─────────────────┘
//! └───────────────┬───────────────┘
//!                 ▼
//!       ChainStore::save (temp + rename)
//! ```

use crate::{
    chain::{compute_hash, generate_alert_id, generate_entry_id, retention_deadline},
    config::Config,
    ledger::SharedState,
    metrics::Metrics,
    storage::ChainStore,
    types::{ChainHealth, DecisionPayload, LedgerEntry},
    Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Duration};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Append a new entry
    Append {
        payload: DecisionPayload,
        timestamp: Option<DateTime<Utc>>,
        response: oneshot::Sender<Result<String>>,
    },

    /// Persist any unpersisted appends now
    Flush {
        response: oneshot::Sender<Result<()>>,
    },

    /// Replace the in-memory chain with the durable one
    Reload {
        response: oneshot::Sender<Result<usize>>,
    },

    /// Persist pending appends, then refuse appends until resumed
    Suspend {
        reason: String,
        response: oneshot::Sender<Result<()>>,
    },

    /// Persist `entries` as the chain and adopt them in memory
    Restore {
        entries: Vec<LedgerEntry>,
        response: oneshot::Sender<Result<usize>>,
    },

    /// Persist pending appends and stop
    Shutdown {
        response: oneshot::Sender<Result<()>>,
    },
}

/// Actor that owns chain mutation
#[derive(Debug)]
pub struct LedgerActor {
    shared: Arc<SharedState>,
    store: ChainStore,
    mailbox: mpsc::Receiver<LedgerMessage>,
    config: Arc<Config>,
    metrics: Metrics,
    /// Appends not yet persisted (batching mode only)
    pending: usize,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        shared: Arc<SharedState>,
        store: ChainStore,
        mailbox: mpsc::Receiver<LedgerMessage>,
        config: Arc<Config>,
        metrics: Metrics,
    ) -> Self {
        Self {
            shared,
            store,
            mailbox,
            config,
            metrics,
            pending: 0,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let batching = self.config.batching.enabled;
        let mut batch_timer = interval(Duration::from_millis(
            self.config.batching.batch_timeout_ms.max(1),
        ));
        batch_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(msg) = self.mailbox.recv() => match msg {
                    LedgerMessage::Shutdown { response } => {
                        let result = self.persist_pending();
                        if let Err(e) = &result {
                            tracing::error!("Error persisting chain on shutdown: {}", e);
                        }
                        let _ = response.send(result);
                        break;
                    }
                    other => self.handle_message(other),
                },

                _ = batch_timer.tick(), if batching && self.pending > 0 => {
                    if let Err(e) = self.persist_pending() {
                        tracing::error!("Error persisting batch on timeout: {}", e);
                    }
                }

                else => {
                    if let Err(e) = self.persist_pending() {
                        tracing::error!("Error persisting chain after mailbox closed: {}", e);
                    }
                    break;
                }
            }
        }

        tracing::debug!("Ledger actor stopped");
    }

    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Append {
                payload,
                timestamp,
                response,
            } => {
                let _ = response.send(self.append(payload, timestamp));
            }

            LedgerMessage::Flush { response } => {
                let _ = response.send(self.persist_pending());
            }

            LedgerMessage::Reload { response } => {
                let _ = response.send(self.reload());
            }

            LedgerMessage::Suspend { reason, response } => {
                let _ = response.send(self.suspend(reason));
            }

            LedgerMessage::Restore { entries, response } => {
                let _ = response.send(self.restore(entries));
            }

            LedgerMessage::Shutdown { response } => {
                // Handled in main loop
                let _ = response.send(Ok(()));
            }
        }
    }

    fn append(
        &mut self,
        payload: DecisionPayload,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let started = Instant::now();

        if let ChainHealth::Quarantined {
            since,
            corrupted_count,
            ..
        } = &*self.shared.health.read()
        {
            return Err(Error::WritesDisabled {
                since: *since,
                corrupted_count: *corrupted_count,
            });
        }
        if let Some(reason) = &*self.shared.suspended.read() {
            return Err(Error::WritesSuspended(reason.clone()));
        }
        payload.validate()?;

        let timestamp = timestamp.unwrap_or_else(Utc::now);
        let retention_until = retention_deadline(timestamp, self.config.chain.retention_years)
            .ok_or_else(|| {
                Error::Encoding(format!("retention period overflows from {}", timestamp))
            })?;
        let (position, previous_hash) = {
            let chain = self.shared.chain.read();
            (
                chain.len() as u64,
                chain.latest_hash(&self.config.chain.genesis_hash),
            )
        };

        let id = match &payload {
            DecisionPayload::BiasAlert(_) => generate_alert_id(timestamp, position),
            other => generate_entry_id(other.decision_type(), other.user_id(), timestamp, position),
        };

        let mut entry = LedgerEntry {
            id,
            data: payload,
            timestamp,
            previous_hash,
            hash: String::new(),
            chain_position: position,
            retention_until,
        };
        entry.hash = compute_hash(&entry)?;
        let entry_id = entry.id.clone();

        let chain_len = {
            let mut chain = self.shared.chain.write();
            if chain.contains(&entry_id) {
                return Err(Error::Encoding(format!("duplicate entry id {}", entry_id)));
            }
            chain.push(entry);

            if !self.config.batching.enabled {
                if let Err(e) = self.store.save(chain.entries()) {
                    chain.pop();
                    return Err(e);
                }
            }
            chain.len()
        };

        if self.config.batching.enabled {
            self.pending += 1;
            if self.pending >= self.config.batching.max_batch_size {
                if let Err(e) = self.persist_pending() {
                    tracing::error!(entry_id = %entry_id, "Error persisting full batch: {}", e);
                }
            }
        }

        let elapsed = started.elapsed();
        self.metrics.record_append(elapsed.as_secs_f64(), chain_len);

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        if elapsed_ms > self.config.performance.max_append_ms as f64 {
            self.metrics.record_sla_violation();
            tracing::warn!(
                entry_id = %entry_id,
                elapsed_ms,
                limit_ms = self.config.performance.max_append_ms,
                "Append exceeded its time budget"
            );
        }

        tracing::debug!(entry_id = %entry_id, position, "Entry appended");
        Ok(entry_id)
    }

    fn persist_pending(&mut self) -> Result<()> {
        if self.config.batching.enabled && self.pending == 0 {
            return Ok(());
        }

        // Only this task mutates the chain, so the snapshot stays current
        let snapshot = self.shared.chain.read().snapshot();
        self.store.save(&snapshot)?;
        tracing::debug!(entries = snapshot.len(), flushed = self.pending, "Chain flushed");
        self.pending = 0;
        Ok(())
    }

    fn suspend(&mut self, reason: String) -> Result<()> {
        if let Some(active) = &*self.shared.suspended.read() {
            return Err(Error::WritesSuspended(active.clone()));
        }
        self.persist_pending()?;

        tracing::warn!(reason = %reason, "Appends suspended");
        *self.shared.suspended.write() = Some(reason);
        Ok(())
    }

    fn restore(&mut self, entries: Vec<LedgerEntry>) -> Result<usize> {
        let count = entries.len();
        self.store.save(&entries)?;

        self.shared.chain.write().replace(entries);
        self.pending = 0;
        self.metrics.set_chain_length(count);

        tracing::info!(
            path = %self.store.path().display(),
            entries = count,
            "Chain restored"
        );
        Ok(count)
    }

    fn reload(&mut self) -> Result<usize> {
        let entries = self.store.load()?;
        let count = entries.len();

        self.shared.chain.write().replace(entries);
        self.pending = 0;
        self.metrics.set_chain_length(count);

        tracing::info!(
            path = %self.store.path().display(),
            entries = count,
            "Chain reloaded from durable storage"
        );
        Ok(count)
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    /// Append an entry
    pub async fn append(
        &self,
        payload: DecisionPayload,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Append {
                payload,
                timestamp,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Persist unpersisted appends
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Flush { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Reload the chain from durable storage
    pub async fn reload(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Reload { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Refuse appends after everything queued so far is persisted
    pub async fn suspend(&self, reason: String) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Suspend {
                reason,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Replace the chain, on disk and in memory
    pub async fn restore(&self, entries: Vec<LedgerEntry>) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Restore {
                entries,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor, returning once pending appends are persisted
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    shared: Arc<SharedState>,
    store: ChainStore,
    config: Arc<Config>,
    metrics: Metrics,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = LedgerActor::new(shared, store, rx, config, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ChainState;
    use tempfile::TempDir;

    fn setup(batching: bool) -> (LedgerHandle, Arc<SharedState>, ChainStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.batching.enabled = batching;
        config.batching.max_batch_size = 3;
        config.batching.batch_timeout_ms = 10_000;

        let store = ChainStore::open(config.chain_path()).unwrap();
        let shared = Arc::new(SharedState::new(ChainState::default()));
        let handle = spawn_ledger_actor(
            shared.clone(),
            store.clone(),
            Arc::new(config),
            Metrics::new().unwrap(),
        );
        (handle, shared, store, temp_dir)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (handle, _shared, _store, _dir) = setup(false);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unbatched_append_is_durable() {
        let (handle, shared, store, _dir) = setup(false);

        let id = handle
            .append(DecisionPayload::procurement("1234567890"), None)
            .await
            .unwrap();

        assert_eq!(shared.chain.read().len(), 1);
        let on_disk = store.load().unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].id, id);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_batched_appends_persist_when_full() {
        let (handle, shared, store, _dir) = setup(true);

        for i in 0..2 {
            handle
                .append(DecisionPayload::sharia(format!("10000000{}", i)), None)
                .await
                .unwrap();
        }
        assert_eq!(shared.chain.read().len(), 2);
        assert!(store.load().unwrap().is_empty());

        handle
            .append(DecisionPayload::sharia("100000002"), None)
            .await
            .unwrap();
        assert_eq!(store.load().unwrap().len(), 3);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_persists_partial_batch() {
        let (handle, _shared, store, _dir) = setup(true);

        handle
            .append(DecisionPayload::aml("1234567890"), None)
            .await
            .unwrap();
        handle.flush().await.unwrap();
        assert_eq!(store.load().unwrap().len(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_quarantine_rejects_appends() {
        let (handle, shared, _store, _dir) = setup(false);

        *shared.health.write() = ChainHealth::Quarantined {
            since: Utc::now(),
            report_path: None,
            corrupted_count: 1,
        };

        let err = handle
            .append(DecisionPayload::procurement("1234567890"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WritesDisabled { corrupted_count: 1, .. }));
        assert_eq!(shared.chain.read().len(), 0);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_batched_persist() {
        let (handle, _shared, store, _dir) = setup(true);

        handle
            .append(DecisionPayload::aml("1234567890"), None)
            .await
            .unwrap();
        assert!(store.load().unwrap().is_empty());

        handle.shutdown().await.unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reserved_field_append_rejected() {
        let (handle, shared, store, _dir) = setup(false);

        handle
            .append(DecisionPayload::procurement("1234567890"), None)
            .await
            .unwrap();
        let err = handle
            .append(
                DecisionPayload::procurement("1234567890").with_field("alert_type", "bias_detection"),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
        assert_eq!(shared.chain.read().len(), 1);

        // The file stays decodable
        assert_eq!(store.load().unwrap().len(), 1);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_suspend_flushes_then_rejects_appends() {
        let (handle, shared, store, _dir) = setup(true);

        handle
            .append(DecisionPayload::sharia("1234567890"), None)
            .await
            .unwrap();
        handle.suspend("maintenance".to_string()).await.unwrap();
        assert_eq!(store.load().unwrap().len(), 1);

        let err = handle
            .append(DecisionPayload::sharia("1234567890"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WritesSuspended(ref r) if r == "maintenance"));
        assert!(matches!(
            handle.suspend("again".to_string()).await,
            Err(Error::WritesSuspended(_))
        ));

        *shared.suspended.write() = None;
        handle
            .append(DecisionPayload::sharia("1234567890"), None)
            .await
            .unwrap();
        assert_eq!(shared.chain.read().len(), 2);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_replaces_chain_on_disk_and_in_memory() {
        let (handle, shared, store, _dir) = setup(false);

        for _ in 0..4 {
            handle
                .append(DecisionPayload::procurement("1234567890"), None)
                .await
                .unwrap();
        }
        let head = store.load().unwrap()[..2].to_vec();

        *shared.suspended.write() = Some("recovery".to_string());
        assert_eq!(handle.restore(head.clone()).await.unwrap(), 2);
        *shared.suspended.write() = None;

        assert_eq!(shared.chain.read().entries(), &head[..]);
        assert_eq!(store.load().unwrap(), head);

        let id = handle
            .append(DecisionPayload::procurement("1234567890"), None)
            .await
            .unwrap();
        let chain = shared.chain.read();
        assert_eq!(chain.get(&id).unwrap().previous_hash, head[1].hash);
        assert_eq!(chain.len(), 3);
        drop(chain);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reload_replaces_chain() {
        let (handle, shared, store, _dir) = setup(false);

        for _ in 0..3 {
            handle
                .append(DecisionPayload::procurement("1234567890"), None)
                .await
                .unwrap();
        }
        let entries = store.load().unwrap();
        store.save(&entries[..1]).unwrap();

        assert_eq!(handle.reload().await.unwrap(), 1);
        assert_eq!(shared.chain.read().len(), 1);

        handle.shutdown().await.unwrap();
    }
}
