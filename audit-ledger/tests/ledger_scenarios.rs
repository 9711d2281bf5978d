//! End-to-end ledger scenarios against a real data directory

use audit_ledger::{
    chain::compute_hash, ChainHealth, ChainStore, Config, DecisionPayload, Error, Ledger,
    GENESIS_HASH,
};
use chrono::Utc;
use std::collections::HashSet;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.data_dir = dir.path().to_path_buf();
    config.batching.enabled = false;
    config
}

#[tokio::test]
async fn test_tampered_hash_on_disk_is_detected_after_reload() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let ledger = Ledger::open(config.clone()).await.unwrap();

    for i in 0..5 {
        ledger
            .append(DecisionPayload::procurement(format!("123456789{}", i)))
            .await
            .unwrap();
    }
    let report = ledger.verify_all().unwrap();
    assert_eq!(report.entries_count, 5);
    assert!(report.valid);

    // Corrupt entry 2 directly in the chain file
    let store = ChainStore::open(config.chain_path()).unwrap();
    let mut entries = store.load().unwrap();
    entries[2].hash = "0".repeat(64);
    store.save(&entries).unwrap();

    assert_eq!(ledger.reload().await.unwrap(), 5);
    let report = ledger.verify_all().unwrap();

    assert!(!report.valid);
    assert!(report.corrupted_positions().contains(&2));
    assert!((report.integrity_score - 0.8).abs() < 1e-9);
    assert!(matches!(ledger.health(), ChainHealth::Quarantined { .. }));

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fifty_sequential_appends() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::open(test_config(&dir)).await.unwrap();

    let mut ids = HashSet::new();
    for _ in 0..50 {
        let id = ledger
            .append(DecisionPayload::aml("1234567890"))
            .await
            .unwrap();
        assert!(ids.insert(id));
    }

    let chain = ledger.entries();
    assert_eq!(chain.len(), 50);
    for i in 1..chain.len() {
        assert_eq!(chain[i].previous_hash, chain[i - 1].hash);
    }

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_genesis_determinism() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::open(test_config(&dir)).await.unwrap();

    assert_eq!(ledger.latest_hash(), GENESIS_HASH);
    assert_eq!(ledger.latest_hash(), GENESIS_HASH);

    let id = ledger
        .append(DecisionPayload::sharia("1234567890"))
        .await
        .unwrap();
    assert_eq!(ledger.get_entry(&id).unwrap().previous_hash, GENESIS_HASH);

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_relinked_entry_is_broken_link() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let ledger = Ledger::open(config.clone()).await.unwrap();
    for _ in 0..4 {
        ledger
            .append(DecisionPayload::procurement("1234567890"))
            .await
            .unwrap();
    }

    let store = ChainStore::open(config.chain_path()).unwrap();
    let mut entries = store.load().unwrap();
    entries[3].previous_hash = "f".repeat(64);
    store.save(&entries).unwrap();
    ledger.reload().await.unwrap();

    let report = ledger.verify_all().unwrap();
    assert!(report
        .corrupted_entries
        .iter()
        .any(|c| c.position == 3 && c.is_broken_link()));

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_idempotent_reload() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let ledger = Ledger::open(config.clone()).await.unwrap();
    for i in 0..10 {
        ledger
            .append(DecisionPayload::procurement("1234567890").with_field("round", i))
            .await
            .unwrap();
    }
    let before = ledger.verify_all().unwrap();
    let hashes: Vec<String> = ledger.entries().into_iter().map(|e| e.hash).collect();
    ledger.shutdown().await.unwrap();

    let reopened = Ledger::open(config).await.unwrap();
    let after = reopened.verify_all().unwrap();
    assert_eq!(before.integrity_score, after.integrity_score);

    let reloaded: Vec<String> = reopened.entries().into_iter().map(|e| e.hash).collect();
    assert_eq!(hashes, reloaded);
    for entry in reopened.entries() {
        assert_eq!(compute_hash(&entry).unwrap(), entry.hash);
    }

    reopened.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_monotonic_positions_under_concurrent_reads() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::open(test_config(&dir)).await.unwrap();

    let reader = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let snapshot = ledger.entries();
                for (i, entry) in snapshot.iter().enumerate() {
                    assert_eq!(entry.chain_position, i as u64);
                }
                let _ = ledger.verify_all();
                tokio::task::yield_now().await;
            }
        })
    };

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    ledger
                        .append(DecisionPayload::procurement(format!("100000000{}", w)))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.await.unwrap();
    }
    reader.await.unwrap();

    let chain = ledger.entries();
    assert_eq!(chain.len(), 40);
    for (i, entry) in chain.iter().enumerate() {
        assert_eq!(entry.chain_position, i as u64);
    }
    assert!(ledger.verify_all().unwrap().valid);

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_quarantine_blocks_until_cleared() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let ledger = Ledger::open(config.clone()).await.unwrap();
    for _ in 0..3 {
        ledger
            .append(DecisionPayload::procurement("1234567890"))
            .await
            .unwrap();
    }
    let pristine = ChainStore::open(config.chain_path())
        .unwrap()
        .load()
        .unwrap();

    let store = ChainStore::open(config.chain_path()).unwrap();
    let mut tampered = pristine.clone();
    tampered[1].data = tampered[1].data.clone().with_field("approved", true);
    store.save(&tampered).unwrap();
    ledger.reload().await.unwrap();
    assert!(!ledger.verify_all().unwrap().valid);

    let err = ledger
        .append(DecisionPayload::procurement("1234567890"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WritesDisabled { corrupted_count: 1, .. }));

    // Restore the pristine chain, then the operator clears the flag
    store.save(&pristine).unwrap();
    ledger.reload().await.unwrap();
    ledger.clear_quarantine("compliance-officer").unwrap();

    ledger
        .append(DecisionPayload::procurement("1234567890"))
        .await
        .unwrap();
    assert_eq!(ledger.len(), 4);

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_batched_ledger_persists_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.batching.enabled = true;
    config.batching.max_batch_size = 1000;
    config.batching.batch_timeout_ms = 60_000;

    let ledger = Ledger::open(config.clone()).await.unwrap();
    for _ in 0..5 {
        ledger
            .append(DecisionPayload::procurement("1234567890"))
            .await
            .unwrap();
    }
    assert_eq!(ledger.len(), 5);
    // No flush: shutdown itself must wait for the final persist
    ledger.shutdown().await.unwrap();

    let reopened = Ledger::open(config).await.unwrap();
    assert_eq!(reopened.len(), 5);
    reopened.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_daily_statistics_today() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::open(test_config(&dir)).await.unwrap();

    let now = Utc::now();
    ledger
        .append_at(DecisionPayload::procurement("1234567890"), now)
        .await
        .unwrap();
    ledger
        .append_at(DecisionPayload::aml("1234567890"), now)
        .await
        .unwrap();

    let stats = ledger.daily_statistics(now.date_naive());
    assert_eq!(stats.total_decisions, 2);
    assert_eq!(stats.decision_types["procurement"], 1);
    assert_eq!(stats.decision_types["aml"], 1);

    ledger.shutdown().await.unwrap();
}
