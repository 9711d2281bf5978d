//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Chain integrity: any sequence of appends yields a valid, linked chain
//! - Tamper evidence: mutating any stored field of any entry is detected
//! - Durability: persist then reload reproduces the chain and its hashes
//! - Canonical hashing: field insertion order never changes a hash

use audit_ledger::{
    chain::{canonical_json, compute_hash},
    verify::verify_chain,
    ChainStore, Config, DecisionPayload, Ledger, LedgerEntry, GENESIS_HASH,
};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::time::Duration;
use tempfile::TempDir;

/// Strategy for generating submitter ids (national id / iqama shaped)
fn user_id_strategy() -> impl Strategy<Value = String> {
    "[12][0-9]{9}"
}

/// Strategy for generating extra payload fields
fn fields_strategy() -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::vec(
        (
            "[a-z_]{1,12}".prop_filter("reserved key", |k| {
                !matches!(k.as_str(), "decision_type" | "user_id" | "alert_type")
            }),
            prop_oneof![
                any::<i64>().prop_map(Value::from),
                "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
                any::<bool>().prop_map(Value::from),
            ],
        ),
        0..6,
    )
}

/// Strategy for generating decision payloads
fn payload_strategy() -> impl Strategy<Value = DecisionPayload> {
    (
        prop_oneof![
            Just("procurement"),
            Just("sharia"),
            Just("aml"),
            Just("zakat"),
        ],
        user_id_strategy(),
        fields_strategy(),
    )
        .prop_map(|(kind, user_id, fields)| {
            let mut payload = match kind {
                "procurement" => DecisionPayload::procurement(user_id),
                "sharia" => DecisionPayload::sharia(user_id),
                "aml" => DecisionPayload::aml(user_id),
                other => DecisionPayload::from_value(
                    serde_json::json!({"decision_type": other, "user_id": user_id}),
                )
                .unwrap(),
            };
            for (key, value) in fields {
                payload = payload.with_field(key, value);
            }
            payload
        })
}

/// Create test ledger with temp directory
async fn create_test_ledger() -> (Ledger, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config.batching.enabled = false; // Every append durable before it returns

    (Ledger::open(config).await.unwrap(), temp_dir)
}

/// Append payloads and return the resulting chain
fn build_chain(payloads: Vec<DecisionPayload>) -> Vec<LedgerEntry> {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (ledger, _dir) = create_test_ledger().await;
        for payload in payloads {
            ledger.append(payload).await.unwrap();
        }
        let entries = ledger.entries();
        ledger.shutdown().await.unwrap();
        entries
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: Appended chains are always valid and densely positioned
    #[test]
    fn prop_appends_form_valid_chain(payloads in prop::collection::vec(payload_strategy(), 1..20)) {
        let n = payloads.len();
        let entries = build_chain(payloads);

        prop_assert_eq!(entries.len(), n);
        prop_assert_eq!(&entries[0].previous_hash, GENESIS_HASH);
        for (i, entry) in entries.iter().enumerate() {
            prop_assert_eq!(entry.chain_position, i as u64);
            prop_assert_eq!(&compute_hash(entry).unwrap(), &entry.hash);
            if i > 0 {
                prop_assert_eq!(&entry.previous_hash, &entries[i - 1].hash);
            }
        }

        let report = verify_chain(&entries, GENESIS_HASH, Duration::from_secs(3));
        prop_assert!(report.valid);
        prop_assert_eq!(report.integrity_score, 1.0);
    }

    /// Property: Tampering with any entry is detected at its position
    #[test]
    fn prop_tampering_detected(
        payloads in prop::collection::vec(payload_strategy(), 2..12),
        target in any::<prop::sample::Index>(),
        kind in 0u8..4,
    ) {
        let mut entries = build_chain(payloads);
        let i = target.index(entries.len());

        match kind {
            0 => entries[i].hash = "0".repeat(64),
            1 => entries[i].data = entries[i].data.clone().with_field("tampered", true),
            2 => entries[i].previous_hash = "f".repeat(64),
            _ => entries[i].timestamp += chrono::Duration::seconds(1),
        }

        let report = verify_chain(&entries, GENESIS_HASH, Duration::from_secs(3));
        prop_assert!(!report.valid);
        prop_assert!(report.corrupted_positions().contains(&(i as u64)));
        prop_assert!(report.integrity_score < 1.0);
    }

    /// Property: Persist then load reproduces the chain exactly
    #[test]
    fn prop_reload_round_trip(payloads in prop::collection::vec(payload_strategy(), 0..15)) {
        let entries = build_chain(payloads);

        let dir = TempDir::new().unwrap();
        let store = ChainStore::open(dir.path().join("chain.json.gz")).unwrap();
        store.save(&entries).unwrap();
        let loaded = store.load().unwrap();

        prop_assert_eq!(&loaded, &entries);
        for entry in &loaded {
            prop_assert_eq!(&compute_hash(entry).unwrap(), &entry.hash);
        }
    }

    /// Property: Canonical form ignores field insertion order
    #[test]
    fn prop_canonical_ignores_order(fields in fields_strategy()) {
        let forward: Map<String, Value> = fields.iter().cloned().collect();
        let backward: Map<String, Value> = fields.iter().rev().cloned().collect();

        // Later duplicates win in `collect`, so compare only when keys are unique
        let unique = forward.len() == fields.len();
        prop_assume!(unique);

        prop_assert_eq!(
            canonical_json(&Value::Object(forward)),
            canonical_json(&Value::Object(backward))
        );
    }
}
