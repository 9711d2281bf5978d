//! Append and verification latency benchmarks.
//!
//! Append covers hash + push + atomic persist of the whole chain file, so its
//! cost grows with chain length. Verification is measured at several sizes.

#![allow(missing_docs)]

use audit_ledger::{
    chain::{compute_hash, retention_deadline},
    verify::verify_chain, Config, DecisionPayload, Ledger, LedgerEntry,
    GENESIS_HASH,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

fn sample_payload(i: u64) -> DecisionPayload {
    DecisionPayload::procurement("1234567890")
        .with_field("tender_id", format!("T-{i}"))
        .with_field("score", 0.75)
        .with_field("approved", i % 3 != 0)
}

fn build_chain(n: u64) -> Vec<LedgerEntry> {
    let base = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
    let mut entries: Vec<LedgerEntry> = Vec::with_capacity(n as usize);
    for i in 0..n {
        let timestamp = base + ChronoDuration::seconds(i as i64);
        let mut entry = LedgerEntry {
            id: format!("procurement_1234567890_{i}"),
            data: sample_payload(i),
            timestamp,
            previous_hash: entries
                .last()
                .map(|e| e.hash.clone())
                .unwrap_or_else(|| GENESIS_HASH.to_string()),
            hash: String::new(),
            chain_position: i,
            retention_until: retention_deadline(timestamp, 7).unwrap(),
        };
        entry.hash = compute_hash(&entry).unwrap();
        entries.push(entry);
    }
    entries
}

/// Benchmark hashing a single entry.
fn bench_compute_hash(c: &mut Criterion) {
    let entry = build_chain(1).remove(0);
    c.bench_function("chain/compute_hash", |b| {
        b.iter(|| compute_hash(black_box(&entry)));
    });
}

/// Benchmark a full append through the writer actor at several chain lengths.
fn bench_append(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("ledger/append");

    for existing in [0u64, 100, 1000] {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();

        let ledger = rt.block_on(async {
            let ledger = Ledger::open(config).await.unwrap();
            for i in 0..existing {
                ledger.append(sample_payload(i)).await.unwrap();
            }
            ledger
        });

        group.bench_with_input(BenchmarkId::from_parameter(existing), &ledger, |b, ledger| {
            b.iter(|| {
                rt.block_on(ledger.append(black_box(sample_payload(7))))
                    .unwrap()
            });
        });

        rt.block_on(ledger.shutdown()).unwrap();
    }

    group.finish();
}

/// Benchmark full-chain verification at several sizes.
fn bench_verify_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify/all");

    for size in [100u64, 1000, 10_000] {
        let chain = build_chain(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &chain, |b, chain| {
            b.iter(|| verify_chain(black_box(chain), GENESIS_HASH, Duration::from_secs(3)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compute_hash, bench_append, bench_verify_all);
criterion_main!(benches);
