//! Integrity verification
//!
//! A full scan recomputes every entry's hash and checks every link to its
//! predecessor, with the first entry linking to the genesis sentinel. A
//! range scan only checks hash self-consistency of the
//! matching entries; link breaks just outside the window are invisible to it.
//!
//! Scans check elapsed time after every entry and stop with a result flagged
//! `partial_verification` once the budget is spent. There is no cancellation.

use crate::{chain::compute_hash, types::LedgerEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// What went wrong at a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorruptionKind {
    /// Stored hash differs from the recomputed one
    HashMismatch {
        /// Recomputed hash
        expected_hash: String,
        /// Stored hash
        actual_hash: String,
    },
    /// `previous_hash` differs from the predecessor's stored hash (the
    /// genesis sentinel at position 0)
    BrokenLink {
        /// Predecessor's stored hash
        expected_previous_hash: String,
        /// This entry's `previous_hash`
        actual_previous_hash: String,
    },
    /// Entry could not be re-encoded for hashing
    Unhashable {
        /// Encoder error
        reason: String,
    },
}

/// One corruption finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptedEntry {
    /// Position in the chain
    pub position: u64,
    /// Entry id
    pub entry_id: String,
    /// Entry timestamp
    pub timestamp: DateTime<Utc>,
    /// Finding
    #[serde(flatten)]
    pub kind: CorruptionKind,
}

impl CorruptedEntry {
    /// Whether this finding is a broken chain link
    pub fn is_broken_link(&self) -> bool {
        matches!(self.kind, CorruptionKind::BrokenLink { .. })
    }
}

/// Result of a full-chain scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// No corruption found and the scan covered the whole chain
    pub valid: bool,
    /// Entries in the chain
    pub entries_count: usize,
    /// Entries examined before the scan finished or ran out of budget
    pub entries_checked: usize,
    /// `1 - corrupted_positions / entries_checked` (1.0 for an empty chain)
    pub integrity_score: f64,
    /// Every finding, in chain order
    pub corrupted_entries: Vec<CorruptedEntry>,
    /// Distinct corrupted positions counted by the score
    pub corrupted_count: usize,
    /// Budget ran out before the end of the chain
    pub partial_verification: bool,
    /// Wall-clock time spent
    pub verification_time_ms: f64,
}

impl IntegrityReport {
    /// Positions flagged by any finding
    pub fn corrupted_positions(&self) -> BTreeSet<u64> {
        self.corrupted_entries.iter().map(|c| c.position).collect()
    }
}

/// Result of a time-range scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeReport {
    /// No matching entry failed its hash check
    pub valid: bool,
    /// Entries matching the window and filter
    pub entries_count: usize,
    /// `1 - corrupted / max(matching, 1)`
    pub integrity_score: f64,
    /// Hash mismatches among matching entries
    pub corrupted_entries: Vec<CorruptedEntry>,
    /// Window start (inclusive)
    pub start: DateTime<Utc>,
    /// Window end (inclusive)
    pub end: DateTime<Utc>,
    /// Decision type filter, if any
    pub decision_type: Option<String>,
}

fn hash_finding(entry: &LedgerEntry) -> Option<CorruptedEntry> {
    let kind = match compute_hash(entry) {
        Ok(expected) if expected == entry.hash => return None,
        Ok(expected) => CorruptionKind::HashMismatch {
            expected_hash: expected,
            actual_hash: entry.hash.clone(),
        },
        Err(e) => CorruptionKind::Unhashable {
            reason: e.to_string(),
        },
    };

    Some(CorruptedEntry {
        position: entry.chain_position,
        entry_id: entry.id.clone(),
        timestamp: entry.timestamp,
        kind,
    })
}

/// Scan the whole chain within `budget`.
///
/// A position counts as corrupted when its own hash fails, or when its link
/// is broken while its predecessor's hash is intact. A broken link right
/// after a tampered entry is reported but not counted twice. The first entry
/// must link to `genesis`, so a chain with its head cut off does not verify.
pub fn verify_chain(entries: &[LedgerEntry], genesis: &str, budget: Duration) -> IntegrityReport {
    let started = Instant::now();

    let mut findings = Vec::new();
    let mut corrupted: BTreeSet<usize> = BTreeSet::new();
    let mut previous_intact = true;
    let mut checked = 0;
    let mut partial = false;

    for (i, entry) in entries.iter().enumerate() {
        let own = hash_finding(entry);
        let intact = own.is_none();
        if let Some(finding) = own {
            corrupted.insert(i);
            findings.push(finding);
        }

        let expected_previous = match i {
            0 => genesis,
            _ => entries[i - 1].hash.as_str(),
        };
        if entry.previous_hash != expected_previous {
            if previous_intact {
                corrupted.insert(i);
            }
            findings.push(CorruptedEntry {
                position: entry.chain_position,
                entry_id: entry.id.clone(),
                timestamp: entry.timestamp,
                kind: CorruptionKind::BrokenLink {
                    expected_previous_hash: expected_previous.to_string(),
                    actual_previous_hash: entry.previous_hash.clone(),
                },
            });
        }

        previous_intact = intact;
        checked = i + 1;

        if started.elapsed() > budget && checked < entries.len() {
            partial = true;
            break;
        }
    }

    let integrity_score = if checked == 0 {
        1.0
    } else {
        1.0 - corrupted.len() as f64 / checked as f64
    };

    let elapsed = started.elapsed();
    if partial {
        tracing::warn!(
            checked,
            total = entries.len(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            budget_ms = budget.as_millis() as u64,
            "Verification budget exceeded, returning partial result"
        );
    }

    IntegrityReport {
        valid: corrupted.is_empty() && !partial,
        entries_count: entries.len(),
        entries_checked: checked,
        integrity_score,
        corrupted_entries: findings,
        corrupted_count: corrupted.len(),
        partial_verification: partial,
        verification_time_ms: elapsed.as_secs_f64() * 1000.0,
    }
}

/// Check hash self-consistency of entries in `[start, end]`, optionally
/// restricted to one decision type
pub fn verify_range(
    entries: &[LedgerEntry],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    decision_type: Option<&str>,
) -> RangeReport {
    let matching: Vec<&LedgerEntry> = entries
        .iter()
        .filter(|e| e.timestamp >= start && e.timestamp <= end)
        .filter(|e| decision_type.map_or(true, |t| e.data.decision_type() == t))
        .collect();

    let corrupted: Vec<CorruptedEntry> = matching.iter().filter_map(|e| hash_finding(e)).collect();

    RangeReport {
        valid: corrupted.is_empty(),
        entries_count: matching.len(),
        integrity_score: 1.0 - corrupted.len() as f64 / matching.len().max(1) as f64,
        corrupted_entries: corrupted,
        start,
        end,
        decision_type: decision_type.map(str::to_string),
    }
}
