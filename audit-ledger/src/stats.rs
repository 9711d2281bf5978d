//! Daily decision statistics

use crate::types::LedgerEntry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Processing-time summary taken from `performance_metrics.processing_time_ms`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// Entries that reported a processing time
    pub samples: usize,
    /// Mean processing time (ms), 0 with no samples
    pub avg_processing_time_ms: f64,
    /// Max processing time (ms), 0 with no samples
    pub max_processing_time_ms: f64,
    /// Samples above the append budget
    pub sla_violations: usize,
    /// `1 - violations / max(total, 1)`
    pub sla_compliance_rate: f64,
}

/// Aggregate view of one UTC day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatistics {
    /// Day
    pub date: NaiveDate,
    /// Entries on that day
    pub total_decisions: usize,
    /// Counts per decision type
    pub decision_types: BTreeMap<String, usize>,
    /// Performance summary
    pub performance: PerformanceSummary,
}

fn processing_time_ms(entry: &LedgerEntry) -> Option<f64> {
    entry
        .data
        .field("performance_metrics")?
        .get("processing_time_ms")?
        .as_f64()
}

/// Compute statistics for `date` over `entries`
pub fn daily_statistics(entries: &[LedgerEntry], date: NaiveDate, budget_ms: f64) -> DailyStatistics {
    let mut decision_types = BTreeMap::new();
    let mut times = Vec::new();
    let mut total = 0;

    for entry in entries.iter().filter(|e| e.timestamp.date_naive() == date) {
        total += 1;
        *decision_types
            .entry(entry.data.decision_type().to_string())
            .or_insert(0) += 1;
        if let Some(ms) = processing_time_ms(entry) {
            times.push(ms);
        }
    }

    let sla_violations = times.iter().filter(|&&ms| ms > budget_ms).count();
    let (avg, max) = if times.is_empty() {
        (0.0, 0.0)
    } else {
        (
            times.iter().sum::<f64>() / times.len() as f64,
            times.iter().copied().fold(f64::MIN, f64::max),
        )
    };

    DailyStatistics {
        date,
        total_decisions: total,
        decision_types,
        performance: PerformanceSummary {
            samples: times.len(),
            avg_processing_time_ms: avg,
            max_processing_time_ms: max,
            sla_violations,
            sla_compliance_rate: 1.0 - sla_violations as f64 / total.max(1) as f64,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{compute_hash, GENESIS_HASH};
    use crate::types::DecisionPayload;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn entry_at(i: u64, payload: DecisionPayload, hour: u32, day: u32) -> LedgerEntry {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap();
        let mut entry = LedgerEntry {
            id: format!("e{}", i),
            data: payload,
            timestamp,
            previous_hash: GENESIS_HASH.to_string(),
            hash: String::new(),
            chain_position: i,
            retention_until: crate::chain::retention_deadline(timestamp, 7).unwrap(),
        };
        entry.hash = compute_hash(&entry).unwrap();
        entry
    }

    #[test]
    fn test_counts_and_performance() {
        let entries = vec![
            entry_at(
                0,
                DecisionPayload::procurement("1")
                    .with_field("performance_metrics", json!({"processing_time_ms": 20.0})),
                9,
                10,
            ),
            entry_at(
                1,
                DecisionPayload::procurement("2")
                    .with_field("performance_metrics", json!({"processing_time_ms": 80.0})),
                10,
                10,
            ),
            entry_at(2, DecisionPayload::aml("3"), 23, 10),
            entry_at(
                3,
                DecisionPayload::from_value(json!({"note": "no type"})).unwrap(),
                11,
                10,
            ),
            entry_at(4, DecisionPayload::sharia("5"), 0, 11),
        ];

        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let stats = daily_statistics(&entries, date, 50.0);

        assert_eq!(stats.total_decisions, 4);
        assert_eq!(stats.decision_types["procurement"], 2);
        assert_eq!(stats.decision_types["aml"], 1);
        assert_eq!(stats.decision_types["unknown"], 1);
        assert!(!stats.decision_types.contains_key("sharia"));

        assert_eq!(stats.performance.samples, 2);
        assert_eq!(stats.performance.avg_processing_time_ms, 50.0);
        assert_eq!(stats.performance.max_processing_time_ms, 80.0);
        assert_eq!(stats.performance.sla_violations, 1);
        assert!((stats.performance.sla_compliance_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_day() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let stats = daily_statistics(&[], date, 50.0);
        assert_eq!(stats.total_decisions, 0);
        assert_eq!(stats.performance.sla_compliance_rate, 1.0);
        assert_eq!(stats.performance.avg_processing_time_ms, 0.0);
    }
}
