//! Hash-chain engine
//!
//! This module provides:
//! - Canonical JSON (keys sorted at every level, UTF-8, `", "` and `": "`
//!   separators)
//! - SHA-256 entry hashing over the canonical form minus the `hash` field
//! - Chain link validation
//! - Entry id generation and retention deadlines
//!
//! The canonical form is byte-identical to Python's
//! `json.dumps(value, sort_keys=True, ensure_ascii=False)` for the values the
//! ledger writes (strings, integers, booleans, null, shortest-form floats), so
//! chains hashed by the Python audit tools verify here and the other way round.
//! Floats whose shortest form needs an exponent are formatted differently by
//! the two encoders and should be stored as strings.

use crate::{types::LedgerEntry, Error, Result};
use chrono::{DateTime, Months, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Previous hash of the first entry in a chain
pub const GENESIS_HASH: &str = "SAUDI_AI_AUDIT_GENESIS_2024";

/// Serialize a JSON value with object keys sorted at every depth.
///
/// Independent of `serde_json`'s map ordering features.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push_str(": ");
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Canonical bytes of an entry, excluding its own `hash` field
pub fn canonical_bytes(entry: &LedgerEntry) -> Result<Vec<u8>> {
    let mut value = serde_json::to_value(entry)
        .map_err(|e| Error::Encoding(format!("entry {} not serializable: {}", entry.id, e)))?;

    match value.as_object_mut() {
        Some(map) => {
            map.remove("hash");
        }
        None => {
            return Err(Error::Encoding(format!(
                "entry {} did not serialize to an object",
                entry.id
            )))
        }
    }

    Ok(canonical_json(&value).into_bytes())
}

/// Content hash of an entry (hex SHA-256), never covering the `hash` field
pub fn compute_hash(entry: &LedgerEntry) -> Result<String> {
    Ok(hash_bytes(&canonical_bytes(entry)?))
}

/// True iff `curr` links to `prev`
pub fn verify_link(prev: &LedgerEntry, curr: &LedgerEntry) -> bool {
    curr.previous_hash == prev.hash
}

/// Hash arbitrary bytes using SHA-256, hex encoded
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Entry id: `{decision_type}_{user_id}_{YYYYmmdd_HHMMSS_micros}_{position}`.
///
/// The position suffix keeps ids unique even when the clock repeats.
pub fn generate_entry_id(
    decision_type: &str,
    user_id: Option<&str>,
    timestamp: DateTime<Utc>,
    position: u64,
) -> String {
    format!(
        "{}_{}_{}_{}",
        decision_type,
        user_id.unwrap_or("SYSTEM"),
        timestamp.format("%Y%m%d_%H%M%S_%6f"),
        position
    )
}

/// End of the retention period: `years` calendar years after `timestamp`.
///
/// A 29 February start lands on 28 February. `None` only when the result
/// would overflow the calendar.
pub fn retention_deadline(timestamp: DateTime<Utc>, years: u32) -> Option<DateTime<Utc>> {
    timestamp.checked_add_months(Months::new(years.checked_mul(12)?))
}

/// Bias alert id: `BIAS_ALERT_{YYYYmmdd_HHMMSS_micros}_{position}`
pub fn generate_alert_id(timestamp: DateTime<Utc>, position: u64) -> String {
    format!(
        "BIAS_ALERT_{}_{}",
        timestamp.format("%Y%m%d_%H%M%S_%6f"),
        position
    )
}
