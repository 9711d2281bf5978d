//! Core types for the audit ledger
//!
//! Decision payloads are a tagged union over the decision kinds the platform
//! records, each carrying an open bag of extra fields. The JSON form of a
//! payload is what gets hashed, so `Value -> DecisionPayload -> Value` must be
//! stable for anything the ledger itself wrote.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Payload discriminator key
pub const DECISION_TYPE_KEY: &str = "decision_type";
/// Submitter key
pub const USER_ID_KEY: &str = "user_id";
/// Marker key for bias alert entries
pub const ALERT_TYPE_KEY: &str = "alert_type";
/// Marker value for bias alert entries
pub const BIAS_ALERT_TYPE: &str = "bias_detection";

/// Fields shared by every ordinary decision kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionRecord {
    /// Submitting user (national id / iqama), when supplied as a string
    pub user_id: Option<String>,

    /// Everything else, uninterpreted
    pub fields: BTreeMap<String, Value>,
}

impl DecisionRecord {
    /// Record for a known submitter
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            fields: BTreeMap::new(),
        }
    }
}

/// Bias alert severity, derived from the detector's confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    /// Confidence above 0.8
    High,
    /// Anything else
    Medium,
}

impl AlertSeverity {
    /// Severity for a detector confidence
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.8 {
            AlertSeverity::High
        } else {
            AlertSeverity::Medium
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::High => "HIGH",
            AlertSeverity::Medium => "MEDIUM",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result reported by the bias-detection collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasResult {
    /// Detector confidence in [0, 1]
    pub confidence: f64,

    /// Detector-specific details (bias kinds, affected regions, ...)
    #[serde(default)]
    pub details: Value,
}

/// Bias alert recorded as its own chained entry
#[derive(Debug, Clone, PartialEq)]
pub struct BiasAlert {
    /// Entry the alert refers to
    pub related_entry: String,

    /// Severity derived from confidence
    pub severity: AlertSeverity,

    /// Detector confidence
    pub confidence: f64,

    /// Detector details
    pub bias_details: Value,

    /// Whether the regulator must be notified
    pub regulatory_notification: bool,

    /// Extra fields
    pub fields: BTreeMap<String, Value>,
}

impl BiasAlert {
    /// Build an alert for `related_entry` from a detector result
    pub fn from_result(related_entry: impl Into<String>, result: BiasResult) -> Self {
        Self {
            related_entry: related_entry.into(),
            severity: AlertSeverity::from_confidence(result.confidence),
            confidence: result.confidence,
            bias_details: result.details,
            regulatory_notification: true,
            fields: BTreeMap::new(),
        }
    }
}

/// Decision payload stored in a ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum DecisionPayload {
    /// Government procurement decision
    Procurement(DecisionRecord),
    /// Sharia compliance decision
    Sharia(DecisionRecord),
    /// Anti-money-laundering decision
    Aml(DecisionRecord),
    /// Bias alert raised against an earlier entry
    BiasAlert(BiasAlert),
    /// Any other (or missing) decision type
    Other {
        /// Raw decision type, absent when the caller supplied none
        decision_type: Option<String>,
        /// Remaining fields
        record: DecisionRecord,
    },
}

impl DecisionPayload {
    /// Procurement decision for a submitter
    pub fn procurement(user_id: impl Into<String>) -> Self {
        DecisionPayload::Procurement(DecisionRecord::for_user(user_id))
    }

    /// Sharia compliance decision for a submitter
    pub fn sharia(user_id: impl Into<String>) -> Self {
        DecisionPayload::Sharia(DecisionRecord::for_user(user_id))
    }

    /// AML decision for a submitter
    pub fn aml(user_id: impl Into<String>) -> Self {
        DecisionPayload::Aml(DecisionRecord::for_user(user_id))
    }

    /// Parse an untyped payload.
    ///
    /// Fails with [`crate::Error::Encoding`] when the value is not an object,
    /// `decision_type` is not a string, or a bias alert is malformed.
    pub fn from_value(value: Value) -> crate::Result<Self> {
        Self::try_from(value)
    }

    /// Add an extra field.
    ///
    /// Keys the typed form owns (`decision_type`, `user_id` next to a typed
    /// submitter, `alert_type: "bias_detection"` on a decision, or the alert
    /// fields on an alert) do not survive serialization. The ledger refuses
    /// such payloads at append time, see [`DecisionPayload::validate`].
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields_mut().insert(key.into(), value.into());
        self
    }

    /// Check that the payload reads back unchanged from its JSON form.
    ///
    /// The JSON form is what gets hashed and persisted, so a payload that
    /// decodes differently (or not at all) would make the chain file
    /// unreadable or change on reload. Fails with [`crate::Error::Encoding`].
    pub fn validate(&self) -> crate::Result<()> {
        let decoded = Self::try_from(Value::from(self.clone())).map_err(|e| {
            crate::Error::Encoding(format!(
                "{} payload does not decode from its own JSON form: {}",
                self.decision_type(),
                e
            ))
        })?;

        if &decoded == self {
            Ok(())
        } else {
            Err(crate::Error::Encoding(format!(
                "{} payload changes when read back; an extra field uses a reserved key",
                self.decision_type()
            )))
        }
    }

    /// Decision type name used for indexing and statistics
    pub fn decision_type(&self) -> &str {
        match self {
            DecisionPayload::Procurement(_) => "procurement",
            DecisionPayload::Sharia(_) => "sharia",
            DecisionPayload::Aml(_) => "aml",
            DecisionPayload::BiasAlert(_) => "bias_alert",
            DecisionPayload::Other { decision_type, .. } => {
                decision_type.as_deref().unwrap_or("unknown")
            }
        }
    }

    /// Submitting user, if any
    pub fn user_id(&self) -> Option<&str> {
        match self {
            DecisionPayload::Procurement(r)
            | DecisionPayload::Sharia(r)
            | DecisionPayload::Aml(r)
            | DecisionPayload::Other { record: r, .. } => r.user_id.as_deref(),
            DecisionPayload::BiasAlert(_) => None,
        }
    }

    /// Look up an extra field
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            DecisionPayload::Procurement(r)
            | DecisionPayload::Sharia(r)
            | DecisionPayload::Aml(r)
            | DecisionPayload::Other { record: r, .. } => r.fields.get(key),
            DecisionPayload::BiasAlert(a) => a.fields.get(key),
        }
    }

    /// Bias alert details, if this is an alert entry
    pub fn as_bias_alert(&self) -> Option<&BiasAlert> {
        match self {
            DecisionPayload::BiasAlert(alert) => Some(alert),
            _ => None,
        }
    }

    fn fields_mut(&mut self) -> &mut BTreeMap<String, Value> {
        match self {
            DecisionPayload::Procurement(r)
            | DecisionPayload::Sharia(r)
            | DecisionPayload::Aml(r)
            | DecisionPayload::Other { record: r, .. } => &mut r.fields,
            DecisionPayload::BiasAlert(a) => &mut a.fields,
        }
    }

    fn record_from(mut map: Map<String, Value>) -> DecisionRecord {
        let user_id = match map.remove(USER_ID_KEY) {
            Some(Value::String(user_id)) => Some(user_id),
            Some(other) => {
                // Non-string submitter ids stay untyped
                map.insert(USER_ID_KEY.to_string(), other);
                None
            }
            None => None,
        };

        DecisionRecord {
            user_id,
            fields: map.into_iter().collect(),
        }
    }

    fn bias_alert_from(mut map: Map<String, Value>) -> crate::Result<BiasAlert> {
        map.remove(ALERT_TYPE_KEY);
        map.remove(DECISION_TYPE_KEY);

        let related_entry = match map.remove("related_entry") {
            Some(Value::String(id)) => id,
            _ => {
                return Err(crate::Error::Encoding(
                    "bias alert requires a string related_entry".to_string(),
                ))
            }
        };

        let confidence = map
            .remove("confidence")
            .and_then(|v| v.as_f64())
            .filter(|c| c.is_finite())
            .ok_or_else(|| {
                crate::Error::Encoding("bias alert requires a finite confidence".to_string())
            })?;

        let severity = match map.remove("severity") {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| crate::Error::Encoding(format!("bias alert severity: {}", e)))?,
            None => AlertSeverity::from_confidence(confidence),
        };

        let bias_details = map.remove("bias_details").unwrap_or(Value::Null);
        let regulatory_notification = map
            .remove("regulatory_notification")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        Ok(BiasAlert {
            related_entry,
            severity,
            confidence,
            bias_details,
            regulatory_notification,
            fields: map.into_iter().collect(),
        })
    }
}

impl TryFrom<Value> for DecisionPayload {
    type Error = crate::Error;

    fn try_from(value: Value) -> crate::Result<Self> {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(crate::Error::Encoding(format!(
                    "decision payload must be an object, got {}",
                    json_kind(&other)
                )))
            }
        };

        if map.get(ALERT_TYPE_KEY).and_then(Value::as_str) == Some(BIAS_ALERT_TYPE) {
            return Ok(DecisionPayload::BiasAlert(Self::bias_alert_from(map)?));
        }

        let decision_type = match map.remove(DECISION_TYPE_KEY) {
            Some(Value::String(kind)) => Some(kind),
            Some(other) => {
                return Err(crate::Error::Encoding(format!(
                    "decision_type must be a string, got {}",
                    json_kind(&other)
                )))
            }
            None => None,
        };

        let record = Self::record_from(map);
        Ok(match decision_type.as_deref() {
            Some("procurement") => DecisionPayload::Procurement(record),
            Some("sharia") => DecisionPayload::Sharia(record),
            Some("aml") => DecisionPayload::Aml(record),
            _ => DecisionPayload::Other {
                decision_type,
                record,
            },
        })
    }
}

impl From<DecisionPayload> for Value {
    fn from(payload: DecisionPayload) -> Self {
        let decision_type = payload.decision_type().to_string();

        let mut map: Map<String, Value> = Map::new();
        match payload {
            DecisionPayload::BiasAlert(alert) => {
                map.extend(alert.fields);
                map.insert(ALERT_TYPE_KEY.to_string(), Value::from(BIAS_ALERT_TYPE));
                map.insert(DECISION_TYPE_KEY.to_string(), Value::from(decision_type));
                map.insert("related_entry".to_string(), Value::from(alert.related_entry));
                map.insert("severity".to_string(), Value::from(alert.severity.as_str()));
                map.insert("confidence".to_string(), Value::from(alert.confidence));
                map.insert("bias_details".to_string(), alert.bias_details);
                map.insert(
                    "regulatory_notification".to_string(),
                    Value::from(alert.regulatory_notification),
                );
            }
            DecisionPayload::Other {
                decision_type: raw,
                record,
            } => {
                map.extend(record.fields);
                map.remove(DECISION_TYPE_KEY);
                if let Some(raw) = raw {
                    map.insert(DECISION_TYPE_KEY.to_string(), Value::from(raw));
                }
                if let Some(user_id) = record.user_id {
                    map.insert(USER_ID_KEY.to_string(), Value::from(user_id));
                }
            }
            DecisionPayload::Procurement(record)
            | DecisionPayload::Sharia(record)
            | DecisionPayload::Aml(record) => {
                map.extend(record.fields);
                map.insert(DECISION_TYPE_KEY.to_string(), Value::from(decision_type));
                if let Some(user_id) = record.user_id {
                    map.insert(USER_ID_KEY.to_string(), Value::from(user_id));
                }
            }
        }

        Value::Object(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One immutable record in the hash chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry id
    pub id: String,

    /// Decision payload
    pub data: DecisionPayload,

    /// Creation instant
    pub timestamp: DateTime<Utc>,

    /// Hash of the prior entry, or the genesis sentinel
    pub previous_hash: String,

    /// SHA-256 over the canonical form of every other field
    pub hash: String,

    /// Zero-based index into the append sequence
    pub chain_position: u64,

    /// Compliance deadline (creation + retention years)
    pub retention_until: DateTime<Utc>,
}

/// Chain health state machine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChainHealth {
    /// Appends accepted
    #[default]
    Healthy,
    /// Corruption detected; appends refused until an operator clears it
    Quarantined {
        /// Detection time
        since: DateTime<Utc>,
        /// Where the corruption report was written
        report_path: Option<std::path::PathBuf>,
        /// Number of corrupted entries
        corrupted_count: usize,
    },
}

impl ChainHealth {
    /// Whether appends are accepted
    pub fn is_healthy(&self) -> bool {
        matches!(self, ChainHealth::Healthy)
    }
}
