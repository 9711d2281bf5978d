//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `audit_entries_total` - Total number of entries appended
//! - `audit_append_duration_seconds` - Histogram of append latencies
//! - `audit_chain_length` - Current number of entries in the chain
//! - `audit_verifications_total` - Full-chain verification runs
//! - `audit_verification_duration_seconds` - Histogram of verification latencies
//! - `audit_corruption_events_total` - Verifications that found corruption
//! - `audit_sla_violations_total` - Soft SLA budget overruns

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total entries appended
    pub entries_total: IntCounter,

    /// Append duration histogram
    pub append_duration: Histogram,

    /// Chain length
    pub chain_length: IntGauge,

    /// Verification runs
    pub verifications_total: IntCounter,

    /// Verification duration histogram
    pub verification_duration: Histogram,

    /// Corruption events
    pub corruption_events: IntCounter,

    /// Soft SLA violations
    pub sla_violations: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("entries_total", &self.entries_total.get())
            .field("chain_length", &self.chain_length.get())
            .field("corruption_events", &self.corruption_events.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let entries_total =
            IntCounter::new("audit_entries_total", "Total number of entries appended")?;
        registry.register(Box::new(entries_total.clone()))?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new("audit_append_duration_seconds", "Histogram of append latencies")
                .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        let chain_length = IntGauge::new("audit_chain_length", "Entries in the chain")?;
        registry.register(Box::new(chain_length.clone()))?;

        let verifications_total =
            IntCounter::new("audit_verifications_total", "Full-chain verification runs")?;
        registry.register(Box::new(verifications_total.clone()))?;

        let verification_duration = Histogram::with_opts(
            HistogramOpts::new(
                "audit_verification_duration_seconds",
                "Histogram of verification latencies",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0]),
        )?;
        registry.register(Box::new(verification_duration.clone()))?;

        let corruption_events = IntCounter::new(
            "audit_corruption_events_total",
            "Verifications that found corruption",
        )?;
        registry.register(Box::new(corruption_events.clone()))?;

        let sla_violations =
            IntCounter::new("audit_sla_violations_total", "Soft SLA budget overruns")?;
        registry.register(Box::new(sla_violations.clone()))?;

        Ok(Self {
            entries_total,
            append_duration,
            chain_length,
            verifications_total,
            verification_duration,
            corruption_events,
            sla_violations,
            registry,
        })
    }

    /// Record entry append
    pub fn record_append(&self, duration_seconds: f64, chain_length: usize) {
        self.entries_total.inc();
        self.append_duration.observe(duration_seconds);
        self.chain_length.set(chain_length as i64);
    }

    /// Record a verification run
    pub fn record_verification(&self, duration_seconds: f64, corrupted: bool) {
        self.verifications_total.inc();
        self.verification_duration.observe(duration_seconds);
        if corrupted {
            self.corruption_events.inc();
        }
    }

    /// Record a soft SLA overrun
    pub fn record_sla_violation(&self) {
        self.sla_violations.inc();
    }

    /// Update chain length
    pub fn set_chain_length(&self, len: usize) {
        self.chain_length.set(len as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
