//! Pipeline Metrics Collection.
//!
//! Counters for every stage of the metering pipeline plus per-payer payment
//! statistics. All counters are lock-free; payer statistics sit behind a
//! read-write lock.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::core::usage::PayerId;
use crate::error::Error;
use crate::utils::math::average;

// ═══════════════════════════════════════════════════════════════════════════════
// COUNTER METRIC
// ═══════════════════════════════════════════════════════════════════════════════

/// Simple atomic counter for high-frequency metrics
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
    name: &'static str,
}

impl Counter {
    /// Create new counter
    pub const fn new(name: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name,
        }
    }

    /// Increment counter
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Add to counter
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get current value
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Get name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Gauge for values that can go up or down
#[derive(Debug)]
pub struct Gauge {
    value: AtomicU64,
    name: &'static str,
}

impl Gauge {
    /// Create new gauge
    pub const fn new(name: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name,
        }
    }

    /// Get current value
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Increment gauge
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement gauge, saturating at zero
    pub fn decrement(&self) {
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }

    /// Get name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAYER STATISTICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Settled payments for one payer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerStats {
    /// Settled batches
    pub payment_count: u64,
    /// Total paid in cents
    pub total_paid: u64,
    /// API calls covered by settled batches
    pub calls_settled: u64,
    /// Time of the last settlement (unix ms)
    pub last_payment_at: u64,
}

impl PayerStats {
    /// Average payment per settled batch, in cents
    pub fn average_payment(&self) -> u64 {
        average(self.total_paid, self.payment_count)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE METRICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Counters for the metering pipeline
#[derive(Debug)]
pub struct PipelineMetrics {
    events_recorded: Counter,
    events_rejected: Counter,
    batches_normalized: Counter,
    proofs_generated: Counter,
    proof_failures: Counter,
    settlements: Counter,
    settlements_reconciled: Counter,
    verification_rejections: Counter,
    insufficient_balance: Counter,
    simulation_reverts: Counter,
    submission_failures: Counter,
    ambiguous_outcomes: Counter,
    timeouts: Counter,
    other_failures: Counter,
    stale_drops: Counter,
    stale_entries_dropped: Counter,
    units_settled: Counter,
    batches_in_flight: Gauge,
    payers: RwLock<HashMap<PayerId, PayerStats>>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self {
            events_recorded: Counter::new("events_recorded"),
            events_rejected: Counter::new("events_rejected"),
            batches_normalized: Counter::new("batches_normalized"),
            proofs_generated: Counter::new("proofs_generated"),
            proof_failures: Counter::new("proof_failures"),
            settlements: Counter::new("settlements"),
            settlements_reconciled: Counter::new("settlements_reconciled"),
            verification_rejections: Counter::new("verification_rejections"),
            insufficient_balance: Counter::new("insufficient_balance"),
            simulation_reverts: Counter::new("simulation_reverts"),
            submission_failures: Counter::new("submission_failures"),
            ambiguous_outcomes: Counter::new("ambiguous_outcomes"),
            timeouts: Counter::new("timeouts"),
            other_failures: Counter::new("other_failures"),
            stale_drops: Counter::new("stale_drops"),
            stale_entries_dropped: Counter::new("stale_entries_dropped"),
            units_settled: Counter::new("units_settled"),
            batches_in_flight: Gauge::new("batches_in_flight"),
            payers: RwLock::new(HashMap::new()),
        }
    }

    /// Count an ingress event
    pub fn record_event(&self, accepted: bool) {
        if accepted {
            self.events_recorded.increment();
        } else {
            self.events_rejected.increment();
        }
    }

    /// Count a newly normalized batch
    pub fn record_normalized(&self) {
        self.batches_normalized.increment();
        self.batches_in_flight.increment();
    }

    /// Count a generated proof. Failures go through `record_failure`.
    pub fn record_proof(&self) {
        self.proofs_generated.increment();
    }

    /// Count a settled batch and credit the payer's statistics
    pub fn record_settlement(&self, payer: &PayerId, amount: u64, calls: u64, reconciled: bool, at: u64) {
        self.settlements.increment();
        self.units_settled.add(amount);
        self.batches_in_flight.decrement();
        if reconciled {
            self.settlements_reconciled.increment();
        }

        if let Ok(mut payers) = self.payers.write() {
            let stats = payers.entry(payer.clone()).or_default();
            stats.payment_count += 1;
            stats.total_paid = stats.total_paid.saturating_add(amount);
            stats.calls_settled += calls;
            stats.last_payment_at = at;
        }
    }

    /// Count a settlement failure by kind
    pub fn record_failure(&self, error: &Error) {
        match error {
            Error::ProofGeneration { .. } | Error::ConstraintViolation { .. } => self.proof_failures.increment(),
            Error::VerificationRejected { .. } => self.verification_rejections.increment(),
            Error::InsufficientBalance { .. } => self.insufficient_balance.increment(),
            Error::LedgerSimulation { .. } => self.simulation_reverts.increment(),
            Error::LedgerSubmission { .. } => self.submission_failures.increment(),
            Error::Timeout { .. } => self.timeouts.increment(),
            _ => self.other_failures.increment(),
        }
        if error.is_ambiguous() {
            self.ambiguous_outcomes.increment();
        }
    }

    /// Count a stale batch drop
    pub fn record_stale_drop(&self, entries: usize) {
        self.stale_drops.increment();
        self.stale_entries_dropped.add(entries as u64);
    }

    /// Statistics for one payer
    pub fn payer_stats(&self, payer: &PayerId) -> Option<PayerStats> {
        self.payers.read().ok()?.get(payer).cloned()
    }

    /// Statistics for every payer with a settlement
    pub fn all_payer_stats(&self) -> HashMap<PayerId, PayerStats> {
        self.payers.read().map(|p| p.clone()).unwrap_or_default()
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_recorded: self.events_recorded.value(),
            events_rejected: self.events_rejected.value(),
            batches_normalized: self.batches_normalized.value(),
            proofs_generated: self.proofs_generated.value(),
            proof_failures: self.proof_failures.value(),
            settlements: self.settlements.value(),
            settlements_reconciled: self.settlements_reconciled.value(),
            verification_rejections: self.verification_rejections.value(),
            insufficient_balance: self.insufficient_balance.value(),
            simulation_reverts: self.simulation_reverts.value(),
            submission_failures: self.submission_failures.value(),
            ambiguous_outcomes: self.ambiguous_outcomes.value(),
            timeouts: self.timeouts.value(),
            other_failures: self.other_failures.value(),
            stale_drops: self.stale_drops.value(),
            stale_entries_dropped: self.stale_entries_dropped.value(),
            units_settled: self.units_settled.value(),
            batches_in_flight: self.batches_in_flight.value(),
        }
    }
}

/// Serializable copy of [`PipelineMetrics`] counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Accepted usage events
    pub events_recorded: u64,
    /// Rejected usage events
    pub events_rejected: u64,
    /// Batches normalized for proving
    pub batches_normalized: u64,
    /// Proofs generated
    pub proofs_generated: u64,
    /// Proof generation failures
    pub proof_failures: u64,
    /// Batches settled
    pub settlements: u64,
    /// Settlements recovered from the ledger after an ambiguous submission
    pub settlements_reconciled: u64,
    /// Proofs rejected by the gateway
    pub verification_rejections: u64,
    /// Settlements refused for lack of funds
    pub insufficient_balance: u64,
    /// Simulations that reverted
    pub simulation_reverts: u64,
    /// Submissions that failed
    pub submission_failures: u64,
    /// Failures where the ledger mutation may have landed
    pub ambiguous_outcomes: u64,
    /// Read-only calls that timed out
    pub timeouts: u64,
    /// Any other failure
    pub other_failures: u64,
    /// Stale batches dropped
    pub stale_drops: u64,
    /// Entries discarded with stale batches
    pub stale_entries_dropped: u64,
    /// Usage units settled, in cents
    pub units_settled: u64,
    /// Normalized batches awaiting settlement
    pub batches_in_flight: u64,
}
