//! Per-payer batch accumulation.
//!
//! The accumulator owns every open batch and every normalized batch that is
//! waiting on proof generation or settlement. Each payer has its own slot
//! behind a mutex, so records for one payer are serialized while different
//! payers never block each other. The map lock is held only long enough to
//! find or insert a slot.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

use crate::core::batch::{Batch, BatchSnapshot, BatchState, InFlightStatus, NormalizedBatch};
use crate::core::usage::{now_millis, PayerId, UsageRecord};
use crate::error::{Error, Result};
use crate::metering::normalizer::prepare;
use crate::utils::crypto::Hash;
use crate::utils::validation::validate_usage_event;

// ═══════════════════════════════════════════════════════════════════════════════
// SLOTS
// ═══════════════════════════════════════════════════════════════════════════════

/// A normalized batch retained until its settlement succeeds
#[derive(Debug, Clone)]
struct InFlight {
    batch: NormalizedBatch,
    state: BatchState,
    attempts: u32,
    ambiguous: bool,
}

impl InFlight {
    fn status(&self) -> InFlightStatus {
        InFlightStatus {
            batch_id: self.batch.batch_id,
            state: self.state,
            attempts: self.attempts,
            ambiguous: self.ambiguous,
            claimed_total: self.batch.claimed_total,
        }
    }
}

#[derive(Debug, Default)]
struct PayerSlot {
    open: Option<Batch>,
    in_flight: Option<InFlight>,
    /// Set when the reaper removed this slot from the map
    retired: bool,
}

impl PayerSlot {
    fn is_empty(&self) -> bool {
        self.open.as_ref().map_or(true, Batch::is_empty) && self.in_flight.is_none()
    }

    fn contains_request(&self, request_id: &str) -> bool {
        self.open.as_ref().map_or(false, |b| b.contains_request(request_id))
            || self
                .in_flight
                .as_ref()
                .map_or(false, |f| f.batch.request_ids.iter().any(|r| r == request_id))
    }

    fn snapshot(&self, payer: &PayerId, capacity: usize) -> BatchSnapshot {
        BatchSnapshot {
            payer: payer.clone(),
            batch_id: self.open.as_ref().map(|b| b.id),
            size: self.open.as_ref().map_or(0, Batch::len),
            capacity,
            claimed_so_far: self.open.as_ref().map_or(0, |b| b.running_total),
            ready: self.open.as_ref().map_or(false, Batch::is_ready),
            in_flight: self.in_flight.as_ref().map(InFlight::status),
        }
    }

    fn in_flight_mut(&mut self, payer: &PayerId, batch_id: &Hash) -> Result<&mut InFlight> {
        let in_flight = self
            .in_flight
            .as_mut()
            .ok_or_else(|| Error::BatchNotFound(payer.to_string()))?;
        if &in_flight.batch.batch_id != batch_id {
            return Err(Error::BatchMismatch {
                expected: in_flight.batch.batch_id.to_hex(),
                got: batch_id.to_hex(),
            });
        }
        Ok(in_flight)
    }
}

/// An open batch dropped for staleness
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleDrop {
    /// Payer whose batch was dropped
    pub payer: PayerId,
    /// Dropped batch id
    pub batch_id: Hash,
    /// Entries discarded
    pub entries: usize,
    /// Usage units discarded
    pub units: u64,
    /// Idle time at the sweep (ms)
    pub idle_ms: u64,
}

/// A batch handed to the settlement pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementTicket {
    /// The batch to prove and settle
    pub batch: NormalizedBatch,
    /// Attempt number, starting at 1
    pub attempt: u32,
    /// A previous attempt ended without a definite outcome
    pub ambiguous: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCUMULATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared store of per-payer batches
pub struct BatchAccumulator {
    capacity: usize,
    slots: RwLock<HashMap<PayerId, Arc<Mutex<PayerSlot>>>>,
}

fn lock_slot(slot: &Mutex<PayerSlot>) -> Result<MutexGuard<'_, PayerSlot>> {
    slot.lock().map_err(|_| Error::Lock)
}

impl BatchAccumulator {
    /// Create an accumulator producing batches of `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Batch capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn existing_slot(&self, payer: &PayerId) -> Result<Option<Arc<Mutex<PayerSlot>>>> {
        let slots = self.slots.read().map_err(|_| Error::Lock)?;
        Ok(slots.get(payer).cloned())
    }

    fn slot(&self, payer: &PayerId) -> Result<Arc<Mutex<PayerSlot>>> {
        if let Some(slot) = self.existing_slot(payer)? {
            return Ok(slot);
        }
        let mut slots = self.slots.write().map_err(|_| Error::Lock)?;
        Ok(slots.entry(payer.clone()).or_default().clone())
    }

    /// Record a usage event at the current time
    pub fn record(
        &self,
        payer: &PayerId,
        response_value: Decimal,
        usage_units: u64,
        request_id: &str,
    ) -> Result<BatchSnapshot> {
        self.record_at(payer, response_value, usage_units, request_id, now_millis())
    }

    /// Record a usage event stamped at `now` (unix ms).
    ///
    /// The event is validated before anything is appended; a rejected event
    /// leaves the payer's batches untouched.
    ///
    /// Request ids are deduplicated against the open and in-flight batches
    /// only. An id from a batch that already settled is accepted again and
    /// billed in a later batch; callers needing lifetime uniqueness must
    /// track settled ids themselves.
    pub fn record_at(
        &self,
        payer: &PayerId,
        response_value: Decimal,
        usage_units: u64,
        request_id: &str,
        now: u64,
    ) -> Result<BatchSnapshot> {
        validate_usage_event(payer.as_str(), request_id, &response_value, usage_units)?;

        loop {
            let slot = self.slot(payer)?;
            let mut guard = lock_slot(&slot)?;
            if guard.retired {
                // Reaped between lookup and lock; take the fresh slot
                continue;
            }

            if guard.contains_request(request_id) {
                return Err(Error::DuplicateRequest {
                    payer: payer.to_string(),
                    request_id: request_id.into(),
                });
            }

            let capacity = self.capacity;
            let batch = guard
                .open
                .get_or_insert_with(|| Batch::new(payer.clone(), capacity, now));
            batch.push(
                UsageRecord::new(payer.clone(), response_value, usage_units, request_id, now),
                now,
            );

            if batch.len() == capacity {
                info!(payer = %payer, batch = %batch.id.short(), total = batch.running_total, "Batch ready");
            }
            return Ok(guard.snapshot(payer, capacity));
        }
    }

    /// Current view of a payer's batches; `None` when the payer has none
    pub fn status(&self, payer: &PayerId) -> Result<Option<BatchSnapshot>> {
        let Some(slot) = self.existing_slot(payer)? else {
            return Ok(None);
        };
        let guard = lock_slot(&slot)?;
        if guard.retired || guard.is_empty() {
            return Ok(None);
        }
        Ok(Some(guard.snapshot(payer, self.capacity)))
    }

    /// Whether the payer has work for the settlement pipeline
    pub fn has_pending_settlement(&self, payer: &PayerId) -> Result<bool> {
        let Some(slot) = self.existing_slot(payer)? else {
            return Ok(false);
        };
        let guard = lock_slot(&slot)?;
        Ok(match &guard.in_flight {
            Some(in_flight) => in_flight.state == BatchState::Open,
            None => guard.open.as_ref().map_or(false, Batch::is_ready),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // IN-FLIGHT TRACKING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Hand out the next batch to settle, at the current time
    pub fn begin_settlement(&self, payer: &PayerId) -> Result<Option<SettlementTicket>> {
        self.begin_settlement_at(payer, now_millis())
    }

    /// Hand out the next batch to settle.
    ///
    /// A retained batch waiting for retry is returned unchanged. If a batch is
    /// already proving or settling, returns `None`. Otherwise a ready open
    /// batch is normalized, its leftover becomes the open batch, and the
    /// normalized batch is retained as in-flight.
    pub fn begin_settlement_at(&self, payer: &PayerId, now: u64) -> Result<Option<SettlementTicket>> {
        let Some(slot) = self.existing_slot(payer)? else {
            return Ok(None);
        };
        let mut guard = lock_slot(&slot)?;

        if let Some(in_flight) = guard.in_flight.as_mut() {
            if in_flight.state != BatchState::Open {
                return Ok(None);
            }
            in_flight.state = BatchState::Proving;
            in_flight.attempts += 1;
            debug!(
                payer = %payer,
                batch = %in_flight.batch.batch_id.short(),
                attempt = in_flight.attempts,
                ambiguous = in_flight.ambiguous,
                "Retrying retained batch"
            );
            return Ok(Some(SettlementTicket {
                batch: in_flight.batch.clone(),
                attempt: in_flight.attempts,
                ambiguous: in_flight.ambiguous,
            }));
        }

        let Some(open) = guard.open.as_ref().filter(|b| b.is_ready()) else {
            return Ok(None);
        };

        let normalization = prepare(open.clone(), now)?;
        guard.open = normalization.leftover;
        guard.in_flight = Some(InFlight {
            batch: normalization.normalized.clone(),
            state: BatchState::Proving,
            attempts: 1,
            ambiguous: false,
        });

        debug!(
            payer = %payer,
            batch = %normalization.normalized.batch_id.short(),
            leftover = guard.open.as_ref().map_or(0, Batch::len),
            "Batch normalized"
        );
        Ok(Some(SettlementTicket {
            batch: normalization.normalized,
            attempt: 1,
            ambiguous: false,
        }))
    }

    /// Move an in-flight batch from Proving to Settling
    pub fn mark_settling(&self, payer: &PayerId, batch_id: &Hash) -> Result<()> {
        let slot = self
            .existing_slot(payer)?
            .ok_or_else(|| Error::BatchNotFound(payer.to_string()))?;
        let mut guard = lock_slot(&slot)?;
        guard.in_flight_mut(payer, batch_id)?.state = BatchState::Settling;
        Ok(())
    }

    /// Return an in-flight batch to Open with its entries unchanged
    pub fn release(&self, payer: &PayerId, batch_id: &Hash, ambiguous: bool) -> Result<()> {
        let slot = self
            .existing_slot(payer)?
            .ok_or_else(|| Error::BatchNotFound(payer.to_string()))?;
        let mut guard = lock_slot(&slot)?;
        let in_flight = guard.in_flight_mut(payer, batch_id)?;
        in_flight.state = BatchState::Open;
        in_flight.ambiguous = ambiguous;
        Ok(())
    }

    /// Drop a settled batch. The open batch (leftover) is untouched.
    pub fn complete(&self, payer: &PayerId, batch_id: &Hash) -> Result<NormalizedBatch> {
        let slot = self
            .existing_slot(payer)?
            .ok_or_else(|| Error::BatchNotFound(payer.to_string()))?;
        let mut guard = lock_slot(&slot)?;
        guard.in_flight_mut(payer, batch_id)?;
        guard
            .in_flight
            .take()
            .map(|f| f.batch)
            .ok_or_else(|| Error::BatchNotFound(payer.to_string()))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STALENESS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Drop open batches idle for longer than `timeout_ms` that are under
    /// capacity. In-flight batches are never dropped.
    pub fn sweep_at(&self, now: u64, timeout_ms: u64) -> Result<Vec<StaleDrop>> {
        let mut slots = self.slots.write().map_err(|_| Error::Lock)?;
        let mut dropped = Vec::new();

        slots.retain(|payer, slot| {
            let Ok(mut guard) = slot.lock() else {
                return true;
            };

            if guard.open.as_ref().map_or(false, |b| b.is_stale(now, timeout_ms)) {
                if let Some(batch) = guard.open.take() {
                    dropped.push(StaleDrop {
                        payer: payer.clone(),
                        batch_id: batch.id,
                        entries: batch.len(),
                        units: batch.running_total,
                        idle_ms: now.saturating_sub(batch.last_updated),
                    });
                }
            }

            if guard.is_empty() {
                guard.retired = true;
                false
            } else {
                true
            }
        });

        Ok(dropped)
    }

    /// Payers with a slot
    pub fn payers(&self) -> Vec<PayerId> {
        self.slots
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of payers with a slot
    pub fn len(&self) -> usize {
        self.slots.read().map(|s| s.len()).unwrap_or(0)
    }

    /// True if no payer has a slot
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc() -> BatchAccumulator {
        BatchAccumulator::new(4)
    }

    fn rec(acc: &BatchAccumulator, payer: &PayerId, id: &str, units: u64, now: u64) -> BatchSnapshot {
        acc.record_at(payer, Decimal::new(100, 2), units, id, now).unwrap()
    }

    #[test]
    fn test_record_and_readiness() {
        let acc = acc();
        let payer = PayerId::from("p");

        for (i, u) in [20, 25, 20].iter().enumerate() {
            let snap = rec(&acc, &payer, &format!("r{}", i), *u, 0);
            assert!(!snap.ready);
        }
        let snap = rec(&acc, &payer, "r3", 23, 0);
        assert!(snap.ready);
        assert_eq!(snap.size, 4);
        assert_eq!(snap.claimed_so_far, 88);
    }

    #[test]
    fn test_invalid_event_leaves_state_untouched() {
        let acc = acc();
        let payer = PayerId::from("p");
        rec(&acc, &payer, "r0", 20, 0);

        assert!(acc.record_at(&payer, Decimal::ONE, 0, "r1", 0).is_err());
        assert!(acc.record_at(&payer, Decimal::ONE, 5, "", 0).is_err());
        assert!(acc.record_at(&PayerId::from(""), Decimal::ONE, 5, "r1", 0).is_err());

        assert_eq!(acc.status(&payer).unwrap().unwrap().size, 1);
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let acc = acc();
        let payer = PayerId::from("p");
        rec(&acc, &payer, "r0", 20, 0);
        let err = acc.record_at(&payer, Decimal::ONE, 5, "r0", 0).unwrap_err();
        assert!(matches!(err, Error::DuplicateRequest { .. }));

        // Same request id for another payer is fine
        rec(&acc, &PayerId::from("q"), "r0", 20, 0);
    }

    #[test]
    fn test_duplicate_of_in_flight_request_rejected() {
        let acc = acc();
        let payer = PayerId::from("p");
        for i in 0..4 {
            rec(&acc, &payer, &format!("r{}", i), 10, 0);
        }
        acc.begin_settlement_at(&payer, 0).unwrap().unwrap();
        assert!(acc.record_at(&payer, Decimal::ONE, 5, "r2", 0).is_err());
    }

    #[test]
    fn test_settled_request_id_is_accepted_again() {
        let acc = acc();
        let payer = PayerId::from("p");
        for i in 0..4 {
            rec(&acc, &payer, &format!("r{}", i), 10, 0);
        }
        let ticket = acc.begin_settlement_at(&payer, 0).unwrap().unwrap();
        acc.complete(&payer, &ticket.batch.batch_id).unwrap();

        let snap = acc.record_at(&payer, Decimal::ONE, 5, "r2", 0).unwrap();
        assert_eq!(snap.size, 1);
        assert_eq!(snap.claimed_so_far, 5);
    }

    #[test]
    fn test_begin_settlement_splits_leftover() {
        let acc = acc();
        let payer = PayerId::from("p");
        for (i, u) in [20, 25, 20, 23, 7, 8].iter().enumerate() {
            rec(&acc, &payer, &format!("r{}", i), *u, 0);
        }

        let normalized = acc.begin_settlement_at(&payer, 10).unwrap().unwrap().batch;
        assert_eq!(normalized.claimed_total, 88);

        let snap = acc.status(&payer).unwrap().unwrap();
        assert_eq!(snap.size, 2);
        assert_eq!(snap.claimed_so_far, 15);
        assert_eq!(snap.in_flight.as_ref().unwrap().state, BatchState::Proving);
        assert_ne!(snap.batch_id, Some(normalized.batch_id));

        // Only one in-flight batch at a time
        assert!(acc.begin_settlement_at(&payer, 10).unwrap().is_none());
    }

    #[test]
    fn test_not_ready_yields_none() {
        let acc = acc();
        let payer = PayerId::from("p");
        rec(&acc, &payer, "r0", 20, 0);
        assert!(acc.begin_settlement_at(&payer, 0).unwrap().is_none());
        assert!(acc.begin_settlement_at(&PayerId::from("nobody"), 0).unwrap().is_none());
    }

    #[test]
    fn test_release_and_retry_same_batch() {
        let acc = acc();
        let payer = PayerId::from("p");
        for i in 0..4 {
            rec(&acc, &payer, &format!("r{}", i), 10, 0);
        }
        let first = acc.begin_settlement_at(&payer, 0).unwrap().unwrap().batch;
        acc.mark_settling(&payer, &first.batch_id).unwrap();
        acc.release(&payer, &first.batch_id, true).unwrap();

        let status = acc.status(&payer).unwrap().unwrap().in_flight.unwrap();
        assert_eq!(status.state, BatchState::Open);
        assert!(status.ambiguous);
        assert!(acc.has_pending_settlement(&payer).unwrap());

        let retry = acc.begin_settlement_at(&payer, 0).unwrap().unwrap();
        assert_eq!(retry.batch, first);
        assert_eq!(retry.attempt, 2);
        assert!(retry.ambiguous);
        assert_eq!(acc.status(&payer).unwrap().unwrap().in_flight.unwrap().attempts, 2);
    }

    #[test]
    fn test_complete_removes_only_in_flight() {
        let acc = acc();
        let payer = PayerId::from("p");
        for i in 0..5 {
            rec(&acc, &payer, &format!("r{}", i), 10, 0);
        }
        let batch = acc.begin_settlement_at(&payer, 0).unwrap().unwrap().batch;

        let wrong = Hash::sha256(b"other");
        assert!(matches!(acc.complete(&payer, &wrong), Err(Error::BatchMismatch { .. })));

        acc.complete(&payer, &batch.batch_id).unwrap();
        let snap = acc.status(&payer).unwrap().unwrap();
        assert!(snap.in_flight.is_none());
        assert_eq!(snap.size, 1);
    }

    #[test]
    fn test_sweep_drops_only_stale_open_batches() {
        let acc = acc();
        let idle = PayerId::from("idle");
        let busy = PayerId::from("busy");
        let full = PayerId::from("full");

        rec(&acc, &idle, "a", 5, 0);
        rec(&acc, &idle, "b", 5, 0);
        rec(&acc, &busy, "a", 5, 9_000);
        for i in 0..4 {
            rec(&acc, &full, &format!("r{}", i), 5, 0);
        }

        let dropped = acc.sweep_at(10_000, 5_000).unwrap();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].payer, idle);
        assert_eq!(dropped[0].entries, 2);
        assert!(acc.status(&idle).unwrap().is_none());
        assert!(acc.status(&busy).unwrap().is_some());
        assert!(acc.status(&full).unwrap().is_some());
    }

    #[test]
    fn test_sweep_never_touches_in_flight() {
        let acc = acc();
        let payer = PayerId::from("p");
        for i in 0..5 {
            rec(&acc, &payer, &format!("r{}", i), 5, 0);
        }
        let batch = acc.begin_settlement_at(&payer, 0).unwrap().unwrap().batch;

        // Leftover of 1 is stale and dropped; the in-flight batch survives
        let dropped = acc.sweep_at(1_000_000, 5_000).unwrap();
        assert_eq!(dropped.len(), 1);
        let snap = acc.status(&payer).unwrap().unwrap();
        assert_eq!(snap.size, 0);
        assert_eq!(snap.in_flight.unwrap().batch_id, batch.batch_id);
    }

    #[test]
    fn test_record_after_reap_starts_new_batch() {
        let acc = acc();
        let payer = PayerId::from("p");
        rec(&acc, &payer, "a", 5, 0);
        acc.sweep_at(1_000_000, 5_000).unwrap();

        let snap = rec(&acc, &payer, "a", 5, 1_000_001);
        assert_eq!(snap.size, 1);
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_concurrent_payers_lose_nothing() {
        let acc = Arc::new(BatchAccumulator::new(1_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let acc = acc.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let payer = PayerId::new(format!("payer-{}", i % 4));
                        acc.record_at(&payer, Decimal::ONE, 1, &format!("t{}-{}", t, i), 0).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let total: usize = acc
            .payers()
            .iter()
            .map(|p| acc.status(p).unwrap().unwrap().size)
            .sum();
        assert_eq!(total, 1_600);
    }
}
