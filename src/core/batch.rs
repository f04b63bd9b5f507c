//! Batches of usage records.
//!
//! A [`Batch`] buffers a payer's records until it reaches capacity. Once ready
//! it is split into a [`NormalizedBatch`] of exactly `capacity` entries, which is
//! what gets proven and settled, and a leftover batch carrying the remainder.

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::usage::{PayerId, UsageRecord};
use crate::error::Result;
use crate::utils::constants::BATCH_ID_TAG;
use crate::utils::crypto::Hash;
use crate::utils::math::checked_sum;
use crate::zkp::field::FieldElement;

// ═══════════════════════════════════════════════════════════════════════════════
// NONCE AND ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-batch-instance nonce, bound into the proof commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchNonce(u64);

impl BatchNonce {
    /// Draw a fresh random nonce
    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }

    /// Wrap a known nonce
    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Raw nonce value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Canonical field encoding
    pub fn to_field(&self) -> FieldElement {
        FieldElement::from_u64(self.0)
    }
}

/// Derive the id of a batch instance from its payer and nonce
pub fn derive_batch_id(payer: &PayerId, nonce: BatchNonce) -> Hash {
    let payer = payer.as_str().as_bytes();
    let mut data = Vec::with_capacity(BATCH_ID_TAG.len() + 8 + payer.len() + 8);
    data.extend_from_slice(BATCH_ID_TAG.as_bytes());
    data.extend_from_slice(&(payer.len() as u64).to_le_bytes());
    data.extend_from_slice(payer);
    data.extend_from_slice(&nonce.value().to_le_bytes());
    Hash::blake3(&data)
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle of an in-flight batch. Settled batches leave the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchState {
    /// Normalized and waiting for a settlement attempt
    Open,
    /// Proof generation in progress
    Proving,
    /// Gateway verification and ledger submission in progress
    Settling,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchState::Open => "open",
            BatchState::Proving => "proving",
            BatchState::Settling => "settling",
        };
        f.write_str(s)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH
// ═══════════════════════════════════════════════════════════════════════════════

/// A payer's open buffer of usage records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Hash of payer and nonce
    pub id: Hash,
    /// Owner of every entry
    pub payer: PayerId,
    /// Records in insertion order
    pub entries: Vec<UsageRecord>,
    /// Entries covered by one proof
    pub capacity: usize,
    /// Nonce of this batch instance
    pub nonce: BatchNonce,
    /// Creation time (unix ms)
    pub created_at: u64,
    /// Time of the last append (unix ms)
    pub last_updated: u64,
    /// Sum of all buffered usage units, for display only
    pub running_total: u64,
}

impl Batch {
    /// Create an empty batch with a fresh nonce
    pub fn new(payer: PayerId, capacity: usize, now: u64) -> Self {
        Self::with_entries(payer, capacity, Vec::new(), now)
    }

    /// Create a batch holding `entries`, with a fresh nonce
    pub fn with_entries(payer: PayerId, capacity: usize, entries: Vec<UsageRecord>, now: u64) -> Self {
        let nonce = BatchNonce::random();
        let running_total = entries
            .iter()
            .fold(0u64, |acc, e| acc.saturating_add(e.usage_units));
        Self {
            id: derive_batch_id(&payer, nonce),
            payer,
            entries,
            capacity,
            nonce,
            created_at: now,
            last_updated: now,
            running_total,
        }
    }

    /// Append a record
    pub fn push(&mut self, record: UsageRecord, now: u64) {
        self.running_total = self.running_total.saturating_add(record.usage_units);
        self.entries.push(record);
        self.last_updated = now;
    }

    /// Number of buffered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entries are buffered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Proof-eligible once at least `capacity` entries are buffered
    pub fn is_ready(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Under capacity and idle for longer than `timeout_ms`
    pub fn is_stale(&self, now: u64, timeout_ms: u64) -> bool {
        !self.is_ready() && now.saturating_sub(self.last_updated) > timeout_ms
    }

    /// Whether a request id is already buffered
    pub fn contains_request(&self, request_id: &str) -> bool {
        self.entries.iter().any(|e| e.request_id == request_id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NORMALIZED BATCH
// ═══════════════════════════════════════════════════════════════════════════════

/// Exactly `capacity` entries taken FIFO from a ready batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedBatch {
    /// Id of the source batch
    pub batch_id: Hash,
    /// Payer billed
    pub payer: PayerId,
    /// Entries covered by the proof, in FIFO order
    pub entries: Vec<UsageRecord>,
    /// Sum of the entries' usage units
    pub claimed_total: u64,
    /// Request ids of the entries, in order
    pub request_ids: Vec<String>,
    /// Nonce of the source batch
    pub nonce: BatchNonce,
    /// Normalization time (unix ms)
    pub normalized_at: u64,
}

impl NormalizedBatch {
    /// Number of entries (always the batch capacity)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Per-entry data carried alongside the proof for independent verification
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            batch_id: self.batch_id,
            payer: self.payer.clone(),
            nonce: self.nonce,
            entries: self
                .entries
                .iter()
                .map(|e| SummaryEntry {
                    request_id: e.request_id.clone(),
                    usage_units: e.usage_units,
                    response_value: e.response_value,
                })
                .collect(),
        }
    }
}

/// One entry of a [`BatchSummary`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    /// Request id
    pub request_id: String,
    /// Cost in cents
    pub usage_units: u64,
    /// Response value
    pub response_value: Decimal,
}

/// The data a verifier needs to re-derive a proof's public inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Batch id the proof claims to cover
    pub batch_id: Hash,
    /// Payer billed
    pub payer: PayerId,
    /// Nonce of the batch
    pub nonce: BatchNonce,
    /// Entries in FIFO order
    pub entries: Vec<SummaryEntry>,
}

impl BatchSummary {
    /// Usage units in order
    pub fn usage_units(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.usage_units).collect()
    }

    /// Request ids in order
    pub fn request_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.request_id.clone()).collect()
    }

    /// Sum of usage units, failing on overflow
    pub fn claimed_total(&self) -> Result<u64> {
        checked_sum(self.entries.iter().map(|e| e.usage_units))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a normalized batch awaiting settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightStatus {
    /// Batch id
    pub batch_id: Hash,
    /// Proving, Settling, or Open while waiting for a retry
    pub state: BatchState,
    /// Settlement attempts so far
    pub attempts: u32,
    /// Last submission may have landed
    pub ambiguous: bool,
    /// Claimed total of the normalized entries
    pub claimed_total: u64,
}

/// Caller-visible view of a payer's batches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    /// Payer
    pub payer: PayerId,
    /// Id of the open batch, if any
    pub batch_id: Option<Hash>,
    /// Entries in the open batch
    pub size: usize,
    /// Batch capacity
    pub capacity: usize,
    /// Running total of the open batch
    pub claimed_so_far: u64,
    /// Open batch has reached capacity
    pub ready: bool,
    /// Normalized batch awaiting settlement
    pub in_flight: Option<InFlightStatus>,
}
