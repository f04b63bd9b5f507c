//! Ledger client interface.
//!
//! The pipeline talks to the ledger only through [`LedgerClient`]. Reads and
//! simulations never mutate state; `submit` is the single mutating call and
//! `find_settlement` lets a caller re-read the outcome of an earlier submission.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::usage::{PayerId, ProviderId};
use crate::error::Result;
use crate::utils::crypto::{Hash, PublicKey};

/// A settlement as submitted to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementCall {
    /// Batch being settled
    pub batch_id: Hash,
    /// Payer debited
    pub payer: PayerId,
    /// Provider credited
    pub provider: ProviderId,
    /// Amount in cents
    pub amount: u64,
    /// API calls covered
    pub num_calls: u32,
    /// Proof bytes
    pub proof: Vec<u8>,
    /// Hash of the proof's public inputs
    pub public_inputs_hash: Hash,
    /// Identity of the submitting verifier
    pub caller: PublicKey,
}

/// Result of a dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationOutcome {
    /// The call would succeed
    Ok {
        /// Estimated execution cost
        resource_estimate: u64,
    },
    /// The call would revert
    Reverted {
        /// Decoded revert reason
        reason: String,
    },
}

impl SimulationOutcome {
    /// Whether the call would succeed
    pub fn is_ok(&self) -> bool {
        matches!(self, SimulationOutcome::Ok { .. })
    }
}

/// Confirmation of a committed settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    /// Transaction hash
    pub tx_ref: Hash,
    /// Block number the settlement landed in
    pub block_ref: u64,
    /// Execution cost
    pub resource_used: u64,
    /// Batch settled
    pub batch_id: Hash,
    /// Amount moved, in cents
    pub amount: u64,
    /// Payer balance before the settlement
    pub balance_before: u64,
    /// Payer balance after the settlement
    pub balance_after: u64,
    /// Commit time (unix ms)
    pub timestamp: u64,
}

/// Ledger access used by the gateway
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Escrowed balance of a payer, in cents
    async fn read_balance(&self, payer: &PayerId) -> Result<u64>;

    /// Dry-run a settlement against current state
    async fn simulate(&self, call: &SettlementCall) -> Result<SimulationOutcome>;

    /// Commit a settlement and wait for confirmation
    async fn submit(&self, call: &SettlementCall) -> Result<LedgerReceipt>;

    /// Receipt of an earlier settlement of `batch_id`, if one landed
    async fn find_settlement(&self, batch_id: &Hash) -> Result<Option<LedgerReceipt>>;
}
