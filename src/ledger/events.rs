//! Escrow ledger events.
//!
//! Every state change on the escrow ledger emits one [`EscrowEvent`], stamped
//! with the block it landed in. The event stream is what an indexer would
//! consume to rebuild balances and payment history.

use serde::{Deserialize, Serialize};

use crate::core::usage::{PayerId, ProviderId};
use crate::utils::crypto::{Hash, PublicKey};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// State change on the escrow ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowEvent {
    /// Payer funded their escrow
    UserDeposit {
        /// Payer
        payer: PayerId,
        /// Amount in cents
        amount: u64,
    },
    /// Payer withdrew unspent escrow
    UserWithdraw {
        /// Payer
        payer: PayerId,
        /// Amount in cents
        amount: u64,
    },
    /// Provider withdrew earnings
    ProviderWithdraw {
        /// Provider
        provider: ProviderId,
        /// Amount in cents
        amount: u64,
    },
    /// A proven batch was settled
    BatchPayment {
        /// Payer debited
        payer: PayerId,
        /// Provider credited
        provider: ProviderId,
        /// Amount in cents
        amount: u64,
        /// API calls covered
        num_calls: u32,
        /// Batch settled
        batch_id: Hash,
    },
    /// The authorized verifier was replaced
    ZkVerifierUpdated {
        /// Previous verifier, if any
        old: Option<PublicKey>,
        /// New verifier
        new: PublicKey,
    },
    /// Settlements were paused or resumed
    PausedChanged {
        /// New paused flag
        paused: bool,
    },
}

impl EscrowEvent {
    /// Event name as emitted on the ledger
    pub fn name(&self) -> &'static str {
        match self {
            EscrowEvent::UserDeposit { .. } => "UserDeposit",
            EscrowEvent::UserWithdraw { .. } => "UserWithdraw",
            EscrowEvent::ProviderWithdraw { .. } => "ProviderWithdraw",
            EscrowEvent::BatchPayment { .. } => "BatchPayment",
            EscrowEvent::ZkVerifierUpdated { .. } => "ZkVerifierUpdated",
            EscrowEvent::PausedChanged { .. } => "PausedChanged",
        }
    }

    /// Whether the event concerns `payer`
    pub fn involves_payer(&self, payer: &PayerId) -> bool {
        match self {
            EscrowEvent::UserDeposit { payer: p, .. }
            | EscrowEvent::UserWithdraw { payer: p, .. }
            | EscrowEvent::BatchPayment { payer: p, .. } => p == payer,
            _ => false,
        }
    }
}

/// An event with its position on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowEventRecord {
    /// The event
    pub event: EscrowEvent,
    /// Block number
    pub block_number: u64,
    /// Transaction hash
    pub tx_hash: Hash,
    /// Commit time (unix ms)
    pub timestamp: u64,
}

/// Batch payments made by `payer`, oldest first
pub fn payments_of<'a>(
    records: &'a [EscrowEventRecord],
    payer: &'a PayerId,
) -> impl Iterator<Item = &'a EscrowEventRecord> + 'a {
    records.iter().filter(move |r| {
        matches!(&r.event, EscrowEvent::BatchPayment { payer: p, .. } if p == payer)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event: EscrowEvent, block: u64) -> EscrowEventRecord {
        EscrowEventRecord {
            event,
            block_number: block,
            tx_hash: Hash::sha256(&block.to_le_bytes()),
            timestamp: 0,
        }
    }

    #[test]
    fn test_payments_of() {
        let alice = PayerId::from("alice");
        let bob = PayerId::from("bob");
        let provider = ProviderId::from("api");
        let records = vec![
            record(EscrowEvent::UserDeposit { payer: alice.clone(), amount: 100 }, 1),
            record(
                EscrowEvent::BatchPayment {
                    payer: alice.clone(),
                    provider: provider.clone(),
                    amount: 88,
                    num_calls: 4,
                    batch_id: Hash::sha256(b"1"),
                },
                2,
            ),
            record(
                EscrowEvent::BatchPayment {
                    payer: bob.clone(),
                    provider,
                    amount: 10,
                    num_calls: 4,
                    batch_id: Hash::sha256(b"2"),
                },
                3,
            ),
        ];

        let alice_payments: Vec<_> = payments_of(&records, &alice).collect();
        assert_eq!(alice_payments.len(), 1);
        assert_eq!(alice_payments[0].block_number, 2);
        assert!(records[0].event.involves_payer(&alice));
        assert!(!records[0].event.involves_payer(&bob));
        assert_eq!(records[1].event.name(), "BatchPayment");
    }
}
