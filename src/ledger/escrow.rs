//! In-process escrow ledger.
//!
//! Models the escrow contract settlements are committed to: payers deposit
//! funds, a single authorized verifier settles proven batches from a payer's
//! balance into a provider's earnings, and every change emits an event.
//! Fault injection hooks let tests and demos exercise slow and ambiguous
//! submissions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::usage::{now_millis, PayerId, ProviderId};
use crate::error::{Error, Result};
use crate::ledger::client::{LedgerClient, LedgerReceipt, SettlementCall, SimulationOutcome};
use crate::ledger::events::{EscrowEvent, EscrowEventRecord};
use crate::utils::crypto::{create_message_hash, Hash, PublicKey};
use crate::utils::math::{safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// REVERT REASONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Settlements are paused
pub const REVERT_PAUSED: &str = "Escrow: paused";
/// Caller is not the registered verifier
pub const REVERT_NOT_VERIFIER: &str = "Escrow: caller is not the verifier";
/// Settlement of zero
pub const REVERT_ZERO_AMOUNT: &str = "Escrow: zero amount";
/// Missing proof
pub const REVERT_EMPTY_PROOF: &str = "Escrow: empty proof";
/// Payer cannot cover the amount
pub const REVERT_INSUFFICIENT_BALANCE: &str = "Escrow: insufficient balance";
/// Batch id already settled
pub const REVERT_ALREADY_SETTLED: &str = "Escrow: batch already settled";

/// Base execution cost of a settlement
const BASE_RESOURCE_COST: u64 = 21_000;
/// Execution cost per settled call
const PER_CALL_RESOURCE_COST: u64 = 5_000;
/// Execution cost per proof byte
const PER_PROOF_BYTE_COST: u64 = 16;

// ═══════════════════════════════════════════════════════════════════════════════
// STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct EscrowState {
    balances: HashMap<PayerId, u64>,
    earnings: HashMap<ProviderId, u64>,
    settled: HashMap<Hash, LedgerReceipt>,
    events: Vec<EscrowEventRecord>,
    block_number: u64,
    paused: bool,
    verifier: Option<PublicKey>,
}

impl EscrowState {
    fn balance(&self, payer: &PayerId) -> u64 {
        self.balances.get(payer).copied().unwrap_or(0)
    }

    fn check(&self, call: &SettlementCall) -> std::result::Result<(), &'static str> {
        if self.paused {
            return Err(REVERT_PAUSED);
        }
        if self.verifier.as_ref() != Some(&call.caller) {
            return Err(REVERT_NOT_VERIFIER);
        }
        if call.amount == 0 {
            return Err(REVERT_ZERO_AMOUNT);
        }
        if call.proof.is_empty() {
            return Err(REVERT_EMPTY_PROOF);
        }
        if self.settled.contains_key(&call.batch_id) {
            return Err(REVERT_ALREADY_SETTLED);
        }
        if self.balance(&call.payer) < call.amount {
            return Err(REVERT_INSUFFICIENT_BALANCE);
        }
        Ok(())
    }

    /// Append an event in a new block
    fn emit(&mut self, event: EscrowEvent) -> (u64, Hash, u64) {
        self.block_number += 1;
        let timestamp = now_millis();
        let mut data = self.block_number.to_le_bytes().to_vec();
        data.extend_from_slice(&bincode::serialize(&event).unwrap_or_default());
        let tx_hash = create_message_hash(event.name(), &data);

        self.events.push(EscrowEventRecord {
            event,
            block_number: self.block_number,
            tx_hash,
            timestamp,
        });
        (self.block_number, tx_hash, timestamp)
    }
}

fn resource_cost(call: &SettlementCall) -> u64 {
    BASE_RESOURCE_COST
        + PER_CALL_RESOURCE_COST * call.num_calls as u64
        + PER_PROOF_BYTE_COST * call.proof.len() as u64
}

// ═══════════════════════════════════════════════════════════════════════════════
// ESCROW LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// In-process escrow ledger
#[derive(Debug, Default)]
pub struct EscrowLedger {
    state: Mutex<EscrowState>,
    submit_delay: Mutex<Duration>,
    read_delay: Mutex<Duration>,
    drop_next_response: AtomicBool,
}

impl EscrowLedger {
    /// Create an empty ledger with no verifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger with `verifier` authorized to settle
    pub fn with_verifier(verifier: PublicKey) -> Self {
        let ledger = Self::new();
        if let Ok(mut state) = ledger.state.lock() {
            state.verifier = Some(verifier);
        }
        ledger
    }

    fn state(&self) -> Result<MutexGuard<'_, EscrowState>> {
        self.state.lock().map_err(|_| Error::Lock)
    }

    /// Fund a payer's escrow
    pub fn deposit(&self, payer: &PayerId, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(Error::InvalidParameter {
                name: "amount".into(),
                reason: REVERT_ZERO_AMOUNT.into(),
            });
        }
        let mut state = self.state()?;
        let balance = safe_add(state.balance(payer), amount)?;
        state.balances.insert(payer.clone(), balance);
        state.emit(EscrowEvent::UserDeposit {
            payer: payer.clone(),
            amount,
        });
        info!(payer = %payer, amount, balance, "Escrow deposit");
        Ok(balance)
    }

    /// Withdraw unspent escrow
    pub fn withdraw(&self, payer: &PayerId, amount: u64) -> Result<u64> {
        let mut state = self.state()?;
        let available = state.balance(payer);
        if amount == 0 || amount > available {
            return Err(Error::InsufficientBalance {
                required: amount,
                available,
            });
        }
        let balance = safe_sub(available, amount)?;
        state.balances.insert(payer.clone(), balance);
        state.emit(EscrowEvent::UserWithdraw {
            payer: payer.clone(),
            amount,
        });
        Ok(balance)
    }

    /// Withdraw a provider's earnings
    pub fn provider_withdraw(&self, provider: &ProviderId, amount: u64) -> Result<u64> {
        let mut state = self.state()?;
        let available = state.earnings.get(provider).copied().unwrap_or(0);
        if amount == 0 || amount > available {
            return Err(Error::InsufficientBalance {
                required: amount,
                available,
            });
        }
        let remaining = safe_sub(available, amount)?;
        state.earnings.insert(provider.clone(), remaining);
        state.emit(EscrowEvent::ProviderWithdraw {
            provider: provider.clone(),
            amount,
        });
        Ok(remaining)
    }

    /// Pause or resume settlements
    pub fn set_paused(&self, paused: bool) -> Result<()> {
        let mut state = self.state()?;
        if state.paused != paused {
            state.paused = paused;
            state.emit(EscrowEvent::PausedChanged { paused });
        }
        Ok(())
    }

    /// Replace the authorized verifier
    pub fn set_verifier(&self, verifier: PublicKey) -> Result<()> {
        let mut state = self.state()?;
        let old = state.verifier.replace(verifier);
        state.emit(EscrowEvent::ZkVerifierUpdated { old, new: verifier });
        info!(verifier = %verifier, "Escrow verifier updated");
        Ok(())
    }

    /// Escrowed balance of a payer
    pub fn balance_of(&self, payer: &PayerId) -> u64 {
        self.state.lock().map(|s| s.balance(payer)).unwrap_or(0)
    }

    /// Earnings of a provider
    pub fn earnings_of(&self, provider: &ProviderId) -> u64 {
        self.state
            .lock()
            .map(|s| s.earnings.get(provider).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Current block number
    pub fn block_number(&self) -> u64 {
        self.state.lock().map(|s| s.block_number).unwrap_or(0)
    }

    /// Every event emitted so far
    pub fn events(&self) -> Vec<EscrowEventRecord> {
        self.state.lock().map(|s| s.events.clone()).unwrap_or_default()
    }

    /// Number of settled batches
    pub fn settlement_count(&self) -> usize {
        self.state.lock().map(|s| s.settled.len()).unwrap_or(0)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FAULT INJECTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Delay confirmation of every submission by `delay` (after commit)
    pub fn set_submit_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.submit_delay.lock() {
            *d = delay;
        }
    }

    /// Delay every balance read by `delay`
    pub fn set_read_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.read_delay.lock() {
            *d = delay;
        }
    }

    /// Commit the next submission but report it as failed
    pub fn drop_next_response(&self) {
        self.drop_next_response.store(true, Ordering::SeqCst);
    }

    fn delay(cell: &Mutex<Duration>) -> Duration {
        cell.lock().map(|d| *d).unwrap_or_default()
    }

    fn commit(&self, call: &SettlementCall) -> Result<LedgerReceipt> {
        let mut state = self.state()?;
        if let Err(reason) = state.check(call) {
            return Err(Error::LedgerSubmission {
                reason: reason.into(),
                ambiguous: false,
            });
        }

        let balance_before = state.balance(&call.payer);
        let balance_after = safe_sub(balance_before, call.amount)?;
        let earnings = safe_add(
            state.earnings.get(&call.provider).copied().unwrap_or(0),
            call.amount,
        )?;
        state.balances.insert(call.payer.clone(), balance_after);
        state.earnings.insert(call.provider.clone(), earnings);

        let (block_ref, tx_ref, timestamp) = state.emit(EscrowEvent::BatchPayment {
            payer: call.payer.clone(),
            provider: call.provider.clone(),
            amount: call.amount,
            num_calls: call.num_calls,
            batch_id: call.batch_id,
        });

        let receipt = LedgerReceipt {
            tx_ref,
            block_ref,
            resource_used: resource_cost(call),
            batch_id: call.batch_id,
            amount: call.amount,
            balance_before,
            balance_after,
            timestamp,
        };
        state.settled.insert(call.batch_id, receipt.clone());
        Ok(receipt)
    }
}

#[async_trait]
impl LedgerClient for EscrowLedger {
    async fn read_balance(&self, payer: &PayerId) -> Result<u64> {
        let delay = Self::delay(&self.read_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state()?.balance(payer))
    }

    async fn simulate(&self, call: &SettlementCall) -> Result<SimulationOutcome> {
        let state = self.state()?;
        Ok(match state.check(call) {
            Ok(()) => SimulationOutcome::Ok {
                resource_estimate: resource_cost(call),
            },
            Err(reason) => SimulationOutcome::Reverted {
                reason: reason.into(),
            },
        })
    }

    async fn submit(&self, call: &SettlementCall) -> Result<LedgerReceipt> {
        let receipt = self.commit(call)?;
        debug!(batch = %call.batch_id.short(), block = receipt.block_ref, "Settlement committed");

        let delay = Self::delay(&self.submit_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.drop_next_response.swap(false, Ordering::SeqCst) {
            return Err(Error::LedgerSubmission {
                reason: "connection reset before confirmation".into(),
                ambiguous: true,
            });
        }
        Ok(receipt)
    }

    async fn find_settlement(&self, batch_id: &Hash) -> Result<Option<LedgerReceipt>> {
        Ok(self.state()?.settled.get(batch_id).cloned())
    }
}
