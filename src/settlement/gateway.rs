//! Settlement gateway.
//!
//! The gateway is the only component that moves funds. For every request it
//! re-reads the ledger for an earlier settlement of the same batch, verifies
//! the proof against public inputs it derives itself, checks the payer's
//! balance, dry-runs the call and only then submits it. Requests for the same
//! `(payer, provider)` pair are serialized.
//!
//! A submission runs on its own task. When it outlives the settlement deadline
//! the caller gets an ambiguous error, but the task keeps the pair lock and
//! still logs the settlement once the ledger confirms it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::core::batch::derive_batch_id;
use crate::core::config::MeteringConfig;
use crate::core::usage::{now_millis, PayerId, ProviderId};
use crate::error::{Error, Result};
use crate::ledger::client::{LedgerClient, LedgerReceipt, SettlementCall, SimulationOutcome};
use crate::ledger::transaction_log::{LedgerRef, LedgerTransaction, ProofRef, TransactionLog};
use crate::settlement::request::SettlementRequest;
use crate::utils::crypto::{create_message_hash, Hash, KeyPair, PublicKey};
use crate::zkp::verifier::ProofVerifier;

// ═══════════════════════════════════════════════════════════════════════════════
// RECEIPT
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of a successful settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// Batch settled
    pub batch_id: Hash,
    /// Payer debited
    pub payer: PayerId,
    /// Provider credited
    pub provider: ProviderId,
    /// Amount in cents
    pub amount: u64,
    /// API calls covered
    pub num_calls: u32,
    /// Ledger transaction hash
    pub tx_ref: Hash,
    /// Ledger block number
    pub block_ref: u64,
    /// Execution cost
    pub resource_used: u64,
    /// Payer balance before
    pub balance_before: u64,
    /// Payer balance after
    pub balance_after: u64,
    /// Found on the ledger from an earlier submission
    pub reconciled: bool,
    /// Settlement time (unix ms)
    pub settled_at: u64,
}

impl SettlementReceipt {
    fn from_ledger(request: &SettlementRequest, receipt: &LedgerReceipt, reconciled: bool) -> Self {
        Self {
            batch_id: request.batch_id,
            payer: request.payer.clone(),
            provider: request.provider.clone(),
            amount: receipt.amount,
            num_calls: request.num_calls(),
            tx_ref: receipt.tx_ref,
            block_ref: receipt.block_ref,
            resource_used: receipt.resource_used,
            balance_before: receipt.balance_before,
            balance_after: receipt.balance_after,
            reconciled,
            settled_at: receipt.timestamp,
        }
    }
}

/// Accepts proven batches for settlement
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Verify and settle one request
    async fn settle(&self, request: SettlementRequest) -> Result<SettlementReceipt>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// GATEWAY VERIFIER
// ═══════════════════════════════════════════════════════════════════════════════

fn log_settlement(
    log: &TransactionLog,
    request: &SettlementRequest,
    receipt: &LedgerReceipt,
    public_inputs_hash: Hash,
    reconciled: bool,
) -> Result<()> {
    let mut id_data = request.batch_id.as_bytes().to_vec();
    id_data.extend_from_slice(receipt.tx_ref.as_bytes());

    let appended = log.append(LedgerTransaction {
        id: create_message_hash("log", &id_data),
        batch_id: request.batch_id,
        payer: request.payer.clone(),
        provider: request.provider.clone(),
        amount: receipt.amount,
        balance_before: receipt.balance_before,
        balance_after: receipt.balance_after,
        ledger_ref: LedgerRef {
            block_number: receipt.block_ref,
            tx_hash: receipt.tx_ref,
        },
        proof_ref: ProofRef {
            proof_hash: request.proof.hash(),
            circuit_id: request.proof.circuit_id.clone(),
            public_inputs_hash,
        },
        num_calls: request.num_calls(),
        reconciled,
        timestamp: now_millis(),
    })?;
    if !appended {
        debug!(batch = %request.batch_id.short(), "Settlement already logged");
    }
    Ok(())
}

type PairKey = (PayerId, ProviderId);

/// In-process gateway that verifies proofs and settles on a ledger
pub struct GatewayVerifier {
    verifier: ProofVerifier,
    ledger: Arc<dyn LedgerClient>,
    log: Arc<TransactionLog>,
    identity: KeyPair,
    coordinators: RwLock<HashSet<PublicKey>>,
    pair_locks: Mutex<HashMap<PairKey, Arc<tokio::sync::Mutex<()>>>>,
    rpc_timeout: Duration,
    settlement_timeout: Duration,
}

impl GatewayVerifier {
    /// Create a gateway submitting to `ledger` as `identity`
    pub fn new(
        verifier: ProofVerifier,
        ledger: Arc<dyn LedgerClient>,
        log: Arc<TransactionLog>,
        identity: KeyPair,
        config: &MeteringConfig,
    ) -> Self {
        Self {
            verifier,
            ledger,
            log,
            identity,
            coordinators: RwLock::new(HashSet::new()),
            pair_locks: Mutex::new(HashMap::new()),
            rpc_timeout: config.rpc_timeout(),
            settlement_timeout: config.settlement_timeout(),
        }
    }

    /// Key the gateway signs ledger calls with
    pub fn identity(&self) -> PublicKey {
        *self.identity.public_key()
    }

    /// Accept requests signed by `coordinator`. Once any key is registered,
    /// unsigned requests are refused.
    pub fn authorize(&self, coordinator: PublicKey) -> Result<()> {
        self.coordinators
            .write()
            .map_err(|_| Error::Lock)?
            .insert(coordinator);
        Ok(())
    }

    /// Transaction log of settled batches
    pub fn transaction_log(&self) -> &Arc<TransactionLog> {
        &self.log
    }

    fn check_authorization(&self, request: &SettlementRequest) -> Result<()> {
        let coordinators = self.coordinators.read().map_err(|_| Error::Lock)?;
        if coordinators.is_empty() {
            return Ok(());
        }
        let signer = request.verify_signature()?;
        if !coordinators.contains(&signer) {
            return Err(Error::Unauthorized(format!("unknown coordinator {}", signer)));
        }
        Ok(())
    }

    fn pair_lock(&self, key: &PairKey) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.pair_locks.lock().map_err(|_| Error::Lock)?;
        Ok(locks.entry(key.clone()).or_default().clone())
    }

    /// Drop the pair's lock once nobody holds or waits on it
    fn prune_pair_lock(&self, key: &PairKey) {
        if let Ok(mut locks) = self.pair_locks.lock() {
            if locks.get(key).map_or(false, |lock| Arc::strong_count(lock) == 1) {
                locks.remove(key);
            }
        }
    }

    /// Run a read-only ledger call under the RPC deadline
    async fn read<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match timeout(self.rpc_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: operation.into(),
                timeout_ms: self.rpc_timeout.as_millis() as u64,
            }),
        }
    }

    async fn settle_locked(
        &self,
        request: &SettlementRequest,
        pair_guard: OwnedMutexGuard<()>,
    ) -> Result<SettlementReceipt> {
        let batch_id = request.batch_id;
        if request.summary.batch_id != batch_id
            || request.summary.payer != request.payer
            || derive_batch_id(&request.payer, request.summary.nonce) != batch_id
        {
            return Err(Error::VerificationRejected {
                batch_id: batch_id.to_hex(),
                reason: "request does not match batch summary".into(),
            });
        }

        // An earlier attempt may have landed without us seeing the response
        if let Some(existing) = self
            .read("find_settlement", self.ledger.find_settlement(&batch_id))
            .await?
        {
            let amount = request.claimed_total();
            if existing.batch_id != batch_id || existing.amount != amount {
                return Err(Error::VerificationRejected {
                    batch_id: batch_id.to_hex(),
                    reason: format!(
                        "ledger settled {} for batch {}, request claims {}",
                        existing.amount,
                        existing.batch_id.short(),
                        amount
                    ),
                });
            }
            let public_hash = request.proof.public_inputs.hash()?;
            log_settlement(&self.log, request, &existing, public_hash, true)?;
            info!(
                batch = %batch_id.short(),
                payer = %request.payer,
                block = existing.block_ref,
                "Reconciled settlement from ledger"
            );
            return Ok(SettlementReceipt::from_ledger(request, &existing, true));
        }

        let verification = self
            .verifier
            .verify(&request.summary, &request.proof)
            .into_result(&batch_id)?;

        let amount = request.claimed_total();
        let balance = self
            .read("read_balance", self.ledger.read_balance(&request.payer))
            .await?;
        if balance < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }

        let call = SettlementCall {
            batch_id,
            payer: request.payer.clone(),
            provider: request.provider.clone(),
            amount,
            num_calls: request.num_calls(),
            proof: request.proof.proof.clone(),
            public_inputs_hash: verification.public_inputs_hash,
            caller: self.identity(),
        };

        match self.read("simulate", self.ledger.simulate(&call)).await? {
            SimulationOutcome::Ok { resource_estimate } => {
                debug!(batch = %batch_id.short(), resource_estimate, "Simulation passed");
            }
            SimulationOutcome::Reverted { reason } => {
                return Err(Error::LedgerSimulation { reason });
            }
        }

        let ledger = Arc::clone(&self.ledger);
        let log = Arc::clone(&self.log);
        let submitted = request.clone();
        let public_inputs_hash = verification.public_inputs_hash;
        let mut submission = tokio::spawn(async move {
            let _pair = pair_guard;
            let receipt = ledger.submit(&call).await?;
            log_settlement(&log, &submitted, &receipt, public_inputs_hash, false)?;
            Ok::<_, Error>(receipt)
        });

        let receipt = match timeout(self.settlement_timeout, &mut submission).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                return Err(Error::LedgerSubmission {
                    reason: format!("submission task failed: {}", join_err),
                    ambiguous: true,
                })
            }
            Err(_) => {
                warn!(
                    batch = %batch_id.short(),
                    timeout_ms = self.settlement_timeout.as_millis() as u64,
                    "Submission still pending, left running"
                );
                return Err(Error::LedgerSubmission {
                    reason: format!(
                        "no confirmation within {}ms",
                        self.settlement_timeout.as_millis()
                    ),
                    ambiguous: true,
                });
            }
        };

        info!(
            batch = %batch_id.short(),
            payer = %request.payer,
            provider = %request.provider,
            amount,
            balance_after = receipt.balance_after,
            block = receipt.block_ref,
            "Settlement confirmed"
        );
        Ok(SettlementReceipt::from_ledger(request, &receipt, false))
    }
}

#[async_trait]
impl SettlementGateway for GatewayVerifier {
    async fn settle(&self, request: SettlementRequest) -> Result<SettlementReceipt> {
        self.check_authorization(&request)?;

        let key = (request.payer.clone(), request.provider.clone());
        let guard = self.pair_lock(&key)?.lock_owned().await;
        let result = self.settle_locked(&request, guard).await;
        self.prune_pair_lock(&key);

        if let Err(e) = &result {
            warn!(
                batch = %request.batch_id.short(),
                payer = %request.payer,
                code = e.code(),
                error = %e,
                "Settlement refused"
            );
        }
        result
    }
}
