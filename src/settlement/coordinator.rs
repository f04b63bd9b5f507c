//! Settlement coordination.
//!
//! The [`SettlementCoordinator`] ties the pipeline together: it records usage
//! into the accumulator, proves ready batches, sends them through a
//! [`SettlementGateway`] and tells the accumulator the outcome. A batch only
//! leaves the accumulator after the gateway confirms it; every other outcome
//! returns it for retry.
//!
//! Outcomes are logged and published to subscribers so failures in
//! background settlements are never lost.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::core::batch::{BatchSnapshot, NormalizedBatch};
use crate::core::config::MeteringConfig;
use crate::core::usage::{PayerId, ProviderId};
use crate::error::{Error, Result};
use crate::metering::accumulator::BatchAccumulator;
use crate::metering::reaper::StaleReaper;
use crate::monitoring::metrics::PipelineMetrics;
use crate::settlement::gateway::{SettlementGateway, SettlementReceipt};
use crate::settlement::request::SettlementRequest;
use crate::utils::constants::OUTCOME_CHANNEL_CAPACITY;
use crate::utils::crypto::{Hash, KeyPair};
use crate::zkp::generator::ProofGenerator;

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Published once per settlement attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    /// The batch was settled and removed from the accumulator
    Settled {
        /// Payer
        payer: PayerId,
        /// Attempt that succeeded
        attempt: u32,
        /// Ledger receipt
        receipt: SettlementReceipt,
    },
    /// The attempt failed
    Failed {
        /// Payer
        payer: PayerId,
        /// Batch attempted
        batch_id: Hash,
        /// Attempt that failed
        attempt: u32,
        /// Error kind
        kind: String,
        /// Error code
        code: u32,
        /// Error message
        message: String,
        /// The ledger may have applied the settlement
        ambiguous: bool,
        /// The batch is still held for retry
        retained: bool,
    },
}

impl SettlementOutcome {
    /// Payer the outcome concerns
    pub fn payer(&self) -> &PayerId {
        match self {
            SettlementOutcome::Settled { payer, .. } | SettlementOutcome::Failed { payer, .. } => payer,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, SettlementOutcome::Settled { .. })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COORDINATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Drives batches from ingress to settlement
pub struct SettlementCoordinator {
    config: MeteringConfig,
    provider: ProviderId,
    accumulator: Arc<BatchAccumulator>,
    generator: ProofGenerator,
    gateway: Arc<dyn SettlementGateway>,
    metrics: Arc<PipelineMetrics>,
    signer: Option<KeyPair>,
    outcomes: broadcast::Sender<SettlementOutcome>,
}

impl SettlementCoordinator {
    /// Create a coordinator settling for `config.provider_id`
    pub fn new(
        config: MeteringConfig,
        accumulator: Arc<BatchAccumulator>,
        generator: ProofGenerator,
        gateway: Arc<dyn SettlementGateway>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        Self {
            provider: ProviderId::new(config.provider_id.clone()),
            config,
            accumulator,
            generator,
            gateway,
            metrics,
            signer: None,
            outcomes,
        }
    }

    /// Sign every request with `keypair`
    pub fn with_signer(mut self, keypair: KeyPair) -> Self {
        self.signer = Some(keypair);
        self
    }

    pub fn accumulator(&self) -> &Arc<BatchAccumulator> {
        &self.accumulator
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &MeteringConfig {
        &self.config
    }

    /// Receive every outcome published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SettlementOutcome> {
        self.outcomes.subscribe()
    }

    /// Build a stale reaper over this coordinator's accumulator
    pub fn reaper(&self) -> StaleReaper {
        StaleReaper::new(
            Arc::clone(&self.accumulator),
            Arc::clone(&self.metrics),
            self.config.stale_timeout_ms(),
            self.config.reap_interval(),
        )
    }

    /// Record one usage event.
    ///
    /// With `auto_settle` on and a Tokio runtime available, a batch that
    /// becomes ready is settled on a background task.
    pub fn record_usage(
        self: &Arc<Self>,
        payer: &PayerId,
        response_value: Decimal,
        usage_units: u64,
        request_id: &str,
    ) -> Result<BatchSnapshot> {
        let result = self
            .accumulator
            .record(payer, response_value, usage_units, request_id);
        self.metrics.record_event(result.is_ok());
        let snapshot = result?;

        if snapshot.ready && self.config.auto_settle {
            if tokio::runtime::Handle::try_current().is_ok() {
                self.spawn_settlement(payer.clone());
            } else {
                debug!(payer = %payer, "No runtime, batch left for manual settlement");
            }
        }
        Ok(snapshot)
    }

    /// Settle the payer's next batch, if one is ready or waiting for retry
    pub async fn settle_payer(&self, payer: &PayerId) -> Result<Option<SettlementReceipt>> {
        let Some(ticket) = self.accumulator.begin_settlement(payer)? else {
            return Ok(None);
        };
        if ticket.attempt == 1 {
            self.metrics.record_normalized();
        }

        let batch = ticket.batch;
        match self.run(&batch).await {
            Ok(receipt) => {
                self.accumulator.complete(payer, &batch.batch_id)?;
                self.metrics.record_settlement(
                    payer,
                    receipt.amount,
                    receipt.num_calls as u64,
                    receipt.reconciled,
                    receipt.settled_at,
                );
                info!(
                    payer = %payer,
                    batch = %batch.batch_id.short(),
                    amount = receipt.amount,
                    attempt = ticket.attempt,
                    reconciled = receipt.reconciled,
                    "Batch settled"
                );
                self.publish(SettlementOutcome::Settled {
                    payer: payer.clone(),
                    attempt: ticket.attempt,
                    receipt: receipt.clone(),
                });
                Ok(Some(receipt))
            }
            Err(e) => {
                // Failing before the gateway re-read the ledger leaves an
                // earlier ambiguity unresolved
                let unresolved = matches!(e, Error::ProofGeneration { .. } | Error::Timeout { .. });
                let ambiguous = e.is_ambiguous() || (ticket.ambiguous && unresolved);
                let retained = match self.accumulator.release(payer, &batch.batch_id, ambiguous) {
                    Ok(()) => true,
                    Err(release_err) => {
                        error!(payer = %payer, error = %release_err, "Failed to return batch");
                        false
                    }
                };
                self.metrics.record_failure(&e);

                if ambiguous {
                    warn!(
                        payer = %payer,
                        batch = %batch.batch_id.short(),
                        error = %e,
                        "Settlement outcome unknown, ledger will be re-read before retry"
                    );
                } else {
                    error!(
                        payer = %payer,
                        batch = %batch.batch_id.short(),
                        kind = e.kind(),
                        code = e.code(),
                        error = %e,
                        "Settlement failed, batch retained"
                    );
                }
                self.publish(SettlementOutcome::Failed {
                    payer: payer.clone(),
                    batch_id: batch.batch_id,
                    attempt: ticket.attempt,
                    kind: e.kind().into(),
                    code: e.code(),
                    message: e.to_string(),
                    ambiguous,
                    retained,
                });
                Err(e)
            }
        }
    }

    async fn run(&self, batch: &NormalizedBatch) -> Result<SettlementReceipt> {
        let artifact = self.generator.generate(batch).await?;
        self.metrics.record_proof();
        self.accumulator.mark_settling(&batch.payer, &batch.batch_id)?;

        let mut request = SettlementRequest::new(batch, self.provider.clone(), artifact);
        if let Some(signer) = &self.signer {
            request = request.sign(signer)?;
        }

        // Detached: a missed deadline leaves a started submission running
        let deadline = self.config.gateway_deadline();
        let gateway = Arc::clone(&self.gateway);
        let mut attempt = tokio::spawn(async move { gateway.settle(request).await });
        match timeout(deadline, &mut attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(Error::LedgerSubmission {
                reason: format!("gateway task failed: {}", join_err),
                ambiguous: true,
            }),
            Err(_) => Err(Error::LedgerSubmission {
                reason: format!("gateway gave no answer within {}ms", deadline.as_millis()),
                ambiguous: true,
            }),
        }
    }

    fn publish(&self, outcome: SettlementOutcome) {
        // No subscribers is fine
        let _ = self.outcomes.send(outcome);
    }

    /// Settle a payer on a background task until nothing is ready.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_settlement(self: &Arc<Self>, payer: PayerId) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match coordinator.settle_payer(&payer).await {
                    Ok(Some(_)) => match coordinator.accumulator.has_pending_settlement(&payer) {
                        Ok(true) => continue,
                        _ => break,
                    },
                    // Failures were published by settle_payer
                    Ok(None) | Err(_) => break,
                }
            }
        })
    }

    /// Settle every payer with pending work, payers in parallel.
    ///
    /// Each payer is drained until nothing is ready or an attempt fails.
    pub async fn settle_all(self: &Arc<Self>) -> Vec<(PayerId, Result<Vec<SettlementReceipt>>)> {
        let mut handles = Vec::new();
        for payer in self.accumulator.payers() {
            if !self.accumulator.has_pending_settlement(&payer).unwrap_or(false) {
                continue;
            }
            let coordinator = Arc::clone(self);
            handles.push((
                payer.clone(),
                tokio::spawn(async move {
                    let mut receipts = Vec::new();
                    while let Some(receipt) = coordinator.settle_payer(&payer).await? {
                        receipts.push(receipt);
                        if !coordinator.accumulator.has_pending_settlement(&payer)? {
                            break;
                        }
                    }
                    Ok::<_, Error>(receipts)
                }),
            ));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (payer, handle) in handles {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(Error::Internal(format!("settlement task failed: {}", e))));
            results.push((payer, result));
        }
        results
    }
}
