//! Integration tests for the zkmeter pipeline.
//!
//! These tests drive usage from ingress through proving and settlement
//! against the in-process escrow ledger.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rust_decimal::Decimal;

use zkmeter::core::batch::BatchState;
use zkmeter::core::config::MeteringConfig;
use zkmeter::core::usage::{now_millis, PayerId, ProviderId};
use zkmeter::error::{Error, Result};
use zkmeter::ledger::client::{LedgerClient, LedgerReceipt, SettlementCall, SimulationOutcome};
use zkmeter::ledger::events::{payments_of, EscrowEvent};
use zkmeter::ledger::{EscrowLedger, TransactionLog};
use zkmeter::metering::BatchAccumulator;
use zkmeter::monitoring::metrics::PipelineMetrics;
use zkmeter::settlement::{
    GatewayVerifier, SettlementCoordinator, SettlementGateway, SettlementOutcome, SettlementRequest,
};
use zkmeter::utils::crypto::{Hash, KeyPair};
use zkmeter::zkp::{
    NativeProofSystem, ProofGenerator, ProofSystem, ProofVerifier, ProverBackend, UsagePrivateInputs,
    UsagePublicInputs, UsageWitness,
};

// ═══════════════════════════════════════════════════════════════════════════════
// TEST HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

struct Pipeline {
    coordinator: Arc<SettlementCoordinator>,
    gateway: Arc<GatewayVerifier>,
    ledger: Arc<EscrowLedger>,
    log: Arc<TransactionLog>,
}

fn pipeline_with(config: MeteringConfig, system: Arc<dyn ProofSystem>) -> Pipeline {
    let identity = KeyPair::generate();
    let coordinator_key = KeyPair::generate();
    let ledger = Arc::new(EscrowLedger::with_verifier(*identity.public_key()));
    let log = Arc::new(TransactionLog::new());

    let gateway = Arc::new(GatewayVerifier::new(
        ProofVerifier::new(system.clone(), config.batch_capacity),
        ledger.clone(),
        log.clone(),
        identity,
        &config,
    ));
    gateway.authorize(*coordinator_key.public_key()).unwrap();

    let coordinator = SettlementCoordinator::new(
        config.clone(),
        Arc::new(BatchAccumulator::new(config.batch_capacity)),
        ProofGenerator::new(system, config.prover_workers),
        gateway.clone(),
        Arc::new(PipelineMetrics::new()),
    )
    .with_signer(coordinator_key);

    Pipeline {
        coordinator: Arc::new(coordinator),
        gateway,
        ledger,
        log,
    }
}

fn pipeline() -> Pipeline {
    pipeline_with(
        MeteringConfig::default().with_auto_settle(false),
        Arc::new(NativeProofSystem::new()),
    )
}

fn record_all(p: &Pipeline, payer: &PayerId, units: &[u64], prefix: &str) {
    for (i, u) in units.iter().enumerate() {
        p.coordinator
            .record_usage(payer, Decimal::new(-3_141_592, 6), *u, &format!("{}-{}", prefix, i))
            .unwrap();
    }
}

/// Native backend whose proving fails a fixed number of times
struct FlakyProofSystem {
    inner: NativeProofSystem,
    failures_left: AtomicU32,
}

impl ProofSystem for FlakyProofSystem {
    fn backend(&self) -> ProverBackend {
        self.inner.backend()
    }

    fn version(&self) -> String {
        self.inner.version()
    }

    fn execute(&self, public: &UsagePublicInputs, private: &UsagePrivateInputs) -> Result<UsageWitness> {
        self.inner.execute(public, private)
    }

    fn prove(&self, witness: &UsageWitness) -> Result<Vec<u8>> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(Error::Internal("prover crashed".into()));
        }
        self.inner.prove(witness)
    }

    fn verify(&self, proof: &[u8], public: &UsagePublicInputs) -> Result<bool> {
        self.inner.verify(proof, public)
    }

    fn is_ready(&self) -> bool {
        true
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_full_batch_settles_exact_total() {
    let p = pipeline();
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 100).unwrap();

    record_all(&p, &alice, &[20, 25, 20, 23], "a");
    let snapshot = p.coordinator.accumulator().status(&alice).unwrap().unwrap();
    assert!(snapshot.ready);
    assert_eq!(snapshot.claimed_so_far, 88);

    let receipt = p.coordinator.settle_payer(&alice).await.unwrap().unwrap();
    assert_eq!(receipt.amount, 88);
    assert_eq!(receipt.num_calls, 4);
    assert_eq!(receipt.balance_before - receipt.balance_after, 88);
    assert_eq!(p.ledger.balance_of(&alice), 12);
    assert_eq!(p.ledger.earnings_of(&ProviderId::from("provider")), 88);

    // Nothing left behind
    assert!(p.coordinator.accumulator().status(&alice).unwrap().is_none());
    assert_eq!(p.log.len(), 1);
    assert_eq!(payments_of(&p.ledger.events(), &alice).count(), 1);
}

#[tokio::test]
async fn test_overfull_batch_keeps_leftover() {
    let p = pipeline();
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 1_000).unwrap();

    record_all(&p, &alice, &[20, 25, 20, 23, 5, 6], "a");
    let before = p.coordinator.accumulator().status(&alice).unwrap().unwrap();

    let receipt = p.coordinator.settle_payer(&alice).await.unwrap().unwrap();
    assert_eq!(receipt.amount, 88);

    let leftover = p.coordinator.accumulator().status(&alice).unwrap().unwrap();
    assert_eq!(leftover.size, 2);
    assert_eq!(leftover.claimed_so_far, 11);
    assert!(!leftover.ready);
    assert!(leftover.in_flight.is_none());
    // Fresh nonce, fresh id
    assert_ne!(leftover.batch_id, before.batch_id);
    assert_ne!(leftover.batch_id, Some(receipt.batch_id));

    assert!(p.coordinator.settle_payer(&alice).await.unwrap().is_none());

    record_all(&p, &alice, &[1, 2], "b");
    let second = p.coordinator.settle_payer(&alice).await.unwrap().unwrap();
    assert_eq!(second.amount, 14);
    assert_eq!(p.ledger.balance_of(&alice), 1_000 - 88 - 14);
}

#[tokio::test]
async fn test_idle_partial_batch_is_reaped() {
    let p = pipeline();
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 100).unwrap();
    record_all(&p, &alice, &[10, 10], "a");

    let reaper = p.coordinator.reaper();
    let timeout_ms = p.coordinator.config().stale_timeout_ms();
    assert!(reaper.sweep_at(now_millis()).unwrap().is_empty());

    let dropped = reaper.sweep_at(now_millis() + timeout_ms + 1_000).unwrap();
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].entries, 2);

    assert!(p.coordinator.accumulator().status(&alice).unwrap().is_none());
    assert!(p.coordinator.settle_payer(&alice).await.unwrap().is_none());
    assert_eq!(p.ledger.balance_of(&alice), 100);
    assert!(p.log.is_empty());
    assert_eq!(p.coordinator.metrics().snapshot().stale_entries_dropped, 2);
}

#[tokio::test]
async fn test_underfunded_payer_retries_after_deposit() {
    let p = pipeline();
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 50).unwrap();
    record_all(&p, &alice, &[20, 25, 20, 23], "a");

    let err = p.coordinator.settle_payer(&alice).await.unwrap_err();
    assert_eq!(err, Error::InsufficientBalance { required: 88, available: 50 });
    assert_eq!(p.ledger.balance_of(&alice), 50);

    let in_flight = p
        .coordinator
        .accumulator()
        .status(&alice)
        .unwrap()
        .unwrap()
        .in_flight
        .unwrap();
    assert_eq!(in_flight.state, BatchState::Open);
    assert_eq!(in_flight.claimed_total, 88);

    p.ledger.deposit(&alice, 50).unwrap();
    let receipt = p.coordinator.settle_payer(&alice).await.unwrap().unwrap();
    assert_eq!(receipt.batch_id, in_flight.batch_id);
    assert_eq!(p.ledger.balance_of(&alice), 12);
}

// ═══════════════════════════════════════════════════════════════════════════════
// VERIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

async fn proven_request(payer: &PayerId) -> SettlementRequest {
    let accumulator = BatchAccumulator::new(4);
    for (i, u) in [20u64, 25, 20, 23].iter().enumerate() {
        accumulator
            .record(payer, Decimal::new(7, 1), *u, &format!("x-{}", i))
            .unwrap();
    }
    let batch = accumulator.begin_settlement(payer).unwrap().unwrap().batch;
    let generator = ProofGenerator::new(Arc::new(NativeProofSystem::new()), 1);
    let proof = generator.generate(&batch).await.unwrap();
    SettlementRequest::new(&batch, ProviderId::from("provider"), proof)
}

#[tokio::test]
async fn test_tampered_entries_never_move_funds() {
    let ledger = Arc::new(EscrowLedger::new());
    let alice = PayerId::from("alice");
    ledger.deposit(&alice, 500).unwrap();

    let mut altered_units = proven_request(&alice).await;
    altered_units.summary.entries[2].usage_units = 1;

    let mut altered_value = proven_request(&alice).await;
    altered_value.summary.entries[0].response_value = Decimal::new(8, 1);

    let mut altered_proof = proven_request(&alice).await;
    let last = altered_proof.proof.proof.len() - 1;
    altered_proof.proof.proof[last] ^= 0xff;

    let mut inflated = proven_request(&alice).await;
    inflated.proof.public_inputs.claimed_total = 1;

    // A gateway with no registered coordinators accepts unsigned requests
    let gateway = GatewayVerifier::new(
        ProofVerifier::new(Arc::new(NativeProofSystem::new()), 4),
        ledger.clone(),
        Arc::new(TransactionLog::new()),
        KeyPair::generate(),
        &MeteringConfig::default(),
    );
    ledger.set_verifier(gateway.identity()).unwrap();

    for request in [altered_units, altered_value, altered_proof, inflated] {
        let err = gateway.settle(request).await.unwrap_err();
        assert!(matches!(err, Error::VerificationRejected { .. }), "{:?}", err);
    }
    assert_eq!(ledger.balance_of(&alice), 500);
    assert_eq!(ledger.settlement_count(), 0);

    // The untouched request goes through
    let honest = proven_request(&alice).await;
    assert_eq!(gateway.settle(honest).await.unwrap().amount, 88);
}

#[tokio::test]
async fn test_unsigned_request_refused_by_guarded_gateway() {
    let p = pipeline();
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 500).unwrap();

    let request = proven_request(&alice).await;
    let err = p.gateway.settle(request).await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
    assert_eq!(p.ledger.balance_of(&alice), 500);
}

#[tokio::test]
async fn test_simulation_is_repeatable() {
    let p = pipeline();
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 100).unwrap();
    let ledger: Arc<dyn LedgerClient> = p.ledger.clone();

    let call = SettlementCall {
        batch_id: Hash::sha256(b"batch"),
        payer: alice.clone(),
        provider: ProviderId::from("provider"),
        amount: 88,
        num_calls: 4,
        proof: vec![0xAB; 32],
        public_inputs_hash: Hash::sha256(b"inputs"),
        caller: p.gateway.identity(),
    };

    let block = p.ledger.block_number();
    let first = ledger.simulate(&call).await.unwrap();
    let second = ledger.simulate(&call).await.unwrap();
    assert!(first.is_ok());
    assert_eq!(first, second);
    assert_eq!(p.ledger.block_number(), block);
}

// ═══════════════════════════════════════════════════════════════════════════════
// FAILURE HANDLING
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_lost_confirmation_reconciles_without_double_debit() {
    let p = pipeline();
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 200).unwrap();
    record_all(&p, &alice, &[20, 25, 20, 23], "a");

    p.ledger.drop_next_response();
    let err = p.coordinator.settle_payer(&alice).await.unwrap_err();
    assert!(err.is_ambiguous());

    let in_flight = p
        .coordinator
        .accumulator()
        .status(&alice)
        .unwrap()
        .unwrap()
        .in_flight
        .unwrap();
    assert!(in_flight.ambiguous);
    assert_eq!(in_flight.state, BatchState::Open);

    let receipt = p.coordinator.settle_payer(&alice).await.unwrap().unwrap();
    assert!(receipt.reconciled);
    assert_eq!(p.ledger.balance_of(&alice), 112);
    assert_eq!(p.ledger.settlement_count(), 1);
    assert_eq!(payments_of(&p.ledger.events(), &alice).count(), 1);

    let snapshot = p.coordinator.metrics().snapshot();
    assert_eq!(snapshot.ambiguous_outcomes, 1);
    assert_eq!(snapshot.settlements_reconciled, 1);
    assert!(p.log.find_by_batch(&receipt.batch_id).unwrap().reconciled);
}

#[tokio::test]
async fn test_slow_submission_is_ambiguous() {
    let mut config = MeteringConfig::default().with_auto_settle(false);
    config.settlement_timeout_ms = 20;
    let p = pipeline_with(config, Arc::new(NativeProofSystem::new()));
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 200).unwrap();
    record_all(&p, &alice, &[20, 25, 20, 23], "a");

    p.ledger.set_submit_delay(Duration::from_millis(300));
    let err = p.coordinator.settle_payer(&alice).await.unwrap_err();
    assert!(matches!(err, Error::LedgerSubmission { ambiguous: true, .. }));

    p.ledger.set_submit_delay(Duration::ZERO);
    let receipt = p.coordinator.settle_payer(&alice).await.unwrap().unwrap();
    assert!(receipt.reconciled);
    assert_eq!(p.ledger.balance_of(&alice), 112);
}

/// Escrow whose every call takes a while but stays inside its deadline
struct SlowLedger {
    inner: Arc<EscrowLedger>,
    read_delay: Duration,
    submit_delay: Duration,
}

#[async_trait::async_trait]
impl LedgerClient for SlowLedger {
    async fn read_balance(&self, payer: &PayerId) -> Result<u64> {
        tokio::time::sleep(self.read_delay).await;
        self.inner.read_balance(payer).await
    }

    async fn simulate(&self, call: &SettlementCall) -> Result<SimulationOutcome> {
        tokio::time::sleep(self.read_delay).await;
        self.inner.simulate(call).await
    }

    async fn submit(&self, call: &SettlementCall) -> Result<LedgerReceipt> {
        tokio::time::sleep(self.submit_delay).await;
        self.inner.submit(call).await
    }

    async fn find_settlement(&self, batch_id: &Hash) -> Result<Option<LedgerReceipt>> {
        tokio::time::sleep(self.read_delay).await;
        self.inner.find_settlement(batch_id).await
    }
}

fn slow_pipeline(config: MeteringConfig, read_delay: Duration, submit_delay: Duration) -> Pipeline {
    let system = Arc::new(NativeProofSystem::new());
    let identity = KeyPair::generate();
    let ledger = Arc::new(EscrowLedger::with_verifier(*identity.public_key()));
    let log = Arc::new(TransactionLog::new());
    let gateway = Arc::new(GatewayVerifier::new(
        ProofVerifier::new(system.clone(), config.batch_capacity),
        Arc::new(SlowLedger {
            inner: ledger.clone(),
            read_delay,
            submit_delay,
        }),
        log.clone(),
        identity,
        &config,
    ));
    let coordinator = SettlementCoordinator::new(
        config.clone(),
        Arc::new(BatchAccumulator::new(config.batch_capacity)),
        ProofGenerator::new(system, config.prover_workers),
        gateway.clone(),
        Arc::new(PipelineMetrics::new()),
    );
    Pipeline {
        coordinator: Arc::new(coordinator),
        gateway,
        ledger,
        log,
    }
}

#[tokio::test]
async fn test_slow_calls_within_their_deadlines_settle() {
    let mut config = MeteringConfig::default().with_auto_settle(false);
    config.rpc_timeout_ms = 200;
    config.settlement_timeout_ms = 400;
    // Three reads and a submit add up to more than rpc + settlement
    let p = slow_pipeline(config, Duration::from_millis(150), Duration::from_millis(250));
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 100).unwrap();
    record_all(&p, &alice, &[20, 25, 20, 23], "a");

    let receipt = p.coordinator.settle_payer(&alice).await.unwrap().unwrap();
    assert_eq!(receipt.amount, 88);
    assert!(!receipt.reconciled);
    assert_eq!(p.ledger.balance_of(&alice), 12);
    assert_eq!(p.ledger.settlement_count(), 1);
    assert_eq!(p.log.len(), 1);
    assert!(p.coordinator.accumulator().status(&alice).unwrap().is_none());
}

#[tokio::test]
async fn test_submission_past_deadline_runs_to_completion() {
    let mut config = MeteringConfig::default().with_auto_settle(false);
    config.settlement_timeout_ms = 50;
    let p = slow_pipeline(config, Duration::ZERO, Duration::from_millis(250));
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 100).unwrap();
    record_all(&p, &alice, &[20, 25, 20, 23], "a");

    let err = p.coordinator.settle_payer(&alice).await.unwrap_err();
    assert!(matches!(err, Error::LedgerSubmission { ambiguous: true, .. }));
    assert_eq!(p.ledger.settlement_count(), 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(p.ledger.settlement_count(), 1);
    assert_eq!(p.ledger.balance_of(&alice), 12);
    assert_eq!(p.log.len(), 1);

    // The retry finds the landed settlement instead of paying again
    let receipt = p.coordinator.settle_payer(&alice).await.unwrap().unwrap();
    assert!(receipt.reconciled);
    assert_eq!(p.ledger.balance_of(&alice), 12);
    assert_eq!(p.ledger.settlement_count(), 1);
}

#[tokio::test]
async fn test_proof_failure_keeps_batch() {
    let system = Arc::new(FlakyProofSystem {
        inner: NativeProofSystem::new(),
        failures_left: AtomicU32::new(1),
    });
    let p = pipeline_with(MeteringConfig::default().with_auto_settle(false), system);
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 100).unwrap();
    record_all(&p, &alice, &[20, 25, 20, 23], "a");

    let err = p.coordinator.settle_payer(&alice).await.unwrap_err();
    assert!(matches!(err, Error::ProofGeneration { .. }));
    assert!(p.coordinator.accumulator().has_pending_settlement(&alice).unwrap());

    let receipt = p.coordinator.settle_payer(&alice).await.unwrap().unwrap();
    assert_eq!(receipt.amount, 88);
    assert_eq!(p.coordinator.metrics().snapshot().proof_failures, 1);
}

#[tokio::test]
async fn test_ledger_reverts_are_decoded() {
    let p = pipeline();
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 100).unwrap();
    record_all(&p, &alice, &[20, 25, 20, 23], "a");

    p.ledger.set_paused(true).unwrap();
    let err = p.coordinator.settle_payer(&alice).await.unwrap_err();
    assert_eq!(err, Error::LedgerSimulation { reason: "Escrow: paused".into() });

    p.ledger.set_paused(false).unwrap();
    p.ledger.set_verifier(*KeyPair::generate().public_key()).unwrap();
    let err = p.coordinator.settle_payer(&alice).await.unwrap_err();
    assert_eq!(
        err,
        Error::LedgerSimulation { reason: "Escrow: caller is not the verifier".into() }
    );

    p.ledger.set_verifier(p.gateway.identity()).unwrap();
    assert!(p.coordinator.settle_payer(&alice).await.unwrap().is_some());

    let kinds: Vec<_> = p.ledger.events().iter().map(|r| r.event.name()).collect();
    assert!(kinds.contains(&"PausedChanged"));
    assert!(kinds.contains(&"ZkVerifierUpdated"));
    assert!(matches!(
        p.ledger.events().last().map(|r| &r.event),
        Some(EscrowEvent::BatchPayment { amount: 88, .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONCURRENCY
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payers_lose_nothing() {
    let p = pipeline();
    let payers: Vec<PayerId> = (0..8).map(|i| PayerId::new(format!("payer-{}", i))).collect();
    for payer in &payers {
        p.ledger.deposit(payer, 10_000).unwrap();
    }

    std::thread::scope(|scope| {
        for payer in &payers {
            let coordinator = p.coordinator.clone();
            scope.spawn(move || {
                for i in 0..10u64 {
                    coordinator
                        .record_usage(payer, Decimal::ONE, i + 1, &format!("req-{}", i))
                        .unwrap();
                }
            });
        }
    });

    let results = p.coordinator.settle_all().await;
    assert_eq!(results.len(), 8);

    for payer in &payers {
        // Units 1..=10 sum to 55; two batches settle, two entries wait
        let paid = 10_000 - p.ledger.balance_of(payer);
        let waiting = p.coordinator.accumulator().status(payer).unwrap().unwrap();
        assert_eq!(paid, 1 + 2 + 3 + 4 + 5 + 6 + 7 + 8);
        assert_eq!(waiting.size, 2);
        assert_eq!(paid + waiting.claimed_so_far, 55);
    }
    assert_eq!(p.coordinator.metrics().snapshot().settlements, 16);
}

#[tokio::test]
async fn test_auto_settlement_publishes_outcomes() {
    let p = pipeline_with(MeteringConfig::default(), Arc::new(NativeProofSystem::new()));
    let alice = PayerId::from("alice");
    p.ledger.deposit(&alice, 100).unwrap();
    let mut outcomes = p.coordinator.subscribe();

    record_all(&p, &alice, &[20, 25, 20, 23], "a");

    let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .unwrap()
        .unwrap();
    match outcome {
        SettlementOutcome::Settled { payer, receipt, attempt } => {
            assert_eq!(payer, alice);
            assert_eq!(receipt.amount, 88);
            assert_eq!(attempt, 1);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(p.ledger.balance_of(&alice), 12);
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn prop_settled_total_is_sum_of_first_entries(units in prop::collection::vec(1u64..10_000, 4..12)) {
        let accumulator = BatchAccumulator::new(4);
        let payer = PayerId::from("p");
        for (i, u) in units.iter().enumerate() {
            accumulator.record(&payer, Decimal::new(i as i64, 2), *u, &format!("r{}", i)).unwrap();
        }

        let batch = accumulator.begin_settlement(&payer).unwrap().unwrap().batch;
        prop_assert_eq!(batch.claimed_total, units[..4].iter().sum::<u64>());
        prop_assert_eq!(batch.len(), 4);

        let snapshot = accumulator.status(&payer).unwrap().unwrap();
        prop_assert_eq!(snapshot.size, units.len() - 4);
        prop_assert_eq!(snapshot.claimed_so_far, units[4..].iter().sum::<u64>());

        let system = Arc::new(NativeProofSystem::new());
        let generator = ProofGenerator::new(system.clone(), 1);
        let artifact = tokio_test::block_on(generator.generate(&batch)).unwrap();
        prop_assert_eq!(artifact.public_inputs.claimed_total, batch.claimed_total);
        prop_assert!(ProofVerifier::new(system, 4).verify(&batch.summary(), &artifact).valid);
    }
}
