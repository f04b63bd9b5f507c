//! Bounded proof generation.
//!
//! Proving is CPU-bound, so each job runs on Tokio's blocking pool. A semaphore
//! caps the number of concurrent jobs at `prover_workers`, keeping request
//! handling responsive while proofs for different payers run in parallel.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::core::batch::NormalizedBatch;
use crate::core::usage::now_millis;
use crate::error::{Error, Result};
use crate::zkp::inputs::derive_inputs;
use crate::zkp::prover::{ProofArtifact, ProofMetadata, ProofSystem, ProverStats};

/// Drives a [`ProofSystem`] on a bounded worker pool
pub struct ProofGenerator {
    system: Arc<dyn ProofSystem>,
    permits: Arc<Semaphore>,
    workers: usize,
    stats: Mutex<ProverStats>,
}

impl ProofGenerator {
    /// Create a generator allowing `workers` concurrent proofs
    pub fn new(system: Arc<dyn ProofSystem>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            system,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            stats: Mutex::new(ProverStats::default()),
        }
    }

    /// Generate a proof for a normalized batch.
    ///
    /// Any circuit or backend failure is reported as [`Error::ProofGeneration`].
    pub async fn generate(&self, batch: &NormalizedBatch) -> Result<ProofArtifact> {
        let batch_id = batch.batch_id.to_hex();
        let result = self.run(batch).await.map_err(|e| match e {
            Error::ProofGeneration { .. } => e,
            other => Error::ProofGeneration {
                batch_id: batch_id.clone(),
                reason: other.to_string(),
            },
        });

        let mut stats = self.stats.lock().map_err(|_| Error::Lock)?;
        match &result {
            Ok(artifact) => {
                stats.proofs_generated += 1;
                stats.total_time_ms += artifact.metadata.generation_time_ms;
                info!(
                    batch = %batch.batch_id.short(),
                    payer = %batch.payer,
                    claimed_total = artifact.public_inputs.claimed_total,
                    ms = artifact.metadata.generation_time_ms,
                    "Proof generated"
                );
            }
            Err(e) => {
                stats.proofs_failed += 1;
                warn!(batch = %batch.batch_id.short(), payer = %batch.payer, error = %e, "Proof generation failed");
            }
        }
        result
    }

    async fn run(&self, batch: &NormalizedBatch) -> Result<ProofArtifact> {
        if !self.system.is_ready() {
            return Err(Error::ProofGeneration {
                batch_id: batch.batch_id.to_hex(),
                reason: "proof backend not ready".into(),
            });
        }

        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let summary = batch.summary();
        let system = self.system.clone();
        debug!(batch = %batch.batch_id.short(), "Proving on blocking pool");

        tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let (public, private) = derive_inputs(&summary)?;
            let witness = system.execute(&public, &private)?;
            let proof = system.prove(&witness)?;

            Ok(ProofArtifact {
                proof,
                public_inputs: public,
                backend: system.backend(),
                circuit_id: witness.circuit_id,
                metadata: ProofMetadata {
                    generation_time_ms: start.elapsed().as_millis() as u64,
                    constraint_count: witness.constraints_checked,
                    prover_version: system.version(),
                    generated_at: now_millis(),
                },
            })
        })
        .await
        .map_err(|e| Error::Internal(format!("prover task failed: {}", e)))?
    }

    /// Maximum concurrent proofs
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Free worker slots
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Generation statistics
    pub fn stats(&self) -> ProverStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Underlying proof system
    pub fn system(&self) -> Arc<dyn ProofSystem> {
        self.system.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::batch::{Batch, BatchNonce};
    use crate::core::usage::{PayerId, UsageRecord};
    use crate::metering::normalizer::prepare;
    use crate::zkp::prover::NativeProofSystem;
    use rust_decimal::Decimal;

    fn normalized(units: &[u64]) -> NormalizedBatch {
        let payer = PayerId::from("payer");
        let mut batch = Batch::new(payer.clone(), units.len(), 0);
        for (i, u) in units.iter().enumerate() {
            batch.push(UsageRecord::new(payer.clone(), Decimal::new(i as i64, 1), *u, format!("r{}", i), 0), 0);
        }
        prepare(batch, 0).unwrap().normalized
    }

    #[tokio::test]
    async fn test_generate() {
        let generator = ProofGenerator::new(Arc::new(NativeProofSystem::new()), 2);
        let batch = normalized(&[20, 25, 20, 23]);

        let artifact = generator.generate(&batch).await.unwrap();
        assert_eq!(artifact.public_inputs.claimed_total, 88);
        assert_eq!(artifact.public_inputs.batch_id, batch.batch_id);
        assert_eq!(generator.stats().proofs_generated, 1);
        assert_eq!(generator.available_workers(), 2);
    }

    #[tokio::test]
    async fn test_generate_failure_is_proof_generation_error() {
        let generator = ProofGenerator::new(Arc::new(NativeProofSystem::new()), 1);
        let mut batch = normalized(&[20, 25]);
        // Nonce no longer matches the batch id
        batch.nonce = BatchNonce::from_u64(batch.nonce.value().wrapping_add(1));

        let err = generator.generate(&batch).await.unwrap_err();
        assert!(matches!(err, Error::ProofGeneration { .. }));
        assert_eq!(generator.stats().proofs_failed, 1);
    }
}
