//! ZK proof verification for zkmeter.
//!
//! The verifier never trusts the public inputs shipped with a proof. It
//! re-derives them from the batch summary with the same conventions the
//! generator uses, so changing any entry after proving makes verification fail.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::core::batch::BatchSummary;
use crate::error::{Error, Result};
use crate::utils::crypto::Hash;
use crate::zkp::inputs::derive_inputs;
use crate::zkp::prover::{ProofArtifact, ProofSystem};

// ═══════════════════════════════════════════════════════════════════════════════
// VERIFICATION RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of proof verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Whether proof is valid
    pub valid: bool,
    /// Hash of the re-derived public inputs
    pub public_inputs_hash: Hash,
    /// Verification time (microseconds)
    pub verification_time_us: u64,
    /// Error message if invalid
    pub error: Option<String>,
}

impl VerificationResult {
    /// Create successful verification result
    pub fn success(public_inputs_hash: Hash, verification_time_us: u64) -> Self {
        Self {
            valid: true,
            public_inputs_hash,
            verification_time_us,
            error: None,
        }
    }

    /// Create failed verification result
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            public_inputs_hash: Hash::zero(),
            verification_time_us: 0,
            error: Some(error.into()),
        }
    }

    /// Convert into a `Result`, rejecting invalid proofs
    pub fn into_result(self, batch_id: &Hash) -> Result<Self> {
        if self.valid {
            Ok(self)
        } else {
            Err(Error::VerificationRejected {
                batch_id: batch_id.to_hex(),
                reason: self.error.unwrap_or_else(|| "invalid proof".into()),
            })
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROOF VERIFIER
// ═══════════════════════════════════════════════════════════════════════════════

/// Independent verifier for usage proofs
pub struct ProofVerifier {
    system: Arc<dyn ProofSystem>,
    capacity: usize,
    stats: Mutex<VerifierStats>,
}

impl ProofVerifier {
    /// Create a verifier accepting batches of exactly `capacity` entries
    pub fn new(system: Arc<dyn ProofSystem>, capacity: usize) -> Self {
        Self {
            system,
            capacity,
            stats: Mutex::new(VerifierStats::default()),
        }
    }

    /// Verify `artifact` against public inputs re-derived from `summary`
    pub fn verify(&self, summary: &BatchSummary, artifact: &ProofArtifact) -> VerificationResult {
        let start = Instant::now();
        let result = self.check(summary, artifact, start);

        if let Ok(mut stats) = self.stats.lock() {
            stats.total_verified += 1;
            stats.total_time_us += result.verification_time_us;
            if result.valid {
                stats.successful += 1;
            } else {
                stats.failed += 1;
            }
        }
        result
    }

    fn check(&self, summary: &BatchSummary, artifact: &ProofArtifact, start: Instant) -> VerificationResult {
        if artifact.backend != self.system.backend() {
            return VerificationResult::failure(format!(
                "expected {:?} backend, got {:?}",
                self.system.backend(),
                artifact.backend
            ));
        }
        if artifact.circuit_id != self.system.circuit_id() {
            return VerificationResult::failure(format!("unknown circuit {}", artifact.circuit_id));
        }
        if artifact.proof.is_empty() {
            return VerificationResult::failure("empty proof data");
        }
        if summary.entries.len() != self.capacity {
            return VerificationResult::failure(format!(
                "batch has {} entries, capacity is {}",
                summary.entries.len(),
                self.capacity
            ));
        }

        let public = match derive_inputs(summary) {
            Ok((public, _)) => public,
            Err(e) => return VerificationResult::failure(format!("cannot derive public inputs: {}", e)),
        };
        if public != artifact.public_inputs {
            return VerificationResult::failure("public inputs do not match batch summary");
        }

        let public_hash = match public.hash() {
            Ok(hash) => hash,
            Err(e) => return VerificationResult::failure(e.to_string()),
        };
        match self.system.verify(&artifact.proof, &public) {
            Ok(true) => VerificationResult::success(public_hash, start.elapsed().as_micros() as u64),
            Ok(false) => VerificationResult::failure("proof does not verify"),
            Err(e) => VerificationResult::failure(e.to_string()),
        }
    }

    /// Batch capacity this verifier enforces
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Verification statistics
    pub fn stats(&self) -> VerifierStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Verifier statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifierStats {
    /// Total proofs verified
    pub total_verified: u64,
    /// Successful verifications
    pub successful: u64,
    /// Failed verifications
    pub failed: u64,
    /// Total verification time (microseconds)
    pub total_time_us: u64,
}

impl VerifierStats {
    /// Get success rate
    pub fn success_rate(&self) -> f64 {
        if self.total_verified == 0 {
            0.0
        } else {
            self.successful as f64 / self.total_verified as f64
        }
    }
}
