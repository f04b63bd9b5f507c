//! ZK proof generation for zkmeter.
//!
//! The [`ProofSystem`] trait is the seam between the pipeline and a proving
//! backend. It is constructed explicitly and shared as `Arc<dyn ProofSystem>`
//! by the generator and the gateway verifier.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::constants::{PROOF_FORMAT_VERSION, PROOF_SEAL_TAG};
use crate::utils::crypto::{tagged_hash, Hash};
use crate::zkp::circuits::*;
use crate::zkp::inputs::*;

// ═══════════════════════════════════════════════════════════════════════════════
// PROOF TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// A proof over one normalized batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofArtifact {
    /// Serialized proof (format depends on backend)
    pub proof: Vec<u8>,
    /// Public inputs the proof is bound to
    pub public_inputs: UsagePublicInputs,
    /// Backend that produced the proof
    pub backend: ProverBackend,
    /// Circuit identifier
    pub circuit_id: String,
    /// Generation metadata
    pub metadata: ProofMetadata,
}

impl ProofArtifact {
    /// Get proof size in bytes
    pub fn size(&self) -> usize {
        self.proof.len()
    }

    /// Compute proof hash
    pub fn hash(&self) -> Hash {
        let mut data = Vec::with_capacity(self.circuit_id.len() + self.proof.len());
        data.extend_from_slice(self.circuit_id.as_bytes());
        data.extend_from_slice(&self.proof);
        Hash::sha256(&data)
    }
}

/// Proof metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofMetadata {
    /// Time taken to generate proof (milliseconds)
    pub generation_time_ms: u64,
    /// Number of constraints
    pub constraint_count: usize,
    /// Prover version
    pub prover_version: String,
    /// Generation time (unix ms)
    pub generated_at: u64,
}

/// Supported prover backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProverBackend {
    /// Native execution (no ZK, for testing and demos)
    #[default]
    Native,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROOF SYSTEM TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for proof generation and verification backends
pub trait ProofSystem: Send + Sync {
    /// Get backend identifier
    fn backend(&self) -> ProverBackend;

    /// Circuit this system proves
    fn circuit_id(&self) -> &'static str {
        UsageAggregationCircuit::circuit_id()
    }

    /// Prover version string
    fn version(&self) -> String;

    /// Execute the circuit, producing a witness
    fn execute(&self, public: &UsagePublicInputs, private: &UsagePrivateInputs) -> Result<UsageWitness>;

    /// Prove a satisfied witness
    fn prove(&self, witness: &UsageWitness) -> Result<Vec<u8>>;

    /// Check a proof against public inputs
    fn verify(&self, proof: &[u8], public: &UsagePublicInputs) -> Result<bool>;

    /// Check if the backend is ready
    fn is_ready(&self) -> bool;
}

// ═══════════════════════════════════════════════════════════════════════════════
// NATIVE PROOF SYSTEM
// ═══════════════════════════════════════════════════════════════════════════════

/// Sealed envelope produced by the native backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEnvelope {
    /// Envelope format version
    pub version: u8,
    /// Circuit identifier
    pub circuit_id: String,
    /// Hash of the public inputs
    pub public_inputs_hash: Hash,
    /// Digest of the satisfied witness
    pub witness_digest: Hash,
    /// Seal over all fields above
    pub seal: Hash,
}

impl ProofEnvelope {
    fn compute_seal(version: u8, circuit_id: &str, public_inputs_hash: &Hash, witness_digest: &Hash) -> Hash {
        let mut data = Vec::with_capacity(1 + circuit_id.len() + 64);
        data.push(version);
        data.extend_from_slice(circuit_id.as_bytes());
        data.extend_from_slice(public_inputs_hash.as_bytes());
        data.extend_from_slice(witness_digest.as_bytes());
        tagged_hash(PROOF_SEAL_TAG, &data)
    }

    /// Seal a witness
    pub fn seal(witness: &UsageWitness) -> Self {
        Self {
            version: PROOF_FORMAT_VERSION,
            circuit_id: witness.circuit_id.clone(),
            public_inputs_hash: witness.public_inputs_hash,
            witness_digest: witness.witness_digest,
            seal: Self::compute_seal(
                PROOF_FORMAT_VERSION,
                &witness.circuit_id,
                &witness.public_inputs_hash,
                &witness.witness_digest,
            ),
        }
    }

    /// Whether the seal matches the envelope contents
    pub fn is_intact(&self) -> bool {
        self.seal
            == Self::compute_seal(self.version, &self.circuit_id, &self.public_inputs_hash, &self.witness_digest)
    }
}

/// Native proof system that executes the circuit directly without ZK.
///
/// The proof is a sealed envelope binding the circuit id, the public inputs
/// hash and the witness digest. It is NOT zero-knowledge and NOT sound against
/// a malicious prover; it stands in for a zkVM backend in tests and demos.
#[derive(Debug, Clone)]
pub struct NativeProofSystem {
    version: String,
}

impl Default for NativeProofSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeProofSystem {
    /// Create new native proof system
    pub fn new() -> Self {
        Self {
            version: format!("native-v{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ProofSystem for NativeProofSystem {
    fn backend(&self) -> ProverBackend {
        ProverBackend::Native
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn execute(&self, public: &UsagePublicInputs, private: &UsagePrivateInputs) -> Result<UsageWitness> {
        UsageAggregationCircuit::execute(public, private)
    }

    fn prove(&self, witness: &UsageWitness) -> Result<Vec<u8>> {
        if witness.circuit_id != self.circuit_id() {
            return Err(Error::InvalidParameter {
                name: "circuit_id".into(),
                reason: format!("unsupported circuit {}", witness.circuit_id),
            });
        }
        bincode::serialize(&ProofEnvelope::seal(witness)).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn verify(&self, proof: &[u8], public: &UsagePublicInputs) -> Result<bool> {
        let envelope: ProofEnvelope = match bincode::deserialize(proof) {
            Ok(envelope) => envelope,
            Err(_) => return Ok(false),
        };

        Ok(envelope.version == PROOF_FORMAT_VERSION
            && envelope.circuit_id == self.circuit_id()
            && envelope.is_intact()
            && envelope.public_inputs_hash == public.hash()?)
    }

    fn is_ready(&self) -> bool {
        true
    }
}

/// Prover statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProverStats {
    /// Total proofs generated
    pub proofs_generated: u64,
    /// Failed generation attempts
    pub proofs_failed: u64,
    /// Total proof generation time (ms)
    pub total_time_ms: u64,
}

impl ProverStats {
    /// Get average proof time
    pub fn average_time_ms(&self) -> u64 {
        if self.proofs_generated == 0 {
            0
        } else {
            self.total_time_ms / self.proofs_generated
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
