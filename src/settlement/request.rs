//! Settlement requests.
//!
//! A [`SettlementRequest`] carries a proof together with the batch summary the
//! gateway needs to re-derive its public inputs. The coordinator can sign the
//! request so a gateway only accepts work from known coordinators.

use serde::{Deserialize, Serialize};

use crate::core::batch::{BatchSummary, NormalizedBatch};
use crate::core::usage::{now_millis, PayerId, ProviderId};
use crate::error::{Error, Result};
use crate::utils::crypto::{create_message_hash, Hash, KeyPair, PublicKey, Signature};
use crate::zkp::prover::ProofArtifact;

/// A proven batch submitted for settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
    /// Batch being settled
    pub batch_id: Hash,
    /// Payer debited
    pub payer: PayerId,
    /// Provider credited
    pub provider: ProviderId,
    /// Proof over the batch
    pub proof: ProofArtifact,
    /// Entries the proof covers
    pub summary: BatchSummary,
    /// Creation time (unix ms)
    pub created_at: u64,
    /// Coordinator that signed the request
    pub signer: Option<PublicKey>,
    /// Coordinator signature over [`SettlementRequest::signing_hash`]
    pub signature: Option<Signature>,
}

impl SettlementRequest {
    /// Package a normalized batch and its proof
    pub fn new(batch: &NormalizedBatch, provider: ProviderId, proof: ProofArtifact) -> Self {
        Self {
            batch_id: batch.batch_id,
            payer: batch.payer.clone(),
            provider,
            proof,
            summary: batch.summary(),
            created_at: now_millis(),
            signer: None,
            signature: None,
        }
    }

    /// Amount claimed by the proof
    pub fn claimed_total(&self) -> u64 {
        self.proof.public_inputs.claimed_total
    }

    /// Number of calls covered
    pub fn num_calls(&self) -> u32 {
        self.proof.public_inputs.entry_count
    }

    /// Hash covered by the coordinator signature
    pub fn signing_hash(&self) -> Result<Hash> {
        let body = (
            &self.batch_id,
            &self.payer,
            &self.provider,
            self.proof.hash(),
            &self.summary,
            self.created_at,
        );
        let data = bincode::serialize(&body).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(create_message_hash("settlement", &data))
    }

    /// Sign with a coordinator key
    pub fn sign(mut self, keypair: &KeyPair) -> Result<Self> {
        let hash = self.signing_hash()?;
        self.signer = Some(*keypair.public_key());
        self.signature = Some(keypair.sign(&hash));
        Ok(self)
    }

    /// Check the signature against the embedded signer
    pub fn verify_signature(&self) -> Result<PublicKey> {
        let (Some(signer), Some(signature)) = (self.signer, self.signature) else {
            return Err(Error::Unauthorized("settlement request is unsigned".into()));
        };
        if !signer.verify(&self.signing_hash()?, &signature) {
            return Err(Error::InvalidSignature);
        }
        Ok(signer)
    }
}
