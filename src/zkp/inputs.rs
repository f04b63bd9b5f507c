//! ZK proof inputs - public and private data for circuit execution.
//!
//! Public inputs are what the ledger and the gateway see: the batch id, the
//! claimed total, the entry count and a commitment over the response values.
//! The response values themselves and the batch nonce stay private.

use serde::{Deserialize, Serialize};

use crate::core::batch::{derive_batch_id, BatchSummary};
use crate::error::{Error, Result};
use crate::utils::constants::{COMMITMENT_TAG, PUBLIC_INPUTS_TAG};
use crate::utils::crypto::{tagged_hash, Hash};
use crate::zkp::field::FieldElement;

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLIC INPUTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Public inputs of the usage aggregation circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePublicInputs {
    /// Batch the proof covers
    pub batch_id: Hash,
    /// Sum of the usage units, in cents
    pub claimed_total: u64,
    /// Number of entries (the batch capacity)
    pub entry_count: u32,
    /// Usage units in order
    pub usages: Vec<u64>,
    /// Commitment over the response values and nonce
    pub commitment: Hash,
}

impl UsagePublicInputs {
    /// Canonical byte encoding
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Domain-separated hash of the encoding
    pub fn hash(&self) -> Result<Hash> {
        Ok(tagged_hash(PUBLIC_INPUTS_TAG, &self.encode()?))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRIVATE INPUTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Private inputs of the usage aggregation circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePrivateInputs {
    /// Canonical response values in order
    pub response_values: Vec<FieldElement>,
    /// Canonical batch nonce
    pub nonce: FieldElement,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DERIVATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Commitment over canonical response values followed by the canonical nonce
pub fn compute_commitment(response_values: &[FieldElement], nonce: FieldElement) -> Hash {
    let mut data = Vec::with_capacity((response_values.len() + 1) * 8);
    for value in response_values {
        data.extend_from_slice(&value.to_le_bytes());
    }
    data.extend_from_slice(&nonce.to_le_bytes());
    tagged_hash(COMMITMENT_TAG, &data)
}

/// Derive circuit inputs from a batch summary.
///
/// The generator and the gateway both call this, so a proof only verifies
/// against the exact entries it was generated for.
pub fn derive_inputs(summary: &BatchSummary) -> Result<(UsagePublicInputs, UsagePrivateInputs)> {
    if derive_batch_id(&summary.payer, summary.nonce) != summary.batch_id {
        return Err(Error::BatchMismatch {
            expected: derive_batch_id(&summary.payer, summary.nonce).to_hex(),
            got: summary.batch_id.to_hex(),
        });
    }

    let response_values = summary
        .entries
        .iter()
        .map(|e| FieldElement::from_response_value(&e.response_value))
        .collect::<Result<Vec<_>>>()?;
    let nonce = summary.nonce.to_field();

    let entry_count = u32::try_from(summary.entries.len()).map_err(|_| Error::InvalidParameter {
        name: "entry_count".into(),
        reason: "too many entries".into(),
    })?;

    let public = UsagePublicInputs {
        batch_id: summary.batch_id,
        claimed_total: summary.claimed_total()?,
        entry_count,
        usages: summary.usage_units(),
        commitment: compute_commitment(&response_values, nonce),
    };

    Ok((public, UsagePrivateInputs { response_values, nonce }))
}
