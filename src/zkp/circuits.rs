//! ZK circuit definitions for zkmeter.
//!
//! A circuit states the constraints a valid witness must satisfy. The native
//! backend executes them directly; a zkVM backend would compile the same
//! constraints into its guest program.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::constants::{MAX_USAGE_UNITS, WITNESS_TAG};
use crate::utils::crypto::{tagged_hash, Hash};
use crate::utils::math::checked_sum;
use crate::zkp::field::FieldElement;
use crate::zkp::inputs::*;

// ═══════════════════════════════════════════════════════════════════════════════
// CIRCUIT TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for ZK circuit execution
pub trait Circuit: Sized {
    /// Public input type
    type PublicInputs;
    /// Private input type
    type PrivateInputs;
    /// Output type
    type Output;

    /// Execute the circuit and verify constraints
    fn execute(public: &Self::PublicInputs, private: &Self::PrivateInputs) -> Result<Self::Output>;

    /// Get the circuit identifier
    fn circuit_id() -> &'static str;

    /// Get the expected constraint count for an input of `entries` entries
    fn constraint_count(entries: usize) -> usize;
}

// ═══════════════════════════════════════════════════════════════════════════════
// USAGE AGGREGATION CIRCUIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Proves that a claimed total is the exact sum of a batch's usage units and
/// that the batch's response values match the public commitment
pub struct UsageAggregationCircuit;

/// Satisfied witness of the usage aggregation circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageWitness {
    /// Circuit that produced the witness
    pub circuit_id: String,
    /// Hash of the public inputs the witness satisfies
    pub public_inputs_hash: Hash,
    /// Digest over public and private inputs
    pub witness_digest: Hash,
    /// Constraints evaluated
    pub constraints_checked: usize,
}

fn violation(constraint: &str, details: String) -> Error {
    Error::ConstraintViolation {
        constraint: constraint.into(),
        details,
    }
}

impl Circuit for UsageAggregationCircuit {
    type PublicInputs = UsagePublicInputs;
    type PrivateInputs = UsagePrivateInputs;
    type Output = UsageWitness;

    fn execute(public: &Self::PublicInputs, private: &Self::PrivateInputs) -> Result<Self::Output> {
        let count = public.entry_count as usize;

        // Constraint 1: entry count matches every input vector
        if count == 0 || public.usages.len() != count || private.response_values.len() != count {
            return Err(violation(
                "entry_count",
                format!(
                    "entry_count {} with {} usages and {} response values",
                    count,
                    public.usages.len(),
                    private.response_values.len()
                ),
            ));
        }

        // Constraint 2: every usage in range
        if let Some((i, u)) = public
            .usages
            .iter()
            .enumerate()
            .find(|(_, u)| **u == 0 || **u > MAX_USAGE_UNITS)
        {
            return Err(violation("usage_range", format!("entry {} has usage {}", i, u)));
        }

        // Constraint 3: sum without overflow, equal in the field as well
        let sum = checked_sum(public.usages.iter().copied())
            .map_err(|e| violation("claimed_total", e.to_string()))?;
        let field_sum: FieldElement = public.usages.iter().map(|u| FieldElement::from_u64(*u)).sum();
        if sum != public.claimed_total || field_sum != FieldElement::from_u64(public.claimed_total) {
            return Err(violation(
                "claimed_total",
                format!("sum {} != claimed {}", sum, public.claimed_total),
            ));
        }

        // Constraint 4: commitment over response values and nonce
        let commitment = compute_commitment(&private.response_values, private.nonce);
        if commitment != public.commitment {
            return Err(violation("commitment", "recomputed commitment differs".into()));
        }

        let public_bytes = public.encode()?;
        let private_bytes = bincode::serialize(private).map_err(|e| Error::Serialization(e.to_string()))?;
        let mut data = Vec::with_capacity(public_bytes.len() + private_bytes.len());
        data.extend_from_slice(&public_bytes);
        data.extend_from_slice(&private_bytes);

        Ok(UsageWitness {
            circuit_id: Self::circuit_id().to_string(),
            public_inputs_hash: public.hash()?,
            witness_digest: tagged_hash(WITNESS_TAG, &data),
            constraints_checked: Self::constraint_count(count),
        })
    }

    fn circuit_id() -> &'static str {
        "zkmeter_usage_aggregation_v1"
    }

    fn constraint_count(entries: usize) -> usize {
        // count check, per-entry range checks, sum, commitment
        1 + entries + 1 + 1
    }
}
