//! Pipeline constants and magic numbers.
//!
//! All pipeline-wide constants are defined here for easy auditing and modification.

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default number of usage entries covered by one proof
pub const DEFAULT_BATCH_CAPACITY: usize = 4;

/// Upper bound on the configurable batch capacity
pub const MAX_BATCH_CAPACITY: usize = 64;

/// Maximum cost of a single call, in cents ($1,000,000)
pub const MAX_USAGE_UNITS: u64 = 100_000_000;

/// Maximum length of payer, provider and request identifiers
pub const MAX_ID_LENGTH: usize = 128;

// ═══════════════════════════════════════════════════════════════════════════════
// FIELD CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Goldilocks prime: 2^64 - 2^32 + 1
pub const FIELD_MODULUS: u64 = 0xFFFF_FFFF_0000_0001;

/// Decimal places response values are scaled to before reduction
pub const RESPONSE_VALUE_SCALE: u32 = 6;

/// Largest scaled response magnitude; keeps the signed mapping injective
pub const MAX_RESPONSE_MAGNITUDE: u64 = (FIELD_MODULUS - 1) / 2;

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN SEPARATION TAGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Tag for the commitment over response values and nonce
pub const COMMITMENT_TAG: &str = "zkmeter/response-commitment/v1";

/// Tag for hashing public inputs
pub const PUBLIC_INPUTS_TAG: &str = "zkmeter/public-inputs/v1";

/// Tag for sealing proof envelopes
pub const PROOF_SEAL_TAG: &str = "zkmeter/proof-seal/v1";

/// Tag for witness digests
pub const WITNESS_TAG: &str = "zkmeter/witness/v1";

/// Domain prefix for batch ids (Blake3)
pub const BATCH_ID_TAG: &str = "zkmeter/batch-id/v1";

// ═══════════════════════════════════════════════════════════════════════════════
// CRYPTOGRAPHIC CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Hash output length in bytes (SHA256)
pub const HASH_LENGTH: usize = 32;

/// Compressed public key length in bytes
pub const PUBKEY_LENGTH: usize = 33;

/// Compact signature length in bytes
pub const SIGNATURE_LENGTH: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════════
// RUNTIME DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Idle time after which an under-capacity batch is dropped
pub const DEFAULT_STALE_TIMEOUT_SECS: u64 = 300;

/// Interval between stale batch sweeps
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 30;

/// Concurrent proof generation jobs
pub const DEFAULT_PROVER_WORKERS: usize = 2;

/// Deadline for read-only ledger calls
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 5_000;

/// Deadline for the mutating settlement submission
pub const DEFAULT_SETTLEMENT_TIMEOUT_MS: u64 = 30_000;

/// Buffered settlement outcomes per subscriber
pub const OUTCOME_CHANNEL_CAPACITY: usize = 256;

// ═══════════════════════════════════════════════════════════════════════════════
// VERSION
// ═══════════════════════════════════════════════════════════════════════════════

/// Version byte embedded in proof envelopes
pub const PROOF_FORMAT_VERSION: u8 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_bounds() {
        assert!(DEFAULT_BATCH_CAPACITY >= 1);
        assert!(DEFAULT_BATCH_CAPACITY <= MAX_BATCH_CAPACITY);
    }

    #[test]
    fn test_claimed_total_fits_field() {
        // A full batch of maximal entries must stay below the modulus
        let max_total = MAX_USAGE_UNITS as u128 * MAX_BATCH_CAPACITY as u128;
        assert!(max_total < FIELD_MODULUS as u128);
    }

    #[test]
    fn test_modulus() {
        assert_eq!(FIELD_MODULUS as u128, (1u128 << 64) - (1u128 << 32) + 1);
    }
}
