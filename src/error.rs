//! Error types for the zkmeter pipeline.
//!
//! Every failure the metering and settlement pipeline can surface is a variant
//! of [`Error`]. Variants carry enough context for an operator to decide
//! whether a batch can be retried, needs funding, or needs a ledger re-check.

use thiserror::Error;

/// Result type alias for zkmeter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the zkmeter pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Usage Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Usage event failed validation
    #[error("Invalid usage event field {field}: {reason}")]
    InvalidUsage {
        /// Offending field
        field: String,
        /// Reason for rejection
        reason: String,
    },

    /// Request id already recorded for this payer
    #[error("Duplicate request id {request_id} for payer {payer}")]
    DuplicateRequest {
        /// Payer the request was billed to
        payer: String,
        /// Duplicated request id
        request_id: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Batch Errors
    // ═══════════════════════════════════════════════════════════════════

    /// No batch for the given payer
    #[error("No active batch for payer {0}")]
    BatchNotFound(String),

    /// Batch has not reached capacity
    #[error("Batch not ready: {entries} entries, capacity {capacity}")]
    BatchNotReady {
        /// Entries currently buffered
        entries: usize,
        /// Required capacity
        capacity: usize,
    },

    /// In-flight batch id does not match the caller's
    #[error("Batch mismatch: expected {expected}, got {got}")]
    BatchMismatch {
        /// Batch id held by the accumulator
        expected: String,
        /// Batch id supplied by the caller
        got: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Proof Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Circuit execution or proving backend failed
    #[error("Proof generation failed for batch {batch_id}: {reason}")]
    ProofGeneration {
        /// Batch being proven
        batch_id: String,
        /// Failure details
        reason: String,
    },

    /// A circuit constraint did not hold
    #[error("Constraint {constraint} violated: {details}")]
    ConstraintViolation {
        /// Constraint name
        constraint: String,
        /// Violation details
        details: String,
    },

    /// Proof did not verify against the re-derived public inputs
    #[error("Proof for batch {batch_id} rejected: {reason}")]
    VerificationRejected {
        /// Batch the proof claims to cover
        batch_id: String,
        /// Rejection reason
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Ledger Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Payer cannot cover the claimed total
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Claimed total in cents
        required: u64,
        /// Ledger balance in cents
        available: u64,
    },

    /// Dry-run of the settlement call reverted
    #[error("Ledger simulation reverted: {reason}")]
    LedgerSimulation {
        /// Decoded revert reason
        reason: String,
    },

    /// Submission failed after simulation passed
    #[error("Ledger submission failed (ambiguous: {ambiguous}): {reason}")]
    LedgerSubmission {
        /// Failure details
        reason: String,
        /// Whether the mutation may have landed
        ambiguous: bool,
    },

    /// A read-only remote call exceeded its deadline
    #[error("Operation {operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Not authorized to perform this action
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Invalid signature
    #[error("Invalid signature")]
    InvalidSignature,

    /// Cryptographic operation failed
    #[error("Crypto error in {operation}: {details}")]
    CryptoError {
        /// Operation that failed
        operation: String,
        /// Error details
        details: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Parameter Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    // ═══════════════════════════════════════════════════════════════════
    // Serialization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Lock acquisition failed
    #[error("Failed to acquire lock")]
    Lock,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Returns true if the same batch can be submitted again as-is
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ProofGeneration { .. }
                | Error::InsufficientBalance { .. }
                | Error::LedgerSimulation { .. }
                | Error::LedgerSubmission { .. }
                | Error::Timeout { .. }
        )
    }

    /// Returns true if a ledger mutation may or may not have landed.
    ///
    /// Callers must re-read ledger state before retrying after such an error.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Error::LedgerSubmission { ambiguous: true, .. })
    }

    /// Returns true if a settlement failure of this kind leaves the batch in
    /// the accumulator
    pub fn retains_batch(&self) -> bool {
        !matches!(
            self,
            Error::InvalidUsage { .. } | Error::DuplicateRequest { .. } | Error::BatchNotFound(_)
        )
    }

    /// Short machine-readable kind, used in logs and outcome events
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidUsage { .. } | Error::DuplicateRequest { .. } => "validation",
            Error::BatchNotFound(_) | Error::BatchNotReady { .. } | Error::BatchMismatch { .. } => {
                "precondition"
            }
            Error::ProofGeneration { .. } | Error::ConstraintViolation { .. } => "proof_generation",
            Error::VerificationRejected { .. } => "verification_rejected",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::LedgerSimulation { .. } => "ledger_simulation",
            Error::LedgerSubmission { .. } => "ledger_submission",
            Error::Timeout { .. } => "timeout",
            Error::Unauthorized(_) | Error::InvalidSignature | Error::CryptoError { .. } => {
                "authorization"
            }
            _ => "internal",
        }
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Validation errors: 1xxx
            Error::InvalidUsage { .. } => 1001,
            Error::DuplicateRequest { .. } => 1002,

            // Batch errors: 2xxx
            Error::BatchNotFound(_) => 2001,
            Error::BatchNotReady { .. } => 2002,
            Error::BatchMismatch { .. } => 2003,

            // Proof errors: 3xxx
            Error::ProofGeneration { .. } => 3001,
            Error::ConstraintViolation { .. } => 3002,
            Error::VerificationRejected { .. } => 3003,

            // Ledger errors: 4xxx
            Error::InsufficientBalance { .. } => 4001,
            Error::LedgerSimulation { .. } => 4002,
            Error::LedgerSubmission { .. } => 4003,
            Error::Timeout { .. } => 4004,

            // Authorization errors: 5xxx
            Error::Unauthorized(_) => 5001,
            Error::InvalidSignature => 5002,
            Error::CryptoError { .. } => 5003,

            // Parameter errors: 6xxx
            Error::InvalidParameter { .. } => 6001,
            Error::Overflow { .. } => 6002,
            Error::Underflow { .. } => 6003,
            Error::Config(_) => 6004,

            // Serialization errors: 7xxx
            Error::Serialization(_) => 7001,
            Error::Deserialization(_) => 7002,

            // Internal errors: 9xxx
            Error::Internal(_) => 9001,
            Error::Lock => 9002,
            Error::Storage(_) => 9003,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_unique() {
        let codes = vec![
            Error::InvalidUsage { field: "".into(), reason: "".into() }.code(),
            Error::DuplicateRequest { payer: "".into(), request_id: "".into() }.code(),
            Error::BatchNotFound("".into()).code(),
            Error::BatchNotReady { entries: 0, capacity: 0 }.code(),
            Error::ProofGeneration { batch_id: "".into(), reason: "".into() }.code(),
            Error::VerificationRejected { batch_id: "".into(), reason: "".into() }.code(),
            Error::InsufficientBalance { required: 0, available: 0 }.code(),
            Error::LedgerSimulation { reason: "".into() }.code(),
            Error::LedgerSubmission { reason: "".into(), ambiguous: false }.code(),
            Error::Timeout { operation: "".into(), timeout_ms: 0 }.code(),
            Error::Unauthorized("".into()).code(),
            Error::Config("".into()).code(),
            Error::Internal("".into()).code(),
        ];

        let mut unique_codes = codes.clone();
        unique_codes.sort();
        unique_codes.dedup();

        assert_eq!(codes.len(), unique_codes.len(), "Error codes must be unique");
    }

    #[test]
    fn test_error_display() {
        let err = Error::InsufficientBalance {
            required: 88,
            available: 50,
        };
        assert!(err.to_string().contains("88"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_ambiguity() {
        assert!(Error::LedgerSubmission { reason: "timeout".into(), ambiguous: true }.is_ambiguous());
        assert!(!Error::LedgerSubmission { reason: "rejected".into(), ambiguous: false }.is_ambiguous());
        assert!(!Error::Timeout { operation: "read_balance".into(), timeout_ms: 10 }.is_ambiguous());
    }

    #[test]
    fn test_retryable_and_retained() {
        assert!(Error::ProofGeneration { batch_id: "b".into(), reason: "x".into() }.is_retryable());
        assert!(!Error::VerificationRejected { batch_id: "b".into(), reason: "x".into() }.is_retryable());
        assert!(Error::VerificationRejected { batch_id: "b".into(), reason: "x".into() }.retains_batch());
        assert!(!Error::InvalidUsage { field: "f".into(), reason: "r".into() }.retains_batch());
    }

    #[test]
    fn test_kind() {
        assert_eq!(Error::InsufficientBalance { required: 1, available: 0 }.kind(), "insufficient_balance");
        assert_eq!(Error::LedgerSimulation { reason: "paused".into() }.kind(), "ledger_simulation");
    }
}
