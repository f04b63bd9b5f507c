//! Zero-Knowledge Proof module for zkmeter.
//!
//! This module proves that a settled amount is the exact sum of a batch's usage
//! entries and that the batch's response values match a public commitment.
//!
//! ## Backends
//!
//! - **Native**: executes the circuit without ZK and emits a sealed envelope
//!
//! Other backends plug in by implementing [`ProofSystem`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use zkmeter::zkp::{NativeProofSystem, ProofGenerator, ProofVerifier};
//!
//! let system = Arc::new(NativeProofSystem::new());
//! let generator = ProofGenerator::new(system.clone(), 2);
//! let verifier = ProofVerifier::new(system, 4);
//! ```

pub mod circuits;
pub mod field;
pub mod generator;
pub mod inputs;
pub mod prover;
pub mod verifier;

pub use circuits::*;
pub use field::FieldElement;
pub use generator::ProofGenerator;
pub use inputs::*;
pub use prover::*;
pub use verifier::*;
