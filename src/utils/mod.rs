//! Utility modules for zkmeter.
//!
//! This module contains shared utilities used across the pipeline:
//! - Cryptographic primitives
//! - Checked arithmetic
//! - Validation helpers
//! - Constants

pub mod constants;
pub mod crypto;
pub mod math;
pub mod validation;

pub use constants::*;
pub use crypto::*;
pub use math::*;
pub use validation::*;
