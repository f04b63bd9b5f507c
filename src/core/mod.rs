//! Core modules for zkmeter.
//!
//! This module contains the fundamental building blocks:
//! - Configuration
//! - Usage records and party identifiers
//! - Batches, normalized batches and snapshots

pub mod batch;
pub mod config;
pub mod usage;

pub use batch::*;
pub use config::*;
pub use usage::*;
